// Copyright (c) 2026 FL2000-Regdecode Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wireshark JSON export (`tshark -T json`) of a USB capture.
//!
//! Only the keys below are modelled, everything else in the layers is ignored. Wireshark keeps
//! every value as a string, including numbers, so conversion happens in the decoder. Keys that
//! only some transfers carry (transfer type, request type, wIndex) are optional here; the decoder
//! asks for them once a packet has passed the filter.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// URB transfer type for control transfers.
pub const TRANSFER_TYPE_CONTROL: u32 = 0x02;
/// Vendor request, device to host. Sets up a register read.
pub const REQUEST_TYPE_VENDOR_IN: u32 = 0xc0;
/// Vendor request, host to device. Carries a register write.
pub const REQUEST_TYPE_VENDOR_OUT: u32 = 0x40;

#[derive(Deserialize, Debug, Clone)]
pub struct CapturePacket {
    #[serde(rename = "_source")]
    pub source: PacketSource,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PacketSource {
    pub layers: Layers,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Layers {
    pub frame: FrameLayer,
    pub usb: UsbLayer,
    #[serde(rename = "Setup Data", default)]
    pub setup: Option<SetupData>,
    /** Response payload of a completed IN control transfer, `aa:bb:cc:dd`. */
    #[serde(rename = "usb.control.Response", default)]
    pub response: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FrameLayer {
    #[serde(rename = "frame.time")]
    pub time: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UsbLayer {
    #[serde(rename = "usb.src")]
    pub src: String,
    #[serde(rename = "usb.dst")]
    pub dst: String,
    #[serde(rename = "usb.transfer_type", default)]
    pub transfer_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SetupData {
    #[serde(rename = "usb.bmRequestType", default)]
    pub request_type: Option<String>,
    /** Register address, as a decimal string. Standard requests may carry a LanguageId instead. */
    #[serde(rename = "usb.setup.wIndex", default)]
    pub index: Option<String>,
    #[serde(rename = "usb.data_fragment", default)]
    pub data_fragment: Option<String>,
}

impl CapturePacket {
    pub fn layers(&self) -> &Layers {
        &self.source.layers
    }

    pub fn time(&self) -> &str {
        &self.source.layers.frame.time
    }

    /// True if the device appears as source or destination. Compared as the raw capture string.
    pub fn involves(&self, usb_address: &str) -> bool {
        let usb = &self.source.layers.usb;
        usb.src == usb_address || usb.dst == usb_address
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed capture: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn parse_capture<R: Read>(reader: R) -> Result<Vec<CapturePacket>, CaptureError> {
    let packets: Vec<CapturePacket> = serde_json::from_reader(reader)?;
    Ok(packets)
}

pub fn load_capture(path: &Path) -> Result<Vec<CapturePacket>, CaptureError> {
    let file = File::open(path)?;
    parse_capture(BufReader::new(file))
}

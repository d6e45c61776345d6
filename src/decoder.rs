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

//! Walks the capture once and turns control transfers into register transactions.
//!
//! Reads are split across two packets: the IN setup carries the register address in wIndex, and
//! a later packet carries the response payload. The address is kept as the pending read until
//! the response shows up. Writes are self-contained, the payload rides along with the setup.

use std::io::Write;

use log::{debug, trace};
use thiserror::Error;

use crate::capture::{
    CapturePacket, REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT, TRANSFER_TYPE_CONTROL,
};
use crate::registers::RegisterMap;
use crate::transaction::{Direction, Transaction};
use crate::utils::{parse_hex_u32, payload_to_hex_digits};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("read response without a preceding read setup")]
    NoPendingRead,

    #[error("no register defined at address {0:#06x}")]
    UnknownRegister(u32),

    #[error("payload is not a 32-bit hex value: {0:?}")]
    InvalidHex(String),

    #[error("setup index is not a register address: {0:?}")]
    InvalidIndex(String),

    #[error("matching packet has no {0} field")]
    MissingKey(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub packets: usize,
    pub matched: usize,
    pub reads: usize,
    pub writes: usize,
}

pub struct CaptureDecoder {
    registers: RegisterMap,
    usb_address: String,
    pending_read: Option<u32>,
    stats: DecodeStats,
}

impl CaptureDecoder {
    pub fn new(registers: RegisterMap, usb_address: impl Into<String>) -> Self {
        Self {
            registers,
            usb_address: usb_address.into(),
            pending_read: None,
            stats: DecodeStats::default(),
        }
    }

    pub fn registers(&self) -> &RegisterMap {
        &self.registers
    }

    pub fn pending_read(&self) -> Option<u32> {
        self.pending_read
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Only control transfers to or from our device are of interest. The transfer type is
    /// required once the address matches.
    pub fn is_relevant(&self, packet: &CapturePacket) -> Result<bool, DecodeError> {
        if !packet.involves(&self.usb_address) {
            return Ok(false);
        }
        let transfer_type = packet
            .layers()
            .usb
            .transfer_type
            .as_deref()
            .ok_or(DecodeError::MissingKey("usb.transfer_type"))?;
        Ok(parse_hex_u32(transfer_type) == Some(TRANSFER_TYPE_CONTROL))
    }

    /// Decode one packet. A packet can both complete a pending read and carry a write, in
    /// which case the read comes first.
    pub fn handle_packet(
        &mut self,
        packet: &CapturePacket,
    ) -> Result<Vec<Transaction>, DecodeError> {
        self.stats.packets += 1;
        if !self.is_relevant(packet)? {
            trace!("skipping packet at {}", packet.time());
            return Ok(Vec::new());
        }
        self.stats.matched += 1;

        let layers = packet.layers();
        let mut out = Vec::new();

        if let Some(response) = &layers.response {
            let address = self.pending_read.ok_or(DecodeError::NoPendingRead)?;
            let raw = payload_to_hex_digits(response);
            out.push(self.transaction(packet.time(), Direction::Read, address, raw)?);
        }

        let Some(setup) = &layers.setup else {
            return Ok(out);
        };
        let request_type = setup
            .request_type
            .as_deref()
            .ok_or(DecodeError::MissingKey("usb.bmRequestType"))?;
        let request_type = parse_hex_u32(request_type);

        if request_type == Some(REQUEST_TYPE_VENDOR_IN) {
            let address = parse_index(setup.index.as_deref())?;
            debug!("read setup for {:#06x}", address);
            self.pending_read = Some(address);
        }

        if request_type == Some(REQUEST_TYPE_VENDOR_OUT) {
            if let Some(fragment) = &setup.data_fragment {
                let address = parse_index(setup.index.as_deref())?;
                let raw = payload_to_hex_digits(fragment);
                out.push(self.transaction(packet.time(), Direction::Write, address, raw)?);
            }
        }

        Ok(out)
    }

    /// Build a transaction for `address`, updating the register's last seen value.
    pub fn transaction(
        &mut self,
        timestamp: &str,
        direction: Direction,
        address: u32,
        raw: String,
    ) -> Result<Transaction, DecodeError> {
        let value =
            u32::from_str_radix(&raw, 16).map_err(|_| DecodeError::InvalidHex(raw.clone()))?;
        let register = self
            .registers
            .get_mut(address)
            .ok_or(DecodeError::UnknownRegister(address))?;
        let fields = register.decode(value);

        match direction {
            Direction::Read => self.stats.reads += 1,
            Direction::Write => self.stats.writes += 1,
        }

        Ok(Transaction {
            timestamp: timestamp.to_string(),
            direction,
            address,
            raw,
            register_name: register.name.clone(),
            fields,
        })
    }

    /// Decode every packet in order and render the transactions to `out`.
    pub fn decode_all<W: Write>(
        &mut self,
        packets: &[CapturePacket],
        out: &mut W,
    ) -> Result<(), DecodeError> {
        for packet in packets {
            for transaction in self.handle_packet(packet)? {
                write!(out, "{}", transaction)?;
            }
        }
        Ok(())
    }
}

fn parse_index(index: Option<&str>) -> Result<u32, DecodeError> {
    let index = index.ok_or(DecodeError::MissingKey("usb.setup.wIndex"))?;
    index
        .trim()
        .parse::<u32>()
        .map_err(|_| DecodeError::InvalidIndex(index.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::parse_capture;
    use crate::registers::{Field, Register};

    fn registers() -> RegisterMap {
        let mut map = RegisterMap::new();
        let mut reg = Register::new("FL2000_TEST_REG", 0x8048);
        reg.add_field(Field::new("low", 4));
        reg.add_field(Field::new("high", 4));
        reg.add_field(Field::new("byte1", 8));
        map.insert(reg);
        map
    }

    fn packet(src: &str, dst: &str, transfer_type: &str, extra: &str) -> CapturePacket {
        let json = format!(
            r#"[{{"_source": {{"layers": {{
                "frame": {{"frame.time": "T"}},
                "usb": {{"usb.src": "{src}", "usb.dst": "{dst}", "usb.transfer_type": "{transfer_type}"}}
                {extra}
            }}}}}}]"#
        );
        parse_capture(json.as_bytes()).unwrap().remove(0)
    }

    fn read_setup(index: u32) -> CapturePacket {
        packet(
            "host",
            "1.4.0",
            "0x02",
            &format!(r#", "Setup Data": {{"usb.bmRequestType": "0xc0", "usb.setup.wIndex": "{index}"}}"#),
        )
    }

    fn read_response(payload: &str) -> CapturePacket {
        packet(
            "1.4.0",
            "host",
            "0x02",
            &format!(r#", "usb.control.Response": "{payload}""#),
        )
    }

    fn write(index: u32, payload: &str) -> CapturePacket {
        packet(
            "host",
            "1.4.0",
            "0x02",
            &format!(
                r#", "Setup Data": {{"usb.bmRequestType": "0x40", "usb.setup.wIndex": "{index}", "usb.data_fragment": "{payload}"}}"#
            ),
        )
    }

    #[test]
    fn read_setup_then_response() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        assert!(decoder.handle_packet(&read_setup(0x8048)).unwrap().is_empty());
        assert_eq!(decoder.pending_read(), Some(0x8048));

        let out = decoder.handle_packet(&read_response("01:02:00:00")).unwrap();
        assert_eq!(out.len(), 1);
        let t = &out[0];
        assert_eq!(t.direction, Direction::Read);
        assert_eq!(t.address, 0x8048);
        assert_eq!(t.raw, "00000201");
        let values: Vec<u32> = t.fields.iter().map(|f| f.value).collect();
        assert_eq!(values, vec![1, 0, 2]);
    }

    #[test]
    fn write_does_not_need_pending_read() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let out = decoder.handle_packet(&write(0x8048, "01:00:00:00")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].direction, Direction::Write);
        assert_eq!(decoder.pending_read(), None);

        let out = decoder.handle_packet(&write(0x8048, "11:00:00:00")).unwrap();
        assert!(!out[0].fields[0].is_changed());
        assert!(out[0].fields[1].is_changed());
        assert_eq!(decoder.stats().writes, 2);
    }

    #[test]
    fn write_setup_without_payload_is_silent() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let p = packet(
            "host",
            "1.4.0",
            "0x02",
            r#", "Setup Data": {"usb.bmRequestType": "0x40", "usb.setup.wIndex": "32840"}"#,
        );
        assert!(decoder.handle_packet(&p).unwrap().is_empty());
    }

    #[test]
    fn non_control_packet_changes_nothing() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        decoder.handle_packet(&read_setup(0x8048)).unwrap();

        let bulk = packet(
            "host",
            "1.4.0",
            "0x03",
            r#", "Setup Data": {"usb.bmRequestType": "0xc0", "usb.setup.wIndex": "1"}, "usb.control.Response": "ff:ff:ff:ff""#,
        );
        assert!(decoder.handle_packet(&bulk).unwrap().is_empty());
        assert_eq!(decoder.pending_read(), Some(0x8048));
        assert_eq!(decoder.registers().get(0x8048).unwrap().last_value, None);
        assert_eq!(decoder.stats().matched, 1);
        assert_eq!(decoder.stats().packets, 2);
    }

    #[test]
    fn other_device_is_ignored() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let p = packet(
            "host",
            "1.5.0",
            "0x02",
            r#", "usb.control.Response": "ff:ff:ff:ff""#,
        );
        assert!(decoder.handle_packet(&p).unwrap().is_empty());
    }

    #[test]
    fn response_without_setup_fails() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let err = decoder
            .handle_packet(&read_response("00:00:00:00"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::NoPendingRead));
    }

    #[test]
    fn unknown_register_fails() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let err = decoder
            .handle_packet(&write(0x1234, "00:00:00:00"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownRegister(0x1234)));
    }

    #[test]
    fn decode_all_renders_text() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let packets = vec![read_setup(0x8048), read_response("05:00:00:00")];
        let mut out = Vec::new();
        decoder.decode_all(&packets, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "T RD 0x8048 00000005");
        assert_eq!(lines[1], "  FL2000_TEST_REG");
        assert_eq!(lines.len(), 5);
        assert_eq!(decoder.stats().reads, 1);
    }

    #[test]
    fn read_completion_comes_before_write_in_same_packet() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        decoder.handle_packet(&read_setup(0x8048)).unwrap();

        let both = packet(
            "host",
            "1.4.0",
            "0x02",
            r#", "usb.control.Response": "01:00:00:00", "Setup Data": {"usb.bmRequestType": "0x40", "usb.setup.wIndex": "32840", "usb.data_fragment": "11:00:00:00"}"#,
        );
        let out = decoder.handle_packet(&both).unwrap();
        let directions: Vec<Direction> = out.iter().map(|t| t.direction).collect();
        assert_eq!(directions, vec![Direction::Read, Direction::Write]);
        assert_eq!(out[0].raw, "00000001");
        assert_eq!(out[1].raw, "00000011");
        assert!(out[1].fields[1].is_changed());
    }

    #[test]
    fn repeated_response_reuses_pending_address() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        decoder.handle_packet(&read_setup(0x8048)).unwrap();
        decoder.handle_packet(&read_response("01:00:00:00")).unwrap();
        assert_eq!(decoder.pending_read(), Some(0x8048));

        let out = decoder.handle_packet(&read_response("02:00:00:00")).unwrap();
        assert_eq!(out[0].address, 0x8048);
        assert!(out[0].fields[0].is_changed());
        assert_eq!(decoder.stats().reads, 2);
    }

    #[test]
    fn enumeration_traffic_is_skipped() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let descriptor = packet(
            "host",
            "1.7.0",
            "0x02",
            r#", "Setup Data": {"usb.bmRequestType": "0x80", "usb.setup.bRequest": "6", "usb.LanguageId": "0x0409"}"#,
        );
        assert!(decoder.handle_packet(&descriptor).unwrap().is_empty());

        let out = decoder.handle_packet(&write(0x8048, "01:00:00:00")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].direction, Direction::Write);
    }

    #[test]
    fn standard_request_to_our_device_is_silent() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let descriptor = packet(
            "host",
            "1.4.0",
            "0x02",
            r#", "Setup Data": {"usb.bmRequestType": "0x80", "usb.LanguageId": "0x0409"}"#,
        );
        assert!(decoder.handle_packet(&descriptor).unwrap().is_empty());
        assert_eq!(decoder.pending_read(), None);
    }

    #[test]
    fn vendor_request_without_index_fails() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let p = packet(
            "host",
            "1.4.0",
            "0x02",
            r#", "Setup Data": {"usb.bmRequestType": "0xc0"}"#,
        );
        let err = decoder.handle_packet(&p).unwrap_err();
        assert!(matches!(err, DecodeError::MissingKey("usb.setup.wIndex")));
    }

    #[test]
    fn missing_transfer_type_only_matters_for_our_device() {
        let mut decoder = CaptureDecoder::new(registers(), "1.4.0");
        let no_type = |dst: &str| {
            let json = format!(
                r#"[{{"_source": {{"layers": {{"frame": {{"frame.time": "T"}}, "usb": {{"usb.src": "host", "usb.dst": "{dst}"}}}}}}}}]"#
            );
            parse_capture(json.as_bytes()).unwrap().remove(0)
        };
        assert!(decoder.handle_packet(&no_type("1.7.0")).unwrap().is_empty());
        let err = decoder.handle_packet(&no_type("1.4.0")).unwrap_err();
        assert!(matches!(err, DecodeError::MissingKey("usb.transfer_type")));
    }

    #[test]
    fn independent_sessions_do_not_share_state() {
        let mut a = CaptureDecoder::new(registers(), "1.4.0");
        let mut b = CaptureDecoder::new(registers(), "1.4.0");
        a.handle_packet(&write(0x8048, "01:00:00:00")).unwrap();
        let out = b.handle_packet(&write(0x8048, "11:00:00:00")).unwrap();
        assert!(out[0].fields.iter().all(|f| !f.is_changed()));
    }
}

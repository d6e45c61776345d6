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

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::Logger;
use log::info;

use fl2000_regdecode::{load_capture, load_register_map, CaptureDecoder};

/// Decode FL2000 register reads and writes from a Wireshark JSON capture.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Capture exported with `tshark -T json`
    capture: PathBuf,

    /// USB address of the device, as it appears in usb.src/usb.dst (e.g. "1.4.0")
    usb_addr: String,

    /// Register definition header
    #[arg(short = 'r', long = "registers", default_value = "../fl2000_registers.h")]
    registers: PathBuf,

    /// Enable debug output
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr, stdout is reserved for the decode
    let _logger = Logger::try_with_env_or_str(if args.debug { "debug" } else { "warn" })?
        .log_to_stderr()
        .start()?;

    let registers = load_register_map(&args.registers)
        .with_context(|| format!("loading registers from {}", args.registers.display()))?;
    info!(
        "{} registers loaded from {}",
        registers.len(),
        args.registers.display()
    );

    let packets = load_capture(&args.capture)
        .with_context(|| format!("loading capture {}", args.capture.display()))?;
    info!("{} packets in capture", packets.len());

    let mut decoder = CaptureDecoder::new(registers, args.usb_addr);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    decoder.decode_all(&packets, &mut out)?;
    out.flush()?;

    let stats = decoder.stats();
    info!(
        "{} packets, {} matched, {} reads, {} writes",
        stats.packets, stats.matched, stats.reads, stats.writes
    );
    Ok(())
}

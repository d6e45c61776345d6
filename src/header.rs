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

//! Register-map builder.
//!
//! The register header is a C file in the style of `fl2000_registers.h`:
//!
//! ```text
//! #define FL2000_REG_BASE         0x8000
//! #define FL2000_VGA_STATUS_REG   (FL2000_REG_BASE + 0x00)
//! union fl2000_vga_status_reg {
//!     struct {
//!         u32 hblank_int : 1;
//!         u32 vblank_int : 1;
//!         ...
//! ```
//!
//! We only care about three kinds of lines. Each line is classified on its own, then the
//! builder applies it. Bit-field lines always belong to the register defined most recently.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use log::{debug, trace};
use regex::Regex;
use thiserror::Error;

use crate::registers::{Field, Register, RegisterMap};
use crate::utils::parse_hex_u32;

static RE_CONSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#define\s+(\w+)\s+(0[xX][0-9a-fA-F]+)\b").expect("constant regex")
});
static RE_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#define\s+(\w+)\s+\(\s*(\w+)\s*\+\s*(0[xX][0-9a-fA-F]+)\s*\)")
        .expect("offset regex")
});
static RE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s*:\s*(\d+)\s*;").expect("field regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderLine {
    /// `#define NAME 0x1234`
    Constant { name: String, value: u32 },
    /// `#define NAME (BASE + 0x04)`
    Offset {
        name: String,
        base: String,
        offset: u32,
    },
    /// `u32 name : 3;`
    Field { name: String, width: u32 },
    Other,
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("line {line}: bit-field declared before any register")]
    FieldWithoutRegister { line: usize },

    #[error("line {line}: register offset refers to unknown constant {base}")]
    UnknownBase { base: String, line: usize },

    #[error("line {line}: address of {name} does not fit in 32 bits")]
    AddressOverflow { name: String, line: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("/*") || trimmed.starts_with('*') || trimmed.starts_with("//")
}

/// Classify a single header line. Anything not recognized is `Other`.
pub fn classify_line(line: &str) -> HeaderLine {
    let trimmed = line.trim();

    if trimmed.starts_with("#define") {
        if let Some(caps) = RE_OFFSET.captures(trimmed) {
            return match parse_hex_u32(&caps[3]) {
                Some(offset) => HeaderLine::Offset {
                    name: caps[1].to_string(),
                    base: caps[2].to_string(),
                    offset,
                },
                None => HeaderLine::Other,
            };
        }
        if let Some(caps) = RE_CONSTANT.captures(trimmed) {
            return match parse_hex_u32(&caps[2]) {
                Some(value) => HeaderLine::Constant {
                    name: caps[1].to_string(),
                    value,
                },
                None => HeaderLine::Other,
            };
        }
        return HeaderLine::Other;
    }

    if is_comment(trimmed) || !trimmed.contains(':') || !trimmed.contains(';') {
        return HeaderLine::Other;
    }

    match RE_FIELD.captures(trimmed) {
        Some(caps) => match caps[2].parse::<u32>() {
            Ok(width) if width > 0 => HeaderLine::Field {
                name: caps[1].to_string(),
                width,
            },
            _ => HeaderLine::Other,
        },
        None => HeaderLine::Other,
    }
}

/// Accumulates classified lines into a [`RegisterMap`].
#[derive(Debug, Default)]
pub struct RegisterMapBuilder {
    constants: HashMap<String, u32>,
    registers: RegisterMap,
    current: Option<u32>,
    line_no: usize,
}

impl RegisterMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, line: &str) -> Result<(), HeaderError> {
        self.line_no += 1;
        match classify_line(line) {
            HeaderLine::Constant { name, value } => {
                trace!("constant {} = {:#x}", name, value);
                self.constants.insert(name, value);
            }
            HeaderLine::Offset { name, base, offset } => {
                let base_value =
                    *self
                        .constants
                        .get(&base)
                        .ok_or_else(|| HeaderError::UnknownBase {
                            base: base.clone(),
                            line: self.line_no,
                        })?;
                let address = base_value.checked_add(offset).ok_or_else(|| {
                    HeaderError::AddressOverflow {
                        name: name.clone(),
                        line: self.line_no,
                    }
                })?;
                debug!("register {} at {:#06x}", name, address);
                self.registers.insert(Register::new(name, address));
                self.current = Some(address);
            }
            HeaderLine::Field { name, width } => {
                let register = self
                    .current
                    .and_then(|addr| self.registers.get_mut(addr))
                    .ok_or(HeaderError::FieldWithoutRegister { line: self.line_no })?;
                register.add_field(Field::new(name, width));
            }
            HeaderLine::Other => {}
        }
        Ok(())
    }

    pub fn finish(self) -> RegisterMap {
        self.registers
    }
}

pub fn parse_register_map<R: BufRead>(reader: R) -> Result<RegisterMap, HeaderError> {
    let mut builder = RegisterMapBuilder::new();
    for line in reader.lines() {
        builder.feed_line(&line?)?;
    }
    Ok(builder.finish())
}

pub fn load_register_map(path: &Path) -> Result<RegisterMap, HeaderError> {
    let file = File::open(path)?;
    parse_register_map(BufReader::new(file))
}

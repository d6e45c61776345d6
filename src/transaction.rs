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

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub fn tag(&self) -> &'static str {
        match self {
            Direction::Read => "RD",
            Direction::Write => "WR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub name: String,
    pub value: u32,
    pub changed: u32, // bits of this field that differ from the previous value
}

impl FieldValue {
    pub fn is_changed(&self) -> bool {
        self.changed != 0
    }
}

/// One decoded register access. Built and printed immediately, never stored.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub timestamp: String,
    pub direction: Direction,
    pub address: u32,
    pub raw: String,
    pub register_name: String,
    pub fields: Vec<FieldValue>,
}

/// Layout:
///
/// ```text
/// <time> RD 0x8004 00000011
///   REG_NAME
///     field                     = 1      0x1
///     other                     = 1      0x1    ***CHANGED***
/// ```
impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} 0x{:04x} {}",
            self.timestamp,
            self.direction.tag(),
            self.address,
            self.raw
        )?;
        writeln!(f, "  {}", self.register_name)?;
        for field in &self.fields {
            let hex = format!("{:#x}", field.value);
            writeln!(
                f,
                "    {:<25} = {:<6} {:<6}{}",
                field.name,
                field.value,
                hex,
                if field.is_changed() { " ***CHANGED***" } else { "" }
            )?;
        }
        Ok(())
    }
}

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

use std::collections::{BTreeMap, HashMap};

use crate::transaction::FieldValue;
use crate::utils::{low_bits_mask, shift_out};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub width: u32,
}

impl Field {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Register {
    pub name: String,
    pub address: u32,
    // LSB first
    pub fields: Vec<Field>,
    // None until the first transaction for this address is decoded
    pub last_value: Option<u32>,
}

impl Register {
    pub fn new(name: impl Into<String>, address: u32) -> Self {
        Self {
            name: name.into(),
            address,
            fields: Vec::new(),
            last_value: None,
        }
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Total number of bits described by the fields. May be less (or more) than 32.
    pub fn width(&self) -> u32 {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// Split `value` into its fields and record it as the last seen value.
    ///
    /// The change mask is the XOR against the previous value, sliced per field, so a field is
    /// only flagged when one of its own bits moved. The first observation never reports a change.
    /// Bits above the last field are dropped.
    pub fn decode(&mut self, value: u32) -> Vec<FieldValue> {
        let mut changed = match self.last_value {
            Some(prev) => value ^ prev,
            None => 0,
        };
        self.last_value = Some(value);

        let mut remaining = value;
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let mask = low_bits_mask(field.width);
            fields.push(FieldValue {
                name: field.name.clone(),
                value: remaining & mask,
                changed: changed & mask,
            });
            remaining = shift_out(remaining, field.width);
            changed = shift_out(changed, field.width);
        }
        fields
    }
}

/// Registers by address, plus a name index.
#[derive(Debug, Default, Clone)]
pub struct RegisterMap {
    by_addr: BTreeMap<u32, Register>,
    addr_by_name: HashMap<String, u32>,
}

impl RegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a register, replacing any earlier definition at the same address.
    pub fn insert(&mut self, register: Register) {
        if let Some(old) = self.by_addr.get(&register.address) {
            self.addr_by_name.remove(&old.name);
        }
        self.addr_by_name
            .insert(register.name.clone(), register.address);
        self.by_addr.insert(register.address, register);
    }

    pub fn get(&self, address: u32) -> Option<&Register> {
        self.by_addr.get(&address)
    }

    pub fn get_mut(&mut self, address: u32) -> Option<&mut Register> {
        self.by_addr.get_mut(&address)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Register> {
        self.addr_by_name
            .get(name)
            .and_then(|addr| self.by_addr.get(addr))
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    /// Registers in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.by_addr.values()
    }
}

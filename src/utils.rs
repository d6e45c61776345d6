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

/// Reverse the order of a colon separated hex-pair sequence, e.g. `aa:bb:cc` -> `cc:bb:aa`.
///
/// Wireshark prints payload bytes in wire order, and the device sends register values
/// little-endian, so the pairs have to be flipped before reading them as one big-endian number.
pub fn reverse_hex_pairs(fragment: &str) -> String {
    let mut pairs: Vec<&str> = fragment.split(':').collect();
    pairs.reverse();
    pairs.join(":")
}

/// Reverse a payload fragment and strip the separators, giving the hex digits of the value.
pub fn payload_to_hex_digits(fragment: &str) -> String {
    reverse_hex_pairs(fragment).replace(':', "")
}

/// Parse a hex string with or without a `0x` prefix.
pub fn parse_hex_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Mask covering the low `width` bits.
pub fn low_bits_mask(width: u32) -> u32 {
    if width >= u32::BITS {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Shift right, yielding 0 instead of overflowing when every bit is consumed.
pub fn shift_out(value: u32, width: u32) -> u32 {
    value.checked_shr(width).unwrap_or(0)
}

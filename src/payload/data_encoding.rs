//! # Register Data Decoding
//!
//! This module provides the pure conversions used on meter registers:
//! 32-bit integers and IEEE-754 floats from register pairs, packed BCD
//! date/time fields, and the bit fields of the event status word.
//!
//! None of these functions validate device encoding. Garbage in the
//! registers produces garbage values, never an error.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::constants::{
    BCD_YEAR_BASE, STATUS_EVENT_CHANNEL_MASK, STATUS_EVENT_CHANNEL_SHIFT, STATUS_EVENT_TYPE_MASK,
    STATUS_EVENT_TYPE_SHIFT, STATUS_RECORD_STATUS_MASK,
};

/// Combines a high and low register into an unsigned 32-bit value.
pub fn u32_from(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

/// Reinterprets a big-endian register pair as an IEEE-754 binary32 value.
pub fn f32_from(high: u16, low: u16) -> f32 {
    let [h0, h1] = high.to_be_bytes();
    let [l0, l1] = low.to_be_bytes();
    f32::from_be_bytes([h0, h1, l0, l1])
}

/// Splits a float into the (high, low) register pair `f32_from` expects.
pub fn f32_to_registers(value: f32) -> (u16, u16) {
    let [b0, b1, b2, b3] = value.to_be_bytes();
    (u16::from_be_bytes([b0, b1]), u16::from_be_bytes([b2, b3]))
}

/// Decodes one packed BCD byte (two decimal digits) to its value.
pub fn bcd_to_decimal(byte: u8) -> u8 {
    (byte >> 4).wrapping_mul(10).wrapping_add(byte & 0x0F)
}

/// Encodes a value 0..=99 as a packed BCD byte.
pub fn decimal_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Decodes the two BCD bytes packed into one register (high byte first).
fn bcd_pair(register: u16) -> (u8, u8) {
    let [high, low] = register.to_be_bytes();
    (bcd_to_decimal(high), bcd_to_decimal(low))
}

/// Calendar time decoded from three BCD registers.
///
/// Fields are kept exactly as decoded. Use [`BcdDateTime::to_naive`] to
/// check whether they form a real calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BcdDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl BcdDateTime {
    /// Converts to a chrono timestamp, adding the sub-second milliseconds.
    pub fn to_naive(&self, milliseconds: u16) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))?
            .and_hms_milli_opt(
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
                u32::from(milliseconds),
            )
    }
}

impl fmt::Display for BcdDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl Serialize for BcdDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decodes year/month, day/hour and minute/second registers.
///
/// The year is an offset from 2000; there is no century rollover.
pub fn decode_timestamp(reg11: u16, reg12: u16, reg13: u16) -> BcdDateTime {
    let (year, month) = bcd_pair(reg11);
    let (day, hour) = bcd_pair(reg12);
    let (minute, second) = bcd_pair(reg13);
    BcdDateTime {
        year: BCD_YEAR_BASE + u16::from(year),
        month,
        day,
        hour,
        minute,
        second,
    }
}

/// Bit fields of the event status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusWord {
    pub event_type: u8,
    pub event_channel: u8,
    pub record_status: u8,
}

/// Extracts event type (bits 5-7), channel (bits 3-4) and record status (bits 0-2).
pub fn decode_status_word(reg0: u16) -> StatusWord {
    StatusWord {
        event_type: ((reg0 >> STATUS_EVENT_TYPE_SHIFT) & STATUS_EVENT_TYPE_MASK) as u8,
        event_channel: ((reg0 >> STATUS_EVENT_CHANNEL_SHIFT) & STATUS_EVENT_CHANNEL_MASK) as u8,
        record_status: (reg0 & STATUS_RECORD_STATUS_MASK) as u8,
    }
}

/// Packs status fields back into a status word.
pub fn encode_status_word(status: StatusWord) -> u16 {
    ((u16::from(status.event_type) & STATUS_EVENT_TYPE_MASK) << STATUS_EVENT_TYPE_SHIFT)
        | ((u16::from(status.event_channel) & STATUS_EVENT_CHANNEL_MASK)
            << STATUS_EVENT_CHANNEL_SHIFT)
        | (u16::from(status.record_status) & STATUS_RECORD_STATUS_MASK)
}

/// Address into the device flash buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FlashPointer(pub u32);

impl FlashPointer {
    /// Splits the pointer into its (high, low) registers.
    pub fn registers(self) -> (u16, u16) {
        ((self.0 >> 16) as u16, self.0 as u16)
    }
}

impl fmt::Display for FlashPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

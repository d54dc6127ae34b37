//! # Power-Quality Event Records
//!
//! An event record is read from the device in two parts: a 15-register
//! header from the event buffer, then twenty waveform samples fetched
//! after seeking the device's waveform cursor to the record's flash start.

use serde::Serialize;

use crate::constants::{DURATION_TICKS_PER_SECOND, EVENT_RECORD_LEN, WAVEFORM_SAMPLES};
use crate::error::PqError;
use crate::payload::data_encoding::{
    decode_status_word, decode_timestamp, f32_from, u32_from, BcdDateTime, FlashPointer,
};

/// The decoded 15-register event header, before waveform samples are attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventHeader {
    pub flash_start: FlashPointer,
    pub flash_end: FlashPointer,
    pub event_type: u8,
    pub event_channel: u8,
    pub record_status: u8,
    /// Milliseconds.
    pub duration: f64,
    pub max_value: f32,
    pub min_value: f32,
    pub event_time: BcdDateTime,
    pub milliseconds: u16,
}

impl EventHeader {
    /// Decodes an event-buffer record.
    ///
    /// Register layout: 0 status word, 1-2 flash start, 3-4 flash end,
    /// 5-6 duration ticks, 7-8 max, 9-10 min, 11-13 BCD date/time,
    /// 14 milliseconds.
    pub fn decode(record: &[u16]) -> Result<Self, PqError> {
        if record.len() != usize::from(EVENT_RECORD_LEN) {
            return Err(PqError::DataShape {
                expected: usize::from(EVENT_RECORD_LEN),
                actual: record.len(),
            });
        }

        let status = decode_status_word(record[0]);
        let duration_ticks = u32_from(record[5], record[6]);

        Ok(EventHeader {
            flash_start: FlashPointer(u32_from(record[1], record[2])),
            flash_end: FlashPointer(u32_from(record[3], record[4])),
            event_type: status.event_type,
            event_channel: status.event_channel,
            record_status: status.record_status,
            duration: f64::from(duration_ticks) / DURATION_TICKS_PER_SECOND * 1000.0,
            max_value: f32_from(record[7], record[8]),
            min_value: f32_from(record[9], record[10]),
            event_time: decode_timestamp(record[11], record[12], record[13]),
            milliseconds: record[14],
        })
    }

    /// Completes the record with its waveform samples.
    pub fn with_waveform(self, waveform: [u16; WAVEFORM_SAMPLES]) -> PqEvent {
        PqEvent {
            header: self,
            waveform,
        }
    }
}

/// One captured power-quality disturbance with its waveform samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PqEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub waveform: [u16; WAVEFORM_SAMPLES],
}

//! The payload module contains the components that turn raw meter
//! registers into measurements: the register decoders, the snapshot
//! builder and the event record types.

pub mod data_encoding;
pub mod event;
pub mod snapshot;

pub use data_encoding::{
    bcd_to_decimal, decimal_to_bcd, decode_status_word, decode_timestamp, encode_status_word,
    f32_from, f32_to_registers, u32_from, BcdDateTime, FlashPointer, StatusWord,
};
pub use event::{EventHeader, PqEvent};
pub use snapshot::PowerSnapshot;

#![no_main]

use libfuzzer_sys::fuzz_target;
use pqmeter_rs::payload::EventHeader;

fuzz_target!(|data: &[u8]| {
    let registers: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    // Any length must decode or fail cleanly, and garbage BCD must not panic
    if let Ok(header) = EventHeader::decode(&registers) {
        let _ = header.event_time.to_string();
        let _ = header.event_time.to_naive(header.milliseconds);
        let _ = header.flash_start.to_string();
    }
});

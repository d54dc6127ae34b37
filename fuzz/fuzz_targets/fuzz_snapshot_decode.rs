#![no_main]

use libfuzzer_sys::fuzz_target;
use pqmeter_rs::payload::PowerSnapshot;

fuzz_target!(|data: &[u8]| {
    let registers: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    if let Ok(snapshot) = PowerSnapshot::from_registers(&registers) {
        let _ = snapshot.fields();
    }
});

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Encoding validation plus strict parsing — should never panic
    let _ = flatpath::Document::parse_bytes(data);
});

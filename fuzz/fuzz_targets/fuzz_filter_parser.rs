#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz the filter parser with arbitrary strings.
    // Parsing must reject bad input with a positioned error, never panic.
    let _ = capdex::filter::parse_filter(data);
});

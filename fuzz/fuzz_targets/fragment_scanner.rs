#![no_main]

use html::{ScanMode, parse_fragment, tokenize};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = tokenize(text, ScanMode::Html);
    let _ = tokenize(text, ScanMode::Xml);
    let _ = parse_fragment(text, "div");
});

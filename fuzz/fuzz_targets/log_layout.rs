#![no_main]

use libfuzzer_sys::fuzz_target;
use ran::http::LogLayout;

fuzz_target!(|source: &str| {
    if let Ok(layout) = LogLayout::parse(source) {
        assert_eq!(layout.to_string(), source);
        let again = LogLayout::parse(&layout.to_string());
        assert!(again.is_ok());
    }
});

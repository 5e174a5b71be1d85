#![no_main]

use libfuzzer_sys::fuzz_target;
use ran::utils::path::clean_url_path;

fuzz_target!(|path: &str| {
    let rooted = format!("/{}", path);
    let clean = clean_url_path(&rooted);
    assert!(clean.starts_with('/'));
    assert!(clean == "/" || !clean.ends_with('/'));
    assert!(!clean.contains("//"));
    assert!(clean.split('/').all(|segment| segment != "." && segment != ".."));
    assert_eq!(clean_url_path(&clean), clean);
});

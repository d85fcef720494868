#![no_main]

use libfuzzer_sys::fuzz_target;
use lens_syntax::spec;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Err(errors) = spec::parse(s) {
            for error in errors {
                assert!(error.offset <= s.len());
            }
        }
    }
});

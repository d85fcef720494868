#![no_main]

use libfuzzer_sys::fuzz_target;
use lens_syntax::parser;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let units = parser::parse_unit(s);
        for unit in &units {
            unit.walk(&mut |node| assert!(node.span.start <= node.span.end && node.span.end <= s.len()));
        }
        let _ = parser::references_in(s, &Default::default());
    }
});

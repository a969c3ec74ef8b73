#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use posdata::engine::archive::{field::parse_int_token, TokenScanner};

fuzz_target!(|data: &[u8]| {
    let mut scanner = TokenScanner::new(Cursor::new(data));
    let mut count = 0usize;
    while let Ok(Some(token)) = scanner.next_token(1024) {
        assert!(token.chars().count() <= 1024);
        let _ = parse_int_token(&token);
        count += 1;
        if count > 10_000 {
            break;
        }
    }
});

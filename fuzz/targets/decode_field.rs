#![no_main]

use std::io::Cursor;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use posdata::engine::archive::{decode, FieldKind};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    data: Vec<u8>,
    string_limit: u16,
}

fuzz_target!(|input: FuzzInput| {
    let mut cursor = Cursor::new(&input.data);
    let limit = usize::from(input.string_limit);

    // Декодер не должен паниковать и не должен выделять больше лимита.
    while let Ok(Some(kind)) = decode::read_tag(&mut cursor) {
        if kind.is_marker() {
            continue;
        }
        match decode::read_payload(&mut cursor, kind, limit) {
            Ok(value) => {
                if let posdata::FieldValue::Str(s) = &value {
                    assert!(s.len() <= limit);
                }
                assert!(kind == FieldKind::Str || value.kind() == kind);
            }
            Err(_) => break,
        }
    }
});

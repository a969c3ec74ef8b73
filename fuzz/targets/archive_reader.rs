#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use posdata::RecordReader;

fuzz_target!(|data: &[u8]| {
    let Ok(mut reader) = RecordReader::from_reader(Cursor::new(data.to_vec()), "fuzz") else {
        return;
    };
    // Любой поток заканчивается ошибкой или концом файла, без паники.
    for _ in 0..10_000 {
        match reader.next_entry() {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }
    reader.close();
});

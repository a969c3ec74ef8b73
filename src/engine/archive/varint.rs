//! Префикс длины строк в формате LEB128.
//!
//! Короткие строки (до 127 байт) тратят на длину один байт, строки класса
//! «long» (до 16 384 байт) не больше трёх.

use std::io::{Read, Write};

use posdata_error::{ArchiveError, PosResult, ResultExt};

use super::decode::read_failure;

/// Максимальная длина varint для u32.
pub const MAX_VARINT_LEN: usize = 5;

/// Записывает `value` и возвращает число записанных байт.
///
/// ```
/// use posdata::engine::archive::varint::write_varint;
///
/// let mut buf = Vec::new();
/// write_varint(&mut buf, 300).unwrap();
/// assert_eq!(buf, vec![0xAC, 0x02]);
/// ```
pub fn write_varint<W: Write>(
    w: &mut W,
    mut value: u32,
) -> PosResult<usize> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut len = 0;

    loop {
        let low = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = low;
            len += 1;
            break;
        }
        buf[len] = low | 0x80;
        len += 1;
    }

    w.write_all(&buf[..len])
        .context("writing string length prefix")?;
    Ok(len)
}

/// Читает varint; обрыв потока даёт `UnexpectedEof`, слишком длинная
/// последовательность считается повреждением.
pub fn read_varint<R: Read>(r: &mut R) -> PosResult<u32> {
    let mut value: u64 = 0;

    for i in 0..MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)
            .map_err(|e| read_failure(e, "reading string length prefix", 1))?;

        value |= u64::from(byte[0] & 0x7F) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return u32::try_from(value).map_err(|_| {
                ArchiveError::ParseError {
                    structure: "varint".to_string(),
                    reason: format!("value {value} overflows u32"),
                    offset: None,
                }
                .into()
            });
        }
    }

    Err(ArchiveError::ParseError {
        structure: "varint".to_string(),
        reason: format!("longer than {MAX_VARINT_LEN} bytes"),
        offset: None,
    }
    .into())
}

/// Размер varint без записи.
pub fn varint_size(value: u32) -> usize {
    let bits = 32 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

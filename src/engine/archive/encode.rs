//! Запись полей в бинарный поток: тег + полезная нагрузка.

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use posdata_error::{ArchiveError, PosResult, ResultExt};

use super::{
    field::FieldValue,
    tags::FieldKind,
    value::{Carrier, TimeStamp, Width},
    varint::write_varint,
};

fn check_str_limit(
    s: &str,
    limit: usize,
) -> Result<(), ArchiveError> {
    if s.len() > limit {
        return Err(ArchiveError::SizeLimit {
            what: "string".to_string(),
            size: s.len() as u64,
            limit: limit as u64,
            offset: None,
        });
    }
    Ok(())
}

/// Записывает целое значение носителя в его ширине, без тега.
pub fn write_carrier<W: Write>(
    w: &mut W,
    carrier: Carrier,
) -> PosResult<()> {
    let bits = carrier.as_u64();
    let written = match carrier.width() {
        Width::W8 => w.write_u8(bits as u8),
        Width::W16 => w.write_u16::<BigEndian>(bits as u16),
        Width::W32 => w.write_u32::<BigEndian>(bits as u32),
        Width::W64 => w.write_u64::<BigEndian>(bits),
    };
    written.context("writing integer payload")
}

/// Строка: varint длина + байты. Длина сверх `limit` отвергается.
pub fn write_str<W: Write>(
    w: &mut W,
    s: &str,
    limit: usize,
) -> PosResult<()> {
    let bytes = s.as_bytes();
    check_str_limit(s, limit)?;

    let len = u32::try_from(bytes.len()).map_err(|_| ArchiveError::SizeLimit {
        what: "string".to_string(),
        size: bytes.len() as u64,
        limit: u64::from(u32::MAX),
        offset: None,
    })?;
    write_varint(w, len)?;
    w.write_all(bytes).context("writing string bytes")?;
    Ok(())
}

/// Время: флаг 0/1 и, если задано, секунды epoch (i64 BE).
pub fn write_time<W: Write>(
    w: &mut W,
    ts: TimeStamp,
) -> PosResult<()> {
    match ts.epoch_secs() {
        None => w.write_u8(0).context("writing timestamp flag"),
        Some(secs) => {
            w.write_u8(1).context("writing timestamp flag")?;
            w.write_i64::<BigEndian>(secs)
                .context("writing timestamp seconds")
        }
    }
}

/// Записывает поле целиком (тег + нагрузка).
///
/// Строки проверяются по лимиту `string_limit`.
pub fn write_field<W: Write>(
    w: &mut W,
    field: &FieldValue,
    string_limit: usize,
) -> PosResult<()> {
    // Отвергнутое поле не должно оставить в потоке даже тег.
    if let FieldValue::Str(s) = field {
        check_str_limit(s, string_limit)?;
    }
    w.write_u8(field.kind().tag()).context("writing field tag")?;
    match field {
        FieldValue::Int(c) => write_carrier(w, *c),
        FieldValue::Float(v) => w
            .write_u64::<BigEndian>(v.to_bits())
            .context("writing float payload"),
        FieldValue::Str(s) => write_str(w, s, string_limit),
        FieldValue::Time(t) => write_time(w, *t),
    }
}

/// Записывает маркер начала или конца записи.
pub fn write_marker<W: Write>(
    w: &mut W,
    marker: FieldKind,
) -> PosResult<()> {
    debug_assert!(marker.is_marker());
    w.write_u8(marker.tag()).context("writing record marker")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::archive::tags::{TAG_INT16, TAG_STR, TAG_TIME};

    /// Тест проверяет точную раскладку байт целого поля.
    #[test]
    fn test_int_layout_big_endian() {
        let mut buf = Vec::new();
        let field = FieldValue::Int(Carrier::from_signed(-2, Width::W16));
        write_field(&mut buf, &field, 256).unwrap();
        assert_eq!(buf, vec![TAG_INT16, 0xFF, 0xFE]);
    }

    #[test]
    fn test_string_layout() {
        let mut buf = Vec::new();
        write_field(&mut buf, &FieldValue::Str("abc".into()), 256).unwrap();
        assert_eq!(buf, vec![TAG_STR, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_string_over_limit() {
        let mut buf = Vec::new();
        let err = write_str(&mut buf, "hello", 4).unwrap_err();
        assert_eq!(err.status_code(), posdata_error::StatusCode::SizeLimit);
        assert!(write_field(&mut buf, &FieldValue::Str("hello".into()), 4).is_err());
        assert!(buf.is_empty());
    }

    /// Тест проверяет, что незаданное время занимает ровно один байт флага.
    #[test]
    fn test_unset_time_layout() {
        let mut buf = Vec::new();
        write_field(&mut buf, &FieldValue::Time(TimeStamp::unset()), 256).unwrap();
        assert_eq!(buf, vec![TAG_TIME, 0]);
    }
}

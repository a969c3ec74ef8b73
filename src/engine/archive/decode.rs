//! Чтение полей из бинарного потока.
//!
//! Все функции возвращают типизированные ошибки: обрыв потока даёт
//! `ArchiveError::UnexpectedEof`, а не нулевое значение.

use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};
use posdata_error::{ArchiveError, PosResult, StackError};

use super::{
    field::FieldValue,
    tags::FieldKind,
    value::{Carrier, TimeStamp, Width},
    varint::read_varint,
};

/// Превращает ошибку чтения в ошибку архива.
///
/// Ошибки распаковки приходят завёрнутыми в `io::Error` и достаются
/// обратно как есть.
pub(crate) fn read_failure(
    e: io::Error,
    context: &str,
    expected: usize,
) -> StackError {
    if let Some(inner) = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<ArchiveError>())
    {
        return inner.clone().into();
    }

    match e.kind() {
        io::ErrorKind::UnexpectedEof => ArchiveError::UnexpectedEof {
            context: context.to_string(),
            offset: None,
            expected_bytes: Some(expected as u64),
        }
        .into(),
        _ => StackError::from(e).context(context.to_string()),
    }
}

/// Читает тег следующего поля. `Ok(None)` означает чистый конец потока
/// на границе поля.
pub fn read_tag<R: Read>(r: &mut R) -> PosResult<Option<FieldKind>> {
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_failure(e, "reading field tag", 1)),
        }
    }

    FieldKind::try_from(byte[0]).map(Some).map_err(|_| {
        ArchiveError::InvalidTag {
            tag: byte[0],
            offset: None,
        }
        .into()
    })
}

/// Читает целое ширины `width` в носитель.
pub fn read_carrier<R: Read>(
    r: &mut R,
    width: Width,
) -> PosResult<Carrier> {
    let context = "reading integer payload";
    let bits = match width {
        Width::W8 => r.read_u8().map(u64::from),
        Width::W16 => r.read_u16::<BigEndian>().map(u64::from),
        Width::W32 => r.read_u32::<BigEndian>().map(u64::from),
        Width::W64 => r.read_u64::<BigEndian>(),
    }
    .map_err(|e| read_failure(e, context, width.bytes()))?;

    Ok(Carrier::from_raw(bits, width))
}

/// Читает строку с проверкой лимита до выделения памяти.
pub fn read_str<R: Read>(
    r: &mut R,
    limit: usize,
) -> PosResult<String> {
    let len = read_varint(r)? as usize;
    if len > limit {
        return Err(ArchiveError::SizeLimit {
            what: "string".to_string(),
            size: len as u64,
            limit: limit as u64,
            offset: None,
        }
        .into());
    }

    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .map_err(|e| read_failure(e, "reading string bytes", len))?;
    Ok(String::from_utf8(buf)?)
}

pub fn read_time<R: Read>(r: &mut R) -> PosResult<TimeStamp> {
    let flag = r
        .read_u8()
        .map_err(|e| read_failure(e, "reading timestamp flag", 1))?;
    match flag {
        0 => Ok(TimeStamp::unset()),
        1 => r
            .read_i64::<BigEndian>()
            .map(TimeStamp::from_epoch)
            .map_err(|e| read_failure(e, "reading timestamp seconds", 8)),
        other => Err(ArchiveError::ParseError {
            structure: "timestamp".to_string(),
            reason: format!("flag byte must be 0 or 1, got {other}"),
            offset: None,
        }
        .into()),
    }
}

/// Читает нагрузку поля вида `kind` (тег уже прочитан).
pub fn read_payload<R: Read>(
    r: &mut R,
    kind: FieldKind,
    string_limit: usize,
) -> PosResult<FieldValue> {
    match kind {
        FieldKind::Int8 | FieldKind::Int16 | FieldKind::Int32 | FieldKind::Int64 => {
            let width = Width::from_kind(kind).unwrap_or(Width::W64);
            read_carrier(r, width).map(FieldValue::Int)
        }
        FieldKind::Float => r
            .read_u64::<BigEndian>()
            .map(|bits| FieldValue::Float(f64::from_bits(bits)))
            .map_err(|e| read_failure(e, "reading float payload", 8)),
        FieldKind::Str => read_str(r, string_limit).map(FieldValue::Str),
        FieldKind::Time => read_time(r).map(FieldValue::Time),
        FieldKind::RecordBegin | FieldKind::RecordEnd => Err(ArchiveError::TypeMismatch {
            expected: "field value".to_string(),
            found: kind.name().to_string(),
            offset: None,
        }
        .into()),
    }
}

/// Читает поле целиком. Конец потока на месте тега тоже считается обрывом.
pub fn read_field<R: Read>(
    r: &mut R,
    string_limit: usize,
) -> PosResult<FieldValue> {
    match read_tag(r)? {
        Some(kind) => read_payload(r, kind, string_limit),
        None => Err(ArchiveError::UnexpectedEof {
            context: "reading field tag".to_string(),
            offset: None,
            expected_bytes: Some(1),
        }
        .into()),
    }
}

fn discard<R: Read>(
    r: &mut R,
    n: u64,
    context: &str,
) -> PosResult<()> {
    let copied = io::copy(&mut r.by_ref().take(n), &mut io::sink())
        .map_err(|e| read_failure(e, context, n as usize))?;
    if copied < n {
        return Err(ArchiveError::UnexpectedEof {
            context: context.to_string(),
            offset: None,
            expected_bytes: Some(n - copied),
        }
        .into());
    }
    Ok(())
}

/// Пропускает нагрузку поля, не создавая значение. Лимит строк не
/// применяется: пропускаемые поля могут быть записаны более новым кодом.
pub fn skip_payload<R: Read>(
    r: &mut R,
    kind: FieldKind,
) -> PosResult<()> {
    match kind {
        FieldKind::Int8 | FieldKind::Int16 | FieldKind::Int32 | FieldKind::Int64 => {
            let width = Width::from_kind(kind).unwrap_or(Width::W64);
            discard(r, width.bytes() as u64, "skipping integer payload")
        }
        FieldKind::Float => discard(r, 8, "skipping float payload"),
        FieldKind::Str => {
            let len = read_varint(r)?;
            discard(r, u64::from(len), "skipping string bytes")
        }
        FieldKind::Time => read_time(r).map(|_| ()),
        FieldKind::RecordBegin | FieldKind::RecordEnd => Ok(()),
    }
}

use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибка архива (чтение/запись файла данных) с контекстом для диагностики.
#[derive(Debug, Clone)]
pub enum ArchiveError {
    /// Файл не удалось открыть или создать
    Open {
        path: String,
        reason: String,
        code: StatusCode,
    },

    /// Неизвестная сигнатура контейнера
    InvalidMagic { expected: Vec<u8>, got: Vec<u8> },

    /// Ревизия контейнера не поддерживается этой сборкой
    UnsupportedContainer { found: u8, supported: Vec<u8> },

    /// Ошибка сжатия/распаковки потока
    CompressionError {
        operation: CompressionOp,
        reason: String,
        offset: Option<u64>,
    },

    /// Версия записи неизвестна коду сущности
    UnknownVersion {
        entity: String,
        version: i32,
        min_supported: i32,
        max_supported: i32,
    },

    /// Неожиданный конец потока (усечённый архив)
    UnexpectedEof {
        context: String,
        offset: Option<u64>,
        expected_bytes: Option<u64>,
    },

    /// Значение не помещается в запрошенную ширину
    WidthOverflow { value: String, width: u8 },

    /// Превышен лимит размера
    SizeLimit {
        what: String,
        size: u64,
        limit: u64,
        offset: Option<u64>,
    },

    /// Неизвестный тег поля
    InvalidTag { tag: u8, offset: Option<u64> },

    /// Поле другого типа, чем ожидает читатель
    TypeMismatch {
        expected: String,
        found: String,
        offset: Option<u64>,
    },

    /// Ошибка разбора (текстовые токены, структура записи)
    ParseError {
        structure: String,
        reason: String,
        offset: Option<u64>,
    },

    /// Операция над уже закрытым архивом
    Closed { operation: String },
}

/// Тип операции сжатия для контекста ошибки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionOp {
    Compress,
    Decompress,
}

impl ArchiveError {
    /// Ошибка открытия файла; статус берётся из `io::ErrorKind`.
    pub fn open(
        path: impl Into<String>,
        err: &std::io::Error,
    ) -> Self {
        Self::Open {
            path: path.into(),
            reason: err.to_string(),
            code: crate::io_status_code(err),
        }
    }

    /// Конструктор для кода сущностей, встретивших неизвестную версию.
    pub fn unknown_version(
        entity: impl Into<String>,
        version: i32,
        supported: std::ops::RangeInclusive<i32>,
    ) -> Self {
        Self::UnknownVersion {
            entity: entity.into(),
            version,
            min_supported: *supported.start(),
            max_supported: *supported.end(),
        }
    }

    /// Добавляет смещение к ошибке (если у варианта есть такое поле).
    pub fn with_offset(
        mut self,
        offset: u64,
    ) -> Self {
        match &mut self {
            Self::CompressionError { offset: o, .. }
            | Self::UnexpectedEof { offset: o, .. }
            | Self::SizeLimit { offset: o, .. }
            | Self::InvalidTag { offset: o, .. }
            | Self::TypeMismatch { offset: o, .. }
            | Self::ParseError { offset: o, .. } => {
                if o.is_none() {
                    *o = Some(offset);
                }
            }
            _ => {}
        }
        self
    }

    /// Подсказка оператору по восстановлению.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidMagic { .. } | Self::CompressionError { .. } => {
                Some("File is not an archive or is damaged. Restore the .bak copy")
            }
            Self::UnexpectedEof { .. } => Some("Archive may be truncated. Restore the .bak copy"),
            Self::UnsupportedContainer { .. } => Some("Archive was written by a newer release"),
            Self::UnknownVersion { .. } => Some("Entity version is newer than this build"),
            Self::Open { .. } => Some("Check the path and file permissions"),
            _ => None,
        }
    }

    /// Усечение посреди записи: текущую запись нужно отбросить.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }

    /// Имеет ли смысл восстановить `.bak` и повторить чтение.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEof { .. }
                | Self::InvalidMagic { .. }
                | Self::InvalidTag { .. }
                | Self::CompressionError { .. }
                | Self::ParseError { .. }
                | Self::TypeMismatch { .. }
        )
    }
}

impl std::fmt::Display for ArchiveError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Open { path, reason, .. } => write!(f, "Cannot open archive '{path}': {reason}"),
            Self::InvalidMagic { expected, got } => write!(
                f,
                "Invalid container signature: expected {expected:02X?}, got {got:02X?}"
            ),
            Self::UnsupportedContainer { found, supported } => write!(
                f,
                "Unsupported container revision {found} (supported: {supported:?})"
            ),
            Self::CompressionError {
                operation,
                reason,
                offset,
            } => {
                write!(f, "{operation} error: {reason}")?;
                write_offset(f, *offset)
            }
            Self::UnknownVersion {
                entity,
                version,
                min_supported,
                max_supported,
            } => write!(
                f,
                "Unknown {entity} version {version} (supported: {min_supported}..={max_supported})"
            ),
            Self::UnexpectedEof {
                context,
                offset,
                expected_bytes,
            } => {
                write!(f, "Unexpected EOF: {context}")?;
                if let Some(exp) = expected_bytes {
                    write!(f, " (expected {exp} bytes)")?;
                }
                write_offset(f, *offset)
            }
            Self::WidthOverflow { value, width } => {
                write!(f, "Value {value} does not fit in {width} byte(s)")
            }
            Self::SizeLimit {
                what,
                size,
                limit,
                offset,
            } => {
                write!(f, "{what} size {size} exceeds limit {limit} bytes")?;
                write_offset(f, *offset)
            }
            Self::InvalidTag { tag, offset } => {
                write!(f, "Invalid field tag 0x{tag:02X}")?;
                write_offset(f, *offset)
            }
            Self::TypeMismatch {
                expected,
                found,
                offset,
            } => {
                write!(f, "Type mismatch: expected {expected}, found {found}")?;
                write_offset(f, *offset)
            }
            Self::ParseError {
                structure,
                reason,
                offset,
            } => {
                write!(f, "Failed to parse {structure}: {reason}")?;
                write_offset(f, *offset)
            }
            Self::Closed { operation } => write!(f, "Cannot {operation}: archive is closed"),
        }
    }
}

fn write_offset(
    f: &mut std::fmt::Formatter<'_>,
    offset: Option<u64>,
) -> std::fmt::Result {
    if let Some(o) = offset {
        write!(f, " [offset: 0x{o:X}]")?;
    }
    Ok(())
}

impl std::error::Error for ArchiveError {}

impl ErrorExt for ArchiveError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Open { code, .. } => *code,
            Self::InvalidMagic { .. } => StatusCode::InvalidMagic,
            Self::UnsupportedContainer { .. } => StatusCode::UnsupportedVersion,
            Self::CompressionError { .. } => StatusCode::CompressionFailed,
            Self::UnknownVersion { .. } => StatusCode::VersionMismatch,
            Self::UnexpectedEof { .. } => StatusCode::UnexpectedEof,
            Self::WidthOverflow { .. } => StatusCode::WidthOverflow,
            Self::SizeLimit { .. } => StatusCode::SizeLimit,
            Self::InvalidTag { .. } => StatusCode::CorruptedData,
            Self::TypeMismatch { .. } => StatusCode::TypeError,
            Self::ParseError { .. } => StatusCode::ParseError,
            Self::Closed { .. } => StatusCode::ArchiveClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Open { .. } => "Data file could not be opened".to_string(),
            Self::InvalidMagic { .. } => "Not a valid data file".to_string(),
            Self::UnsupportedContainer { .. } | Self::UnknownVersion { .. } => {
                "Data file was written by a newer version".to_string()
            }
            Self::CompressionError { .. } => "Data file is damaged".to_string(),
            Self::UnexpectedEof { .. } => "Data file is incomplete".to_string(),
            Self::WidthOverflow { .. } => "Value is out of range".to_string(),
            _ => "Data file has an invalid format".to_string(),
        }
    }

    fn log_message(&self) -> String {
        let mut msg = format!("{self:?}");
        if let Some(hint) = self.recovery_hint() {
            msg.push_str(&format!(" | Hint: {hint}"));
        }
        msg
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
            ("recoverable", self.is_recoverable().to_string()),
        ];

        match self {
            Self::InvalidTag { tag, .. } => tags.push(("invalid_tag", format!("0x{tag:02X}"))),
            Self::UnknownVersion {
                entity, version, ..
            } => {
                tags.push(("entity", entity.clone()));
                tags.push(("version", version.to_string()));
            }
            Self::WidthOverflow { width, .. } => tags.push(("width", width.to_string())),
            _ => {}
        }

        tags
    }
}

impl From<ArchiveError> for std::io::Error {
    fn from(e: ArchiveError) -> Self {
        let kind = match &e {
            ArchiveError::Open { code, .. } if *code == StatusCode::NotFound => {
                std::io::ErrorKind::NotFound
            }
            ArchiveError::UnexpectedEof { .. } => std::io::ErrorKind::UnexpectedEof,
            ArchiveError::WidthOverflow { .. } | ArchiveError::SizeLimit { .. } => {
                std::io::ErrorKind::InvalidInput
            }
            ArchiveError::UnsupportedContainer { .. } | ArchiveError::UnknownVersion { .. } => {
                std::io::ErrorKind::Unsupported
            }
            ArchiveError::Open { .. } | ArchiveError::Closed { .. } => std::io::ErrorKind::Other,
            _ => std::io::ErrorKind::InvalidData,
        };

        std::io::Error::new(kind, e.to_string())
    }
}

impl std::fmt::Display for CompressionOp {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Compress => write!(f, "Compression"),
            Self::Decompress => write!(f, "Decompression"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что `with_offset` не перезаписывает уже известное
    /// смещение.
    #[test]
    fn test_with_offset_keeps_first() {
        let err = ArchiveError::InvalidTag {
            tag: 0x99,
            offset: None,
        }
        .with_offset(10)
        .with_offset(20);
        assert!(matches!(err, ArchiveError::InvalidTag { offset: Some(10), .. }));
    }

    #[test]
    fn test_unknown_version_carries_raw_value() {
        let err = ArchiveError::unknown_version("Employee", 31, 1..=29);
        assert_eq!(err.status_code(), StatusCode::VersionMismatch);
        assert!(err.to_string().contains("version 31"));
        assert!(err.to_string().contains("1..=29"));
    }

    /// Тест проверяет классификацию: усечение — восстановимо, переполнение
    /// ширины — нет.
    #[test]
    fn test_recoverable_classification() {
        let eof = ArchiveError::UnexpectedEof {
            context: "x".into(),
            offset: None,
            expected_bytes: None,
        };
        assert!(eof.is_truncation());
        assert!(eof.is_recoverable());

        let overflow = ArchiveError::WidthOverflow {
            value: "70000".into(),
            width: 2,
        };
        assert!(!overflow.is_recoverable());
        assert_eq!(overflow.status_code(), StatusCode::WidthOverflow);
    }

    #[test]
    fn test_open_error_maps_io_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ArchiveError::open("/tmp/x.dat", &io_err);
        assert_eq!(err.status_code(), StatusCode::NotFound);
        let back: std::io::Error = err.into();
        assert_eq!(back.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_display_with_offset() {
        let err = ArchiveError::UnexpectedEof {
            context: "reading string bytes".into(),
            offset: Some(0x2A),
            expected_bytes: Some(5),
        };
        assert_eq!(
            err.to_string(),
            "Unexpected EOF: reading string bytes (expected 5 bytes) [offset: 0x2A]"
        );
    }

    #[test]
    fn test_log_message_contains_hint() {
        let err = ArchiveError::InvalidMagic {
            expected: b"PDAT".to_vec(),
            got: b"JUNK".to_vec(),
        };
        assert!(err.log_message().contains("Hint:"));
    }
}

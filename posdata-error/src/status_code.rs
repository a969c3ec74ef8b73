use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных
/// - 3xxx: Доступ / разрешения
/// - 5xxx: Архивы и хранилище
/// - 6xxx: Сеть / IO
/// - 8xxx: Формат и протокол
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `strum` для `AsRefStr`/`EnumIter` (feature = "strum").
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    NotImplemented = 1005,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    AlreadyExists = 2001,
    TypeError = 2002,
    InvalidKey = 2003,
    InvalidValue = 2004,
    InvalidData = 2009,

    // === 3xxx: Доступ ===
    PermissionDenied = 3001,

    // === 5xxx: Архивы ===
    StorageUnavailable = 5000,
    DiskFull = 5001,
    CorruptedData = 5002,
    SerializationFailed = 5003,
    DeserializationFailed = 5004,
    CompressionFailed = 5005,
    WidthOverflow = 5006,
    ArchiveClosed = 5007,

    // === 6xxx: Сеть/IO ===
    Io = 6000,
    ConnectionClosed = 6001,
    Timeout = 6002,
    ProtocolError = 6003,
    ConnectionFailed = 6004,
    UnexpectedEof = 6007,

    // === 8xxx: Формат ===
    InvalidMagic = 8000,
    UnsupportedVersion = 8002,
    VersionMismatch = 8003,
    InvalidUtf8 = 8004,
    InvalidInteger = 8005,
    InvalidFloat = 8006,
    SizeLimit = 8007,
    ParseError = 8009,
    EncodingError = 8010,
    DecodingError = 8011,
    InvalidConfig = 8012,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Использует `TryFrom<u32>` из `num_enum`; возвращает `None`, если
    /// значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Возвращает `true`, если операцию с этим кодом имеет смысл повторить
    /// (например, после восстановления резервной копии архива).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::StorageUnavailable
                | Self::ConnectionFailed
                | Self::CorruptedData
                | Self::UnexpectedEof
                | Self::InvalidMagic
                | Self::CompressionFailed
        )
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка вызывающего кода: неверные аргументы или данные (2xxx..4xxx,
    /// плюс `InvalidArgs` и `WidthOverflow`).
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=4999).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs | Self::WidthOverflow)
    }

    /// Внутренняя или инфраструктурная ошибка (1xxx и 5xxx..7xxx).
    pub fn is_server_error(&self) -> bool {
        let c = self.code();
        matches!(c, 1000..=1999 | 5000..=7999) && !matches!(self, Self::WidthOverflow)
    }

    /// Ошибка формата или парсинга (диапазон 8xxx).
    pub fn is_format_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::CorruptedData | Self::DiskFull | Self::StorageUnavailable
        )
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::AlreadyExists => LogLevel::Debug,
            Self::InvalidArgs
            | Self::TypeError
            | Self::InvalidKey
            | Self::InvalidValue
            | Self::InvalidData
            | Self::WidthOverflow
            | Self::PermissionDenied => LogLevel::Info,
            Self::Timeout | Self::ConnectionClosed | Self::UnexpectedEof => LogLevel::Warn,
            Self::Internal | Self::CorruptedData | Self::DiskFull | Self::StorageUnavailable => {
                LogLevel::Error
            }
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        // Если включён feature "strum", используем human-readable имя (AsRefStr).
        // Иначе — Debug-имя.
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

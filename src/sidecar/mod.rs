//! Протокол «ключ/значение»: одна пара `key<разделитель>value` на строку.
//!
//! Используется для редактируемых вручную настроек и таблиц переводов, а
//! также для приёма удалённых заказов через сокет, где записи
//! заканчиваются `\0`. Версий у протокола нет, неизвестные ключи вызывающий
//! код просто игнорирует.

pub mod reader;
pub mod splitter;
pub mod writer;

use posdata_error::{PosResult, SidecarError};
pub use reader::KeyValueReader;
use serde::{Deserialize, Serialize};
pub use splitter::RecordSplitter;
pub use writer::KeyValueWriter;

/// Размер внутреннего буфера по умолчанию.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
/// Лимит длины ключа и значения по умолчанию.
pub const DEFAULT_MAX_LEN: usize = 256;
pub const DEFAULT_DELIMITER: char = ':';
pub const DEFAULT_COMMENT: char = '#';

/// Чем писатель заканчивает запись.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Terminator {
    /// `\n` — файлы.
    #[default]
    Newline,
    /// `\0` — сокеты.
    Nul,
    /// `\n\0` — сокеты, читаемые построчно.
    NewlineNul,
}

impl Terminator {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Terminator::Newline => b"\n",
            Terminator::Nul => b"\0",
            Terminator::NewlineNul => b"\n\0",
        }
    }
}

impl std::str::FromStr for Terminator {
    type Err = SidecarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newline" | "lf" => Ok(Terminator::Newline),
            "nul" | "null" => Ok(Terminator::Nul),
            "newline-nul" | "lf-nul" => Ok(Terminator::NewlineNul),
            other => Err(SidecarError::InvalidOption(format!(
                "unknown terminator {other:?}"
            ))),
        }
    }
}

/// Одна запись.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Сравнение ключа без учёта регистра ASCII.
    pub fn is(
        &self,
        key: &str,
    ) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    pub fn parse<T: std::str::FromStr>(&self) -> Option<T> {
        self.value.parse().ok()
    }
}

/// Параметры протокола.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidecarOptions {
    pub delimiter: char,
    pub comment: char,
    pub max_len: usize,
    pub buffer_size: usize,
    pub terminator: Terminator,
}

impl Default for SidecarOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            comment: DEFAULT_COMMENT,
            max_len: DEFAULT_MAX_LEN,
            buffer_size: DEFAULT_BUFFER_SIZE,
            terminator: Terminator::Newline,
        }
    }
}

impl SidecarOptions {
    /// Настройки сокетного варианта: записи заканчиваются `\0`.
    pub fn socket() -> Self {
        Self {
            terminator: Terminator::Nul,
            ..Self::default()
        }
    }

    pub fn with_delimiter(
        mut self,
        delimiter: char,
    ) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_max_len(
        mut self,
        max_len: usize,
    ) -> Self {
        self.max_len = max_len;
        self
    }

    /// Разделитель и маркер комментария — однобайтовые символы, не
    /// совпадающие с концом строки.
    pub fn validate(&self) -> PosResult<()> {
        for (name, c) in [("delimiter", self.delimiter), ("comment", self.comment)] {
            if !c.is_ascii() || matches!(c, '\n' | '\r' | '\0') {
                return Err(
                    SidecarError::InvalidOption(format!("{name} {c:?} is not usable")).into(),
                );
            }
        }
        if self.delimiter == self.comment {
            return Err(SidecarError::InvalidOption(
                "delimiter and comment marker must differ".to_string(),
            )
            .into());
        }
        if self.buffer_size == 0 || self.max_len == 0 {
            return Err(SidecarError::InvalidOption(
                "buffer size and max length must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_valid() {
        SidecarOptions::default().validate().unwrap();
        assert_eq!(SidecarOptions::socket().terminator, Terminator::Nul);
    }

    #[test]
    fn test_invalid_options() {
        assert!(SidecarOptions::default()
            .with_delimiter('\n')
            .validate()
            .is_err());
        assert!(SidecarOptions::default()
            .with_delimiter('→')
            .validate()
            .is_err());
        assert!(SidecarOptions::default()
            .with_delimiter('#')
            .validate()
            .is_err());
    }

    #[test]
    fn test_terminator_from_str() {
        assert_eq!("nul".parse::<Terminator>().unwrap(), Terminator::Nul);
        assert_eq!("LF".parse::<Terminator>().unwrap(), Terminator::Newline);
        assert!("tab".parse::<Terminator>().is_err());
    }

    #[test]
    fn test_key_value_helpers() {
        let kv = KeyValue::new("SelectTimeout", "5");
        assert!(kv.is("selecttimeout"));
        assert_eq!(kv.parse::<u32>(), Some(5));
        assert_eq!(kv.parse::<bool>(), None);
    }
}

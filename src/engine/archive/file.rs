//! Сигнатуры контейнера и определение способа упаковки архива.

use posdata_error::ArchiveError;

/// Сигнатура бинарного архива: ASCII-буквы «PDAT».
pub const CONTAINER_MAGIC: &[u8; 4] = b"PDAT";

/// Магическое начало zstd-кадра (сжатый бинарный архив).
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Магическое начало gzip-потока (старый сжатый текстовый архив).
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Ревизии самого контейнера (не путать с версией записи, которую
/// выбирает код сущности).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    V1 = 1,
}

impl FormatVersion {
    pub const fn current() -> Self {
        FormatVersion::V1
    }

    pub fn supported() -> Vec<u8> {
        vec![FormatVersion::V1 as u8]
    }
}

impl TryFrom<u8> for FormatVersion {
    type Error = ArchiveError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FormatVersion::V1),
            other => Err(ArchiveError::UnsupportedContainer {
                found: other,
                supported: FormatVersion::supported(),
            }),
        }
    }
}

/// Текущая ревизия контейнера в виде байта заголовка.
pub const CONTAINER_REVISION: u8 = FormatVersion::current() as u8;

/// Способ упаковки архива, определяемый по первым байтам файла.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `PDAT` + ревизия + версия, поля без сжатия.
    Binary,
    /// Весь бинарный архив внутри одного zstd-потока.
    CompressedBinary,
    /// Старый текстовый формат: токены через пробел.
    LegacyText,
    /// Старый текстовый формат, упакованный gzip.
    LegacyGzipText,
}

impl Framing {
    /// Определяет упаковку по префиксу файла (до 4 байт).
    pub fn sniff(prefix: &[u8]) -> Self {
        if prefix.starts_with(&ZSTD_MAGIC) {
            Framing::CompressedBinary
        } else if prefix.starts_with(CONTAINER_MAGIC) {
            Framing::Binary
        } else if prefix.starts_with(&GZIP_MAGIC) {
            Framing::LegacyGzipText
        } else {
            Framing::LegacyText
        }
    }

    /// Как [`Framing::sniff`], но отвергает префикс, с которого не может
    /// начинаться ни контейнер, ни версия текстового архива (цифра, знак
    /// или пробел).
    pub fn detect(prefix: &[u8]) -> Result<Self, ArchiveError> {
        let framing = Self::sniff(prefix);
        if framing != Framing::LegacyText {
            return Ok(framing);
        }
        match prefix.first() {
            None => Ok(framing),
            Some(b) if b.is_ascii_digit() || b.is_ascii_whitespace() || matches!(b, b'-' | b'+') => {
                Ok(framing)
            }
            Some(_) => Err(ArchiveError::InvalidMagic {
                expected: CONTAINER_MAGIC.to_vec(),
                got: prefix.to_vec(),
            }),
        }
    }

    pub fn is_binary(self) -> bool {
        matches!(self, Framing::Binary | Framing::CompressedBinary)
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, Framing::CompressedBinary | Framing::LegacyGzipText)
    }

    pub fn name(self) -> &'static str {
        match self {
            Framing::Binary => "binary",
            Framing::CompressedBinary => "binary+zstd",
            Framing::LegacyText => "text",
            Framing::LegacyGzipText => "text+gzip",
        }
    }
}

impl std::fmt::Display for Framing {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет распознавание всех четырёх упаковок по префиксу.
    #[test]
    fn test_sniff_framing() {
        assert_eq!(Framing::sniff(b"PDAT\x01"), Framing::Binary);
        assert_eq!(
            Framing::sniff(&[0x28, 0xB5, 0x2F, 0xFD, 0x00]),
            Framing::CompressedBinary
        );
        assert_eq!(Framing::sniff(&[0x1F, 0x8B, 0x08]), Framing::LegacyGzipText);
        assert_eq!(Framing::sniff(b"12 3 \"x\""), Framing::LegacyText);
        assert_eq!(Framing::sniff(b""), Framing::LegacyText);
        assert_eq!(Framing::sniff(b"PDA"), Framing::LegacyText);
    }

    /// Тест проверяет, что повреждённая сигнатура не принимается за
    /// текстовый архив.
    #[test]
    fn test_detect_rejects_damaged_signature() {
        assert_eq!(Framing::detect(b"PDAT").unwrap(), Framing::Binary);
        assert_eq!(Framing::detect(b"12 \"").unwrap(), Framing::LegacyText);
        assert_eq!(Framing::detect(b" -1").unwrap(), Framing::LegacyText);
        assert_eq!(Framing::detect(b"").unwrap(), Framing::LegacyText);

        let err = Framing::detect(b"PDBT").unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidMagic { ref got, .. } if got == b"PDBT"));
        assert!(Framing::detect(b"PDA").is_err());
    }

    #[test]
    fn test_container_revision() {
        assert_eq!(FormatVersion::try_from(1).unwrap(), FormatVersion::V1);
        let err = FormatVersion::try_from(9).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsupportedContainer { found: 9, .. }
        ));
    }
}

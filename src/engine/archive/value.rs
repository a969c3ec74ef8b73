//! Скалярные значения архива: 64-битный носитель целых, классы строк,
//! деньги, проценты и отметки времени.

use chrono::{DateTime, TimeZone, Utc};
use posdata_error::ArchiveError;

use super::tags::FieldKind;

/// Ширина целого поля на диске.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    /// Подсказка ширины у `write_hint`: число байт, 0 означает «естественная
    /// ширина типа».
    pub fn from_hint(hint: u8) -> Result<Option<Width>, ArchiveError> {
        match hint {
            0 => Ok(None),
            1 => Ok(Some(Width::W8)),
            2 => Ok(Some(Width::W16)),
            4 => Ok(Some(Width::W32)),
            8 => Ok(Some(Width::W64)),
            other => Err(ArchiveError::ParseError {
                structure: "width hint".to_string(),
                reason: format!("{other} is not one of 0, 1, 2, 4, 8"),
                offset: None,
            }),
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Width::W8 => FieldKind::Int8,
            Width::W16 => FieldKind::Int16,
            Width::W32 => FieldKind::Int32,
            Width::W64 => FieldKind::Int64,
        }
    }

    pub fn from_kind(kind: FieldKind) -> Option<Width> {
        match kind {
            FieldKind::Int8 => Some(Width::W8),
            FieldKind::Int16 => Some(Width::W16),
            FieldKind::Int32 => Some(Width::W32),
            FieldKind::Int64 => Some(Width::W64),
            _ => None,
        }
    }

    const fn mask(self) -> u64 {
        match self {
            Width::W64 => u64::MAX,
            w => (1u64 << (w.bytes() * 8)) - 1,
        }
    }

    const fn bits(self) -> u32 {
        (self.bytes() * 8) as u32
    }
}

/// Носитель целого значения: сырые биты ширины `width`.
///
/// Все чтения целых проходят через него. Беззнаковое сужение отбрасывает
/// старшие биты, знаковое расширяет знак от сохранённой ширины, поэтому
/// `-1`, записанный одним байтом, читается как `-1` в любом знаковом типе.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Carrier {
    bits: u64,
    width: Width,
    signed: bool,
}

impl Carrier {
    pub fn from_unsigned(
        value: u64,
        width: Width,
    ) -> Self {
        Self {
            bits: value & width.mask(),
            width,
            signed: false,
        }
    }

    pub fn from_signed(
        value: i64,
        width: Width,
    ) -> Self {
        Self {
            bits: (value as u64) & width.mask(),
            width,
            signed: true,
        }
    }

    /// Носитель, прочитанный с диска: знаковость источника неизвестна.
    pub fn from_raw(
        bits: u64,
        width: Width,
    ) -> Self {
        Self::from_unsigned(bits, width)
    }

    pub fn width(&self) -> Width {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Сырые биты, дополненные нулями до 64 бит.
    pub fn as_u64(&self) -> u64 {
        self.bits
    }

    /// Значение с расширением знака от сохранённой ширины.
    pub fn as_i64(&self) -> i64 {
        let shift = 64 - self.width.bits();
        ((self.bits << shift) as i64) >> shift
    }

    pub fn fits(
        &self,
        width: Width,
    ) -> bool {
        if width >= self.width {
            return true;
        }
        if self.signed {
            let v = self.as_i64();
            let shift = 64 - width.bits();
            ((v << shift) >> shift) == v
        } else {
            self.bits <= width.mask()
        }
    }

    /// Перекодирует носитель в другую ширину; значение, которое не
    /// помещается, отвергается.
    pub fn resize(
        self,
        width: Width,
    ) -> Result<Carrier, ArchiveError> {
        if !self.fits(width) {
            return Err(ArchiveError::WidthOverflow {
                value: self.to_string(),
                width: width.bytes() as u8,
            });
        }
        Ok(if self.signed {
            Carrier::from_signed(self.as_i64(), width)
        } else {
            Carrier::from_unsigned(self.bits, width)
        })
    }
}

impl std::fmt::Display for Carrier {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        if self.signed {
            write!(f, "{}", self.as_i64())
        } else {
            write!(f, "{}", self.bits)
        }
    }
}

/// Класс длины строки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringClass {
    #[default]
    Short,
    Long,
    Limit(usize),
}

/// Лимит строк класса `Short`.
pub const SHORT_STRING_LIMIT: usize = 256;
/// Лимит строк класса `Long`.
pub const LONG_STRING_LIMIT: usize = 16_384;

impl StringClass {
    pub fn limit(self) -> usize {
        match self {
            StringClass::Short => SHORT_STRING_LIMIT,
            StringClass::Long => LONG_STRING_LIMIT,
            StringClass::Limit(n) => n,
        }
    }
}

/// Денежная сумма в сотых долях (центах).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(pub i64);

impl Money {
    pub const SCALE: i64 = 100;

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn from_f64(amount: f64) -> Self {
        Money((amount * Self::SCALE as f64).round() as i64)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

impl std::fmt::Display for Money {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Доля с масштабом 10 000: `825` означает 0.0825, то есть 8.25%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percent(pub i64);

impl Percent {
    pub const SCALE: i64 = 10_000;

    pub fn from_ratio(ratio: f64) -> Self {
        Percent((ratio * Self::SCALE as f64).round() as i64)
    }

    pub fn to_ratio(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Применяет долю к сумме с округлением к ближайшему центу.
    pub fn apply(
        self,
        amount: Money,
    ) -> Money {
        let scaled = i128::from(amount.0) * i128::from(self.0);
        let half = i128::from(Self::SCALE / 2) * scaled.signum();
        Money(((scaled + half) / i128::from(Self::SCALE)) as i64)
    }
}

impl std::fmt::Display for Percent {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}%", abs / 100, abs % 100)
    }
}

/// Отметка времени с явным состоянием «не задано».
///
/// Незаданное время хранится как `None` и никогда не превращается в
/// 1970-01-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeStamp(Option<i64>);

impl TimeStamp {
    pub const fn unset() -> Self {
        TimeStamp(None)
    }

    pub const fn from_epoch(secs: i64) -> Self {
        TimeStamp(Some(secs))
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        TimeStamp(Some(dt.timestamp()))
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn epoch_secs(&self) -> Option<i64> {
        self.0
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        self.0.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

impl std::fmt::Display for TimeStamp {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match (self.0, self.to_datetime()) {
            (None, _) => f.write_str("<unset>"),
            (Some(_), Some(dt)) => write!(f, "{}", dt.to_rfc3339()),
            (Some(secs), None) => write!(f, "@{secs}"),
        }
    }
}

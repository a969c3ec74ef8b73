//! Значение поля как сумма типов и трейт [`FieldType`], который связывает
//! типы Rust с видами полей архива.

use posdata_error::ArchiveError;

use super::{
    tags::FieldKind,
    value::{Carrier, Money, Percent, TimeStamp, Width},
};

/// Одно значение поля.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(Carrier),
    Float(f64),
    Str(String),
    Time(TimeStamp),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Int(c) => c.width().kind(),
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::Time(_) => FieldKind::Time,
        }
    }

    fn describe(&self) -> String {
        self.kind().name().to_string()
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            FieldValue::Int(c) => write!(f, "{c}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Str(s) => write!(f, "{s:?}"),
            FieldValue::Time(t) => write!(f, "{t}"),
        }
    }
}

/// Тип, который можно записать в архив и прочитать обратно.
///
/// Бинарный путь идёт через [`FieldValue`], текстовый через токен.
pub trait FieldType: Sized {
    /// Имя типа для сообщений об ошибках.
    const NAME: &'static str;

    fn to_field(&self) -> FieldValue;

    fn from_field(field: FieldValue) -> Result<Self, ArchiveError>;

    fn from_token(token: &str) -> Result<Self, ArchiveError>;
}

fn mismatch(
    expected: &str,
    found: &FieldValue,
) -> ArchiveError {
    ArchiveError::TypeMismatch {
        expected: expected.to_string(),
        found: found.describe(),
        offset: None,
    }
}

fn bad_token(
    structure: &str,
    token: &str,
    reason: impl std::fmt::Display,
) -> ArchiveError {
    ArchiveError::ParseError {
        structure: structure.to_string(),
        reason: format!("token {token:?}: {reason}"),
        offset: None,
    }
}

/// Разбирает целый токен старого текстового формата в 64-битный носитель.
pub fn parse_int_token(token: &str) -> Result<Carrier, ArchiveError> {
    if token.starts_with('-') {
        token
            .parse::<i64>()
            .map(|v| Carrier::from_signed(v, Width::W64))
            .map_err(|e| bad_token("integer", token, e))
    } else {
        token
            .parse::<u64>()
            .map(|v| Carrier::from_unsigned(v, Width::W64))
            .map_err(|e| bad_token("integer", token, e))
    }
}

macro_rules! impl_unsigned {
    ($($ty:ty => $width:expr),* $(,)?) => {$(
        impl FieldType for $ty {
            const NAME: &'static str = stringify!($ty);

            fn to_field(&self) -> FieldValue {
                FieldValue::Int(Carrier::from_unsigned(u64::from(*self), $width))
            }

            fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
                match field {
                    FieldValue::Int(c) => Ok(c.as_u64() as $ty),
                    other => Err(mismatch(Self::NAME, &other)),
                }
            }

            fn from_token(token: &str) -> Result<Self, ArchiveError> {
                parse_int_token(token).map(|c| c.as_u64() as $ty)
            }
        }
    )*};
}

macro_rules! impl_signed {
    ($($ty:ty => $width:expr),* $(,)?) => {$(
        impl FieldType for $ty {
            const NAME: &'static str = stringify!($ty);

            fn to_field(&self) -> FieldValue {
                FieldValue::Int(Carrier::from_signed(i64::from(*self), $width))
            }

            fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
                match field {
                    FieldValue::Int(c) => Ok(c.as_i64() as $ty),
                    other => Err(mismatch(Self::NAME, &other)),
                }
            }

            fn from_token(token: &str) -> Result<Self, ArchiveError> {
                parse_int_token(token).map(|c| c.as_i64() as $ty)
            }
        }
    )*};
}

impl_unsigned!(u8 => Width::W8, u16 => Width::W16, u32 => Width::W32, u64 => Width::W64);
impl_signed!(i8 => Width::W8, i16 => Width::W16, i32 => Width::W32, i64 => Width::W64);

impl FieldType for bool {
    const NAME: &'static str = "bool";

    fn to_field(&self) -> FieldValue {
        FieldValue::Int(Carrier::from_unsigned(u64::from(*self), Width::W8))
    }

    fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
        match field {
            FieldValue::Int(c) => Ok(c.as_u64() != 0),
            other => Err(mismatch(Self::NAME, &other)),
        }
    }

    fn from_token(token: &str) -> Result<Self, ArchiveError> {
        parse_int_token(token).map(|c| c.as_u64() != 0)
    }
}

impl FieldType for f64 {
    const NAME: &'static str = "f64";

    fn to_field(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
        match field {
            FieldValue::Float(v) => Ok(v),
            other => Err(mismatch(Self::NAME, &other)),
        }
    }

    fn from_token(token: &str) -> Result<Self, ArchiveError> {
        token.parse::<f64>().map_err(|e| bad_token("float", token, e))
    }
}

impl FieldType for f32 {
    const NAME: &'static str = "f32";

    fn to_field(&self) -> FieldValue {
        FieldValue::Float(f64::from(*self))
    }

    fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
        match field {
            FieldValue::Float(v) => Ok(v as f32),
            other => Err(mismatch(Self::NAME, &other)),
        }
    }

    fn from_token(token: &str) -> Result<Self, ArchiveError> {
        token.parse::<f32>().map_err(|e| bad_token("float", token, e))
    }
}

impl FieldType for String {
    const NAME: &'static str = "string";

    fn to_field(&self) -> FieldValue {
        FieldValue::Str(self.clone())
    }

    fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
        match field {
            FieldValue::Str(s) => Ok(s),
            other => Err(mismatch(Self::NAME, &other)),
        }
    }

    fn from_token(token: &str) -> Result<Self, ArchiveError> {
        Ok(token.to_string())
    }
}

impl FieldType for TimeStamp {
    const NAME: &'static str = "timestamp";

    fn to_field(&self) -> FieldValue {
        FieldValue::Time(*self)
    }

    fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
        match field {
            FieldValue::Time(t) => Ok(t),
            other => Err(mismatch(Self::NAME, &other)),
        }
    }

    /// `-` означает «не задано», иначе секунды epoch.
    fn from_token(token: &str) -> Result<Self, ArchiveError> {
        if token == "-" {
            return Ok(TimeStamp::unset());
        }
        token
            .parse::<i64>()
            .map(TimeStamp::from_epoch)
            .map_err(|e| bad_token("timestamp", token, e))
    }
}

impl FieldType for Money {
    const NAME: &'static str = "money";

    fn to_field(&self) -> FieldValue {
        self.0.to_field()
    }

    fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
        i64::from_field(field).map(Money)
    }

    fn from_token(token: &str) -> Result<Self, ArchiveError> {
        i64::from_token(token).map(Money)
    }
}

impl FieldType for Percent {
    const NAME: &'static str = "percent";

    fn to_field(&self) -> FieldValue {
        self.0.to_field()
    }

    fn from_field(field: FieldValue) -> Result<Self, ArchiveError> {
        i64::from_field(field).map(Percent)
    }

    fn from_token(token: &str) -> Result<Self, ArchiveError> {
        i64::from_token(token).map(Percent)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    /// Тест проверяет детерминированное сужение: беззнаковые типы отбрасывают
    /// старшие биты, знаковые сохраняют знак.
    #[test]
    fn test_narrowing_from_wide_carrier() {
        let wide = FieldValue::Int(Carrier::from_raw(0x1_2345, Width::W32));
        assert_eq!(u16::from_field(wide.clone()).unwrap(), 0x2345);
        assert_eq!(u8::from_field(wide).unwrap(), 0x45);

        let minus_one = FieldValue::Int(Carrier::from_raw(0xFF, Width::W8));
        assert_eq!(i64::from_field(minus_one.clone()).unwrap(), -1);
        assert_eq!(i16::from_field(minus_one).unwrap(), -1);
    }

    #[test]
    fn test_type_mismatch() {
        let err = i32::from_field(FieldValue::Str("x".into())).unwrap_err();
        assert!(matches!(err, ArchiveError::TypeMismatch { .. }));
        assert!(err.to_string().contains("expected i32, found STR"));
    }

    #[rstest]
    #[case("42", 42)]
    #[case("-7", -7)]
    #[case("0", 0)]
    fn test_int_tokens(
        #[case] token: &str,
        #[case] expected: i32,
    ) {
        assert_eq!(i32::from_token(token).unwrap(), expected);
    }

    #[test]
    fn test_bad_int_token() {
        let err = i32::from_token("12x").unwrap_err();
        assert!(matches!(err, ArchiveError::ParseError { .. }));
    }

    #[test]
    fn test_timestamp_tokens() {
        assert!(!TimeStamp::from_token("-").unwrap().is_set());
        assert_eq!(
            TimeStamp::from_token("86400").unwrap(),
            TimeStamp::from_epoch(86_400)
        );
    }

    #[test]
    fn test_money_uses_i64_field() {
        let field = Money::from_cents(-250).to_field();
        assert_eq!(field.kind(), FieldKind::Int64);
        assert_eq!(Money::from_field(field).unwrap(), Money::from_cents(-250));
    }

    #[test]
    fn test_f32_bit_exact_through_f64() {
        let v = 0.1f32;
        let back = f32::from_field(v.to_field()).unwrap();
        assert_eq!(back.to_bits(), v.to_bits());
    }
}

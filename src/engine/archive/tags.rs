//! Однобайтовые теги полей бинарного архива.
//!
//! Каждое поле начинается с тега; целые числа после тега идут в
//! big-endian фиксированной ширины.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Целое, 1 байт
pub const TAG_INT8: u8 = 0x01;
/// Целое, 2 байта
pub const TAG_INT16: u8 = 0x02;
/// Целое, 4 байта
pub const TAG_INT32: u8 = 0x03;
/// Целое, 8 байт
pub const TAG_INT64: u8 = 0x04;
/// IEEE-754 double, 8 байт
pub const TAG_FLOAT: u8 = 0x05;
/// Строка: varint длина + байты
pub const TAG_STR: u8 = 0x06;
/// Время: флаг «задано» + секции epoch
pub const TAG_TIME: u8 = 0x07;
/// Начало записи сущности
pub const TAG_RECORD_BEGIN: u8 = 0x10;
/// Конец записи сущности
pub const TAG_RECORD_END: u8 = 0x11;

/// Тип поля, закодированный тегом.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FieldKind {
    Int8 = 0x01,
    Int16 = 0x02,
    Int32 = 0x03,
    Int64 = 0x04,
    Float = 0x05,
    Str = 0x06,
    Time = 0x07,
    RecordBegin = 0x10,
    RecordEnd = 0x11,
}

impl FieldKind {
    pub fn tag(self) -> u8 {
        self.into()
    }

    /// Маркеры записи не несут значения.
    pub fn is_marker(self) -> bool {
        matches!(self, FieldKind::RecordBegin | FieldKind::RecordEnd)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldKind::Int8 | FieldKind::Int16 | FieldKind::Int32 | FieldKind::Int64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Int8 => "INT8",
            FieldKind::Int16 => "INT16",
            FieldKind::Int32 => "INT32",
            FieldKind::Int64 => "INT64",
            FieldKind::Float => "FLOAT",
            FieldKind::Str => "STR",
            FieldKind::Time => "TIME",
            FieldKind::RecordBegin => "RECORD_BEGIN",
            FieldKind::RecordEnd => "RECORD_END",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

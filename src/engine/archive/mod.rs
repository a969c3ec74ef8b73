//! Версионированные архивы записей.
//!
//! ## Формат
//!
//! ```text
//! [PDAT][ревизия: u8][версия: i32 BE][поле…]
//! поле = [тег: u8][нагрузка]
//! ```
//!
//! Сжатый архив — тот же поток внутри одного zstd-кадра. Текстовые архивы
//! старого формата (без сигнатуры, возможно в gzip) читаются тем же
//! [`RecordReader`], но не записываются.
//!
//! ## Пример
//!
//! ```no_run
//! use posdata::engine::archive::{RecordReader, RecordWriter, TimeStamp};
//!
//! let mut w = RecordWriter::create("jobs.dat", 3, true)?;
//! w.write(&42u32)?;
//! w.write_hint(&7i64, 1)?; // один байт на диске
//! w.write(&TimeStamp::unset())?;
//! w.close()?;
//!
//! let mut r = RecordReader::open("jobs.dat")?;
//! assert_eq!(r.version(), 3);
//! let id: u32 = r.read()?;
//! let short: i64 = r.read()?;
//! let when: TimeStamp = r.read()?;
//! # let _ = (id, short, when);
//! # Ok::<(), posdata_error::StackError>(())
//! ```
//!
//! ## Модули
//!
//! - [`value`] — носитель целых, строки, деньги, время
//! - [`field`] — [`FieldValue`] и трейт [`FieldType`]
//! - [`encode`] / [`decode`] — бинарный кодек полей
//! - [`scanner`] — токены текстового формата
//! - [`compression`] — определение упаковки и zstd
//! - [`reader`] / [`writer`] — чтение и запись архивов

pub mod compression;
pub mod decode;
pub mod encode;
pub mod field;
pub mod file;
pub mod offset;
pub mod reader;
pub mod scanner;
pub mod tags;
pub mod value;
pub mod varint;
pub mod writer;

use posdata_error::PosResult;

pub use compression::{open_source, ArchiveSink, ArchiveSource, DEFAULT_COMPRESSION_LEVEL};
pub use field::{parse_int_token, FieldType, FieldValue};
pub use file::{Framing, FormatVersion, CONTAINER_MAGIC};
pub use offset::OffsetRead;
pub use reader::{Entry, RecordReader};
pub use scanner::TokenScanner;
pub use tags::FieldKind;
pub use value::{
    Carrier, Money, Percent, StringClass, TimeStamp, Width, LONG_STRING_LIMIT, SHORT_STRING_LIMIT,
};
pub use writer::{RecordWriter, WriterOptions};

/// Сериализация сущности в архив.
///
/// Порядок полей для версии `V` — расширение порядка для `V - 1`: новые
/// поля добавляются в конец и читаются под `if version >= N`. Поля, которые
/// записал более новый код, читатель пропускает до конца записи сам.
///
/// ```
/// use posdata::engine::archive::{Persist, RecordReader, RecordWriter};
/// use posdata_error::PosResult;
///
/// #[derive(Default)]
/// struct Job {
///     id: u32,
///     title: String,
///     tips: Option<i32>,
/// }
///
/// impl Persist for Job {
///     fn read_from(&mut self, r: &mut RecordReader, version: i32) -> PosResult<()> {
///         self.id = r.read()?;
///         self.title = r.read()?;
///         if version >= 2 {
///             self.tips = Some(r.read()?);
///         }
///         Ok(())
///     }
///
///     fn write_to(&self, w: &mut RecordWriter, _version: i32) -> PosResult<()> {
///         w.write(&self.id)?;
///         w.write(&self.title)?;
///         w.write(&self.tips.unwrap_or(0))
///     }
/// }
/// ```
pub trait Persist {
    fn read_from(
        &mut self,
        reader: &mut RecordReader,
        version: i32,
    ) -> PosResult<()>;

    fn write_to(
        &self,
        writer: &mut RecordWriter,
        version: i32,
    ) -> PosResult<()>;
}

//! Запись архивов: [`RecordWriter`].

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use byteorder::{BigEndian, WriteBytesExt};
use posdata_error::{ArchiveError, PosResult, ResultExt};
use tracing::{debug, warn};

use super::{
    compression::{ArchiveSink, DEFAULT_COMPRESSION_LEVEL},
    encode::{write_carrier, write_field as encode_field, write_marker},
    field::{FieldType, FieldValue},
    file::{CONTAINER_MAGIC, CONTAINER_REVISION},
    tags::FieldKind,
    value::{Carrier, StringClass, TimeStamp, Width},
    Persist,
};

type BoxedSink = ArchiveSink<BufWriter<Box<dyn Write + Send>>>;

/// Параметры создания архива.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub compress: bool,
    pub level: i32,
    pub string_class: StringClass,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compress: false,
            level: DEFAULT_COMPRESSION_LEVEL,
            string_class: StringClass::Short,
        }
    }
}

impl WriterOptions {
    pub fn compressed(compress: bool) -> Self {
        Self {
            compress,
            ..Self::default()
        }
    }
}

/// Писатель одного архива.
///
/// Всё, что записано, становится видимым на диске только после `close()`
/// (или `Drop`): сжатый кадр завершается именно там.
pub struct RecordWriter {
    label: String,
    sink: Option<BoxedSink>,
    version: i32,
    compressed: bool,
    string_class: StringClass,
    fields_written: u64,
    records_written: u64,
}

impl RecordWriter {
    /// Создаёт (или обрезает) файл и пишет заголовок.
    pub fn create<P: AsRef<Path>>(
        path: P,
        version: i32,
        use_compression: bool,
    ) -> PosResult<Self> {
        Self::create_with(path, version, WriterOptions::compressed(use_compression))
    }

    pub fn create_with<P: AsRef<Path>>(
        path: P,
        version: i32,
        options: WriterOptions,
    ) -> PosResult<Self> {
        let path = path.as_ref();
        let file =
            File::create(path).map_err(|e| ArchiveError::open(path.display().to_string(), &e))?;
        Self::from_writer(file, path.display().to_string(), version, options)
    }

    /// Писатель поверх произвольного приёмника байт.
    pub fn from_writer<W>(
        inner: W,
        label: impl Into<String>,
        version: i32,
        options: WriterOptions,
    ) -> PosResult<Self>
    where
        W: Write + Send + 'static,
    {
        let label = label.into();
        let boxed: Box<dyn Write + Send> = Box::new(inner);
        let mut sink = ArchiveSink::new(BufWriter::new(boxed), options.compress, options.level)?;

        sink.write_all(CONTAINER_MAGIC)
            .context("writing container signature")?;
        sink.write_u8(CONTAINER_REVISION)
            .context("writing container revision")?;
        sink.write_i32::<BigEndian>(version)
            .context("writing version header")?;

        debug!(archive = %label, version, compress = options.compress, "Created archive");

        Ok(Self {
            label,
            sink: Some(sink),
            version,
            compressed: options.compress,
            string_class: options.string_class,
            fields_written: 0,
            records_written: 0,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn fields_written(&self) -> u64 {
        self.fields_written
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    pub fn set_string_class(
        &mut self,
        class: StringClass,
    ) {
        self.string_class = class;
    }

    fn sink(
        &mut self,
        operation: &str,
    ) -> PosResult<&mut BoxedSink> {
        self.sink.as_mut().ok_or_else(|| {
            ArchiveError::Closed {
                operation: operation.to_string(),
            }
            .into()
        })
    }

    /// Пишет поле как есть.
    pub fn write_field(
        &mut self,
        field: &FieldValue,
    ) -> PosResult<()> {
        let limit = self.string_class.limit();
        encode_field(self.sink("write")?, field, limit)?;
        self.fields_written += 1;
        Ok(())
    }

    /// Базовая запись целого. `width_hint` — ширина в байтах (1, 2, 4, 8)
    /// или 0 для ширины носителя; значение, которое не помещается,
    /// отвергается.
    pub fn write_value(
        &mut self,
        carrier: Carrier,
        width_hint: u8,
    ) -> PosResult<()> {
        let carrier = match Width::from_hint(width_hint)? {
            Some(width) => carrier.resize(width)?,
            None => carrier,
        };
        let sink = self.sink("write")?;
        sink.write_u8(carrier.width().kind().tag())
            .context("writing field tag")?;
        write_carrier(sink, carrier)?;
        self.fields_written += 1;
        Ok(())
    }

    pub fn write<T: FieldType>(
        &mut self,
        value: &T,
    ) -> PosResult<()> {
        self.write_hint(value, 0)
    }

    /// Типизированная запись с подсказкой ширины. Для нецелых полей
    /// подсказка не влияет на кодирование.
    pub fn write_hint<T: FieldType>(
        &mut self,
        value: &T,
        width_hint: u8,
    ) -> PosResult<()> {
        match value.to_field() {
            FieldValue::Int(carrier) => self.write_value(carrier, width_hint),
            field => self.write_field(&field),
        }
    }

    /// Условная запись: `None` не пишет ни байта. Возвращает, было ли поле
    /// записано.
    pub fn write_opt<T: FieldType>(
        &mut self,
        value: Option<&T>,
    ) -> PosResult<bool> {
        match value {
            None => Ok(false),
            Some(v) => self.write(v).map(|_| true),
        }
    }

    pub fn write_string(
        &mut self,
        s: &str,
        class: StringClass,
    ) -> PosResult<()> {
        let sink = self.sink("write")?;
        encode_field(sink, &FieldValue::Str(s.to_string()), class.limit())?;
        self.fields_written += 1;
        Ok(())
    }

    pub fn write_time(
        &mut self,
        ts: TimeStamp,
    ) -> PosResult<()> {
        self.write_field(&FieldValue::Time(ts))
    }

    /// Пишет запись сущности в рамке begin/end.
    pub fn write_record<T: Persist + ?Sized>(
        &mut self,
        value: &T,
    ) -> PosResult<()> {
        write_marker(self.sink("write")?, FieldKind::RecordBegin)?;
        let version = self.version;
        value
            .write_to(self, version)
            .with_context(|| format!("writing record {}", self.records_written + 1))?;
        write_marker(self.sink("write")?, FieldKind::RecordEnd)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn write_records<'a, T, I>(
        &mut self,
        items: I,
    ) -> PosResult<()>
    where
        T: Persist + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        for item in items {
            self.write_record(item)?;
        }
        Ok(())
    }

    /// Сбрасывает буферы, завершает сжатый кадр и освобождает файл.
    /// Повторный вызов ничего не делает.
    pub fn close(&mut self) -> PosResult<()> {
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };
        sink.finish()
            .with_context(|| format!("closing archive {}", self.label))?;

        debug!(
            archive = %self.label,
            fields = self.fields_written,
            records = self.records_written,
            "Closed archive writer"
        );
        Ok(())
    }
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(archive = %self.label, error = %e, "Failed to close archive on drop");
        }
    }
}

impl std::fmt::Debug for RecordWriter {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RecordWriter")
            .field("label", &self.label)
            .field("version", &self.version)
            .field("compressed", &self.compressed)
            .field("closed", &self.is_closed())
            .finish()
    }
}

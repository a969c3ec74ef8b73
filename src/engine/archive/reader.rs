//! Чтение архивов: [`RecordReader`].
//!
//! Читатель сам определяет упаковку архива, читает заголовок и отдаёт
//! поля по одному. Текстовые архивы старого формата читаются тем же API:
//! типизированные чтения разбирают токены вместо бинарных полей.

use std::{
    fs::File,
    io::{BufRead, Read},
    path::Path,
};

use byteorder::{BigEndian, ReadBytesExt};
use posdata_error::{ArchiveError, PosResult, ResultExt, StackError};
use tracing::{debug, trace};

use super::{
    compression::{open_source, ArchiveSource},
    decode::{read_failure, read_payload, read_tag, skip_payload},
    field::{parse_int_token, FieldType, FieldValue},
    file::{Framing, FormatVersion, CONTAINER_MAGIC},
    offset::OffsetRead,
    scanner::TokenScanner,
    tags::FieldKind,
    value::{Carrier, StringClass, TimeStamp},
    Persist,
};

/// Элемент бинарного потока: значение или маркер записи.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(FieldValue),
    RecordBegin,
    RecordEnd,
}

enum Source {
    Binary(OffsetRead<ArchiveSource>),
    Text(TokenScanner<OffsetRead<ArchiveSource>>),
}

impl Source {
    fn offset(&self) -> u64 {
        match self {
            Source::Binary(r) => r.offset(),
            Source::Text(s) => s.get_ref().offset(),
        }
    }
}

/// Читатель одного архива.
///
/// Владеет дескриптором и буферами до `close()` или `Drop`.
pub struct RecordReader {
    label: String,
    framing: Framing,
    revision: Option<FormatVersion>,
    version: i32,
    source: Option<Source>,
    end_of_stream: bool,
    string_class: StringClass,
    fields_read: u64,
    records_read: u64,
}

impl RecordReader {
    /// Открывает архив по пути и читает заголовок.
    pub fn open<P: AsRef<Path>>(path: P) -> PosResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ArchiveError::open(path.display().to_string(), &e))?;
        Self::from_reader(file, path.display().to_string())
            .with_context(|| format!("opening archive {}", path.display()))
    }

    /// Читатель поверх произвольного источника байт.
    pub fn from_reader<R>(
        inner: R,
        label: impl Into<String>,
    ) -> PosResult<Self>
    where
        R: Read + Send + 'static,
    {
        let label = label.into();
        let (framing, source) = open_source(inner)?;
        let mut source = OffsetRead::new(source);

        let (revision, version, source) = if framing.is_binary() {
            let (revision, version) = read_binary_header(&mut source)?;
            (Some(revision), version, Source::Binary(source))
        } else {
            let mut scanner = TokenScanner::new(source);
            let version = read_text_header(&mut scanner)?;
            (None, version, Source::Text(scanner))
        };

        debug!(archive = %label, framing = %framing, version, "Opened archive");

        Ok(Self {
            label,
            framing,
            revision,
            version,
            source: Some(source),
            end_of_stream: false,
            string_class: StringClass::default(),
            fields_read: 0,
            records_read: 0,
        })
    }

    /// Класс строк для `read::<String>()` и `read_token` без явного лимита.
    pub fn with_string_class(
        mut self,
        class: StringClass,
    ) -> Self {
        self.string_class = class;
        self
    }

    pub fn set_string_class(
        &mut self,
        class: StringClass,
    ) {
        self.string_class = class;
    }

    /// Версия записи из заголовка архива.
    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Ревизия контейнера; у текстовых архивов её нет.
    pub fn revision(&self) -> Option<FormatVersion> {
        self.revision
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Выставляется, когда чтение упёрлось в конец данных.
    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Смещение в логическом потоке архива.
    pub fn offset(&self) -> u64 {
        self.source.as_ref().map_or(0, Source::offset)
    }

    pub fn fields_read(&self) -> u64 {
        self.fields_read
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    fn source(
        &mut self,
        operation: &str,
    ) -> PosResult<&mut Source> {
        self.source.as_mut().ok_or_else(|| {
            ArchiveError::Closed {
                operation: operation.to_string(),
            }
            .into()
        })
    }

    /// Дописывает смещение к ошибке архива и отмечает обрыв потока.
    fn fail(
        &mut self,
        err: StackError,
        offset: u64,
    ) -> StackError {
        let Some(archive) = err.downcast_ref::<ArchiveError>() else {
            return err;
        };
        if archive.is_truncation() {
            self.end_of_stream = true;
        }
        if err.contexts().is_empty() {
            StackError::new(archive.clone().with_offset(offset))
        } else {
            err
        }
    }

    fn text_only(&self) -> ArchiveError {
        ArchiveError::TypeMismatch {
            expected: "text archive".to_string(),
            found: format!("{} archive", self.framing),
            offset: None,
        }
    }

    /// Следующий элемент бинарного потока или `None` в конце.
    ///
    /// В текстовом архиве каждый токен возвращается как строковое значение.
    pub fn next_entry(&mut self) -> PosResult<Option<Entry>> {
        let limit = self.string_class.limit();
        let start = self.offset();
        let result = match self.source("read")? {
            Source::Binary(r) => match read_tag(r) {
                Ok(None) => Ok(None),
                Ok(Some(FieldKind::RecordBegin)) => Ok(Some(Entry::RecordBegin)),
                Ok(Some(FieldKind::RecordEnd)) => Ok(Some(Entry::RecordEnd)),
                Ok(Some(kind)) => read_payload(r, kind, limit).map(|v| Some(Entry::Value(v))),
                Err(e) => Err(e),
            },
            Source::Text(s) => s
                .next_token(limit)
                .map(|t| t.map(|t| Entry::Value(FieldValue::Str(t)))),
        };

        match result {
            Ok(None) => {
                self.end_of_stream = true;
                Ok(None)
            }
            Ok(Some(entry)) => {
                if matches!(entry, Entry::Value(_)) {
                    self.fields_read += 1;
                }
                Ok(Some(entry))
            }
            Err(e) => Err(self.fail(e, start)),
        }
    }

    /// Вид следующего поля без потребления; `None` в конце потока.
    ///
    /// Текстовые токены не типизированы, для них возвращается `Str`.
    pub fn peek_kind(&mut self) -> PosResult<Option<FieldKind>> {
        let start = self.offset();
        let result = match self.source("peek")? {
            Source::Binary(r) => match r.fill_buf() {
                Ok([]) => Ok(None),
                Ok([tag, ..]) => FieldKind::try_from(*tag).map(Some).map_err(|_| {
                    ArchiveError::InvalidTag {
                        tag: *tag,
                        offset: None,
                    }
                    .into()
                }),
                Err(e) => Err(read_failure(e, "peeking field tag", 1)),
            },
            Source::Text(s) => s.peek_token().map(|t| t.map(|_| FieldKind::Str)),
        };
        result.map_err(|e| self.fail(e, start))
    }

    /// Следующее значение с лимитом строки `string_limit`.
    pub fn read_field_limited(
        &mut self,
        string_limit: usize,
    ) -> PosResult<FieldValue> {
        let saved = self.string_class;
        self.string_class = StringClass::Limit(string_limit);
        let result = self.read_field();
        self.string_class = saved;
        result
    }

    /// Следующее значение; маркер записи на его месте — ошибка.
    pub fn read_field(&mut self) -> PosResult<FieldValue> {
        let start = self.offset();
        match self.next_entry()? {
            Some(Entry::Value(v)) => Ok(v),
            Some(marker) => {
                let found = if marker == Entry::RecordBegin {
                    FieldKind::RecordBegin
                } else {
                    FieldKind::RecordEnd
                };
                Err(ArchiveError::TypeMismatch {
                    expected: "field value".to_string(),
                    found: found.name().to_string(),
                    offset: Some(start),
                }
                .into())
            }
            None => Err(ArchiveError::UnexpectedEof {
                context: "reading field".to_string(),
                offset: Some(start),
                expected_bytes: None,
            }
            .into()),
        }
    }

    /// Базовое чтение целого: всё остальное строится на нём и сужении.
    pub fn read_value(&mut self) -> PosResult<Carrier> {
        let start = self.offset();
        match self.read_field()? {
            FieldValue::Int(c) => Ok(c),
            FieldValue::Str(token) if !self.framing.is_binary() => {
                parse_int_token(&token).map_err(|e| e.with_offset(start).into())
            }
            other => Err(ArchiveError::TypeMismatch {
                expected: "integer".to_string(),
                found: other.kind().name().to_string(),
                offset: Some(start),
            }
            .into()),
        }
    }

    /// Типизированное чтение.
    pub fn read<T: FieldType>(&mut self) -> PosResult<T> {
        let start = self.offset();
        let field = self.read_field()?;
        let parsed = match field {
            FieldValue::Str(token) if !self.framing.is_binary() => T::from_token(&token),
            field => T::from_field(field),
        };
        parsed.map_err(|e| e.with_offset(start).into())
    }

    pub fn read_into<T: FieldType>(
        &mut self,
        dest: &mut T,
    ) -> PosResult<()> {
        *dest = self.read()?;
        Ok(())
    }

    /// Условное чтение: `None` не потребляет ничего, `Some` читает поле.
    /// Возвращает, было ли поле прочитано.
    pub fn read_opt<T: FieldType>(
        &mut self,
        dest: Option<&mut T>,
    ) -> PosResult<bool> {
        match dest {
            None => Ok(false),
            Some(dest) => self.read_into(dest).map(|_| true),
        }
    }

    /// Пропускает одно присутствующее поле; вложенная запись пропускается
    /// целиком.
    pub fn skip_field(&mut self) -> PosResult<()> {
        let start = self.offset();
        let result = match self.source("skip")? {
            Source::Binary(r) => match read_tag(r) {
                Ok(Some(FieldKind::RecordBegin)) => Ok(Some(true)),
                Ok(Some(FieldKind::RecordEnd)) => Err(ArchiveError::TypeMismatch {
                    expected: "field value".to_string(),
                    found: FieldKind::RecordEnd.name().to_string(),
                    offset: None,
                }
                .into()),
                Ok(Some(kind)) => skip_payload(r, kind).map(|_| Some(false)),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            },
            Source::Text(s) => s
                .next_token(usize::MAX)
                .map(|t| t.map(|_| false)),
        };

        match result.map_err(|e| self.fail(e, start))? {
            Some(true) => self.finish_record().map(|_| ()),
            Some(false) => Ok(()),
            None => {
                self.end_of_stream = true;
                Err(self.fail(
                    ArchiveError::UnexpectedEof {
                        context: "skipping field".to_string(),
                        offset: None,
                        expected_bytes: None,
                    }
                    .into(),
                    start,
                ))
            }
        }
    }

    pub fn read_u8(&mut self) -> PosResult<u8> {
        self.read()
    }

    pub fn read_u16(&mut self) -> PosResult<u16> {
        self.read()
    }

    pub fn read_u32(&mut self) -> PosResult<u32> {
        self.read()
    }

    pub fn read_u64(&mut self) -> PosResult<u64> {
        self.read()
    }

    pub fn read_i8(&mut self) -> PosResult<i8> {
        self.read()
    }

    pub fn read_i16(&mut self) -> PosResult<i16> {
        self.read()
    }

    pub fn read_i32(&mut self) -> PosResult<i32> {
        self.read()
    }

    pub fn read_i64(&mut self) -> PosResult<i64> {
        self.read()
    }

    pub fn read_f64(&mut self) -> PosResult<f64> {
        self.read()
    }

    pub fn read_time(&mut self) -> PosResult<TimeStamp> {
        self.read()
    }

    /// Строка с лимитом класса `class`.
    pub fn read_string(
        &mut self,
        class: StringClass,
    ) -> PosResult<String> {
        let start = self.offset();
        let field = self.read_field_limited(class.limit())?;
        String::from_field(field).map_err(|e| e.with_offset(start).into())
    }

    /// Токен старого формата. В бинарном архиве читает строковое поле;
    /// `None` означает чистый конец потока.
    pub fn read_token(
        &mut self,
        max_len: usize,
    ) -> PosResult<Option<String>> {
        if self.peek_kind()?.is_none() {
            self.end_of_stream = true;
            return Ok(None);
        }
        let start = self.offset();
        match self.read_field_limited(max_len)? {
            FieldValue::Str(s) => Ok(Some(s)),
            other => Err(ArchiveError::TypeMismatch {
                expected: "token".to_string(),
                found: other.kind().name().to_string(),
                offset: Some(start),
            }
            .into()),
        }
    }

    /// Токен без потребления (только текстовые архивы).
    pub fn peek_token(&mut self) -> PosResult<Option<String>> {
        if self.framing.is_binary() {
            return Err(self.text_only().into());
        }
        match self.source("peek")? {
            Source::Text(s) => Ok(s.peek_token()?.map(str::to_string)),
            Source::Binary(_) => Ok(None),
        }
    }

    /// Диагностика: `n` ближайших токенов текстового архива.
    pub fn dump_upcoming(
        &mut self,
        n: usize,
    ) -> PosResult<String> {
        if self.framing.is_binary() {
            return Err(self.text_only().into());
        }
        match self.source("dump")? {
            Source::Text(s) => s.dump_upcoming(n),
            Source::Binary(_) => Ok(String::new()),
        }
    }

    /// Дочитывает текущую запись до её маркера конца, пропуская поля,
    /// которых этот код не знает. Возвращает число пропущенных полей.
    pub fn finish_record(&mut self) -> PosResult<u64> {
        if !self.framing.is_binary() {
            return Ok(0);
        }

        let mut depth = 0usize;
        let mut skipped = 0u64;
        loop {
            let start = self.offset();
            let result = match self.source("skip")? {
                Source::Binary(r) => match read_tag(r) {
                    Ok(Some(FieldKind::RecordEnd)) if depth == 0 => break,
                    Ok(Some(FieldKind::RecordEnd)) => {
                        depth -= 1;
                        Ok(())
                    }
                    Ok(Some(FieldKind::RecordBegin)) => {
                        depth += 1;
                        Ok(())
                    }
                    Ok(Some(kind)) => {
                        skipped += 1;
                        skip_payload(r, kind)
                    }
                    Ok(None) => Err(ArchiveError::UnexpectedEof {
                        context: "looking for record end".to_string(),
                        offset: None,
                        expected_bytes: None,
                    }
                    .into()),
                    Err(e) => Err(e),
                },
                Source::Text(_) => break,
            };
            result.map_err(|e| self.fail(e, start))?;
        }

        if skipped > 0 {
            debug!(archive = %self.label, skipped, "Skipped fields unknown to this reader");
        }
        Ok(skipped)
    }

    /// Читает запись в рамке begin/end. При ошибке частично собранная
    /// сущность отбрасывается.
    pub fn read_record<T: Persist + Default>(&mut self) -> PosResult<T> {
        let mut value = T::default();
        self.read_record_into(&mut value)?;
        Ok(value)
    }

    /// Как `read_record`, но в существующий объект. При ошибке содержимое
    /// `dest` не определено и не должно использоваться.
    pub fn read_record_into<T: Persist>(
        &mut self,
        dest: &mut T,
    ) -> PosResult<()> {
        let start = self.offset();
        if self.framing.is_binary() {
            match self.next_entry()? {
                Some(Entry::RecordBegin) => {}
                Some(other) => {
                    let found = match other {
                        Entry::Value(v) => v.kind().name().to_string(),
                        _ => FieldKind::RecordEnd.name().to_string(),
                    };
                    return Err(ArchiveError::TypeMismatch {
                        expected: FieldKind::RecordBegin.name().to_string(),
                        found,
                        offset: Some(start),
                    }
                    .into());
                }
                None => {
                    return Err(ArchiveError::UnexpectedEof {
                        context: "reading record start".to_string(),
                        offset: Some(start),
                        expected_bytes: None,
                    }
                    .into())
                }
            }
        }

        let version = self.version;
        dest.read_from(self, version)
            .with_context(|| format!("reading record {}", self.records_read + 1))?;
        self.finish_record()?;
        self.records_read += 1;
        trace!(archive = %self.label, record = self.records_read, "Record read");
        Ok(())
    }

    /// Читает записи до конца архива.
    pub fn read_records<T: Persist + Default>(&mut self) -> PosResult<Vec<T>> {
        let mut out = Vec::new();
        while self.peek_kind()?.is_some() {
            out.push(self.read_record()?);
        }
        self.end_of_stream = true;
        Ok(out)
    }

    /// Освобождает дескриптор. Повторный вызов ничего не делает.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!(
                archive = %self.label,
                fields = self.fields_read,
                records = self.records_read,
                "Closed archive reader"
            );
        }
    }
}

impl Drop for RecordReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RecordReader {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("label", &self.label)
            .field("framing", &self.framing)
            .field("version", &self.version)
            .field("end_of_stream", &self.end_of_stream)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn read_binary_header<R: Read>(r: &mut R) -> PosResult<(FormatVersion, i32)> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)
        .map_err(|e| read_failure(e, "reading container signature", 4))?;
    if &magic != CONTAINER_MAGIC {
        return Err(ArchiveError::InvalidMagic {
            expected: CONTAINER_MAGIC.to_vec(),
            got: magic.to_vec(),
        }
        .into());
    }

    let revision = r
        .read_u8()
        .map_err(|e| read_failure(e, "reading container revision", 1))?;
    let revision = FormatVersion::try_from(revision)?;

    let version = r
        .read_i32::<BigEndian>()
        .map_err(|e| read_failure(e, "reading version header", 4))?;
    Ok((revision, version))
}

fn read_text_header<R: BufRead>(scanner: &mut TokenScanner<R>) -> PosResult<i32> {
    let token = scanner.next_token(32)?.ok_or_else(|| ArchiveError::UnexpectedEof {
        context: "reading version header".to_string(),
        offset: Some(0),
        expected_bytes: None,
    })?;
    token.parse::<i32>().map_err(|e| {
        ArchiveError::ParseError {
            structure: "version header".to_string(),
            reason: format!("token {token:?}: {e}"),
            offset: Some(0),
        }
        .into()
    })
}

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    net::TcpStream,
    path::Path,
};

use posdata_error::{PosResult, ResultExt, SidecarError};

use super::{SidecarOptions, Terminator};

/// Символы, которые читатель считает концом записи.
const LINE_BREAKS: [char; 3] = ['\n', '\r', '\0'];

/// Писатель записей «ключ/значение».
pub struct KeyValueWriter<W: Write> {
    inner: Option<BufWriter<W>>,
    options: SidecarOptions,
    records: u64,
}

impl KeyValueWriter<File> {
    /// Создаёт (или обрезает) файл.
    pub fn create<P: AsRef<Path>>(
        path: P,
        options: SidecarOptions,
    ) -> PosResult<Self> {
        Self::open_with(path.as_ref(), options, false)
    }

    /// Дописывает в конец существующего файла.
    pub fn append<P: AsRef<Path>>(
        path: P,
        options: SidecarOptions,
    ) -> PosResult<Self> {
        Self::open_with(path.as_ref(), options, true)
    }

    fn open_with(
        path: &Path,
        options: SidecarOptions,
        append: bool,
    ) -> PosResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| SidecarError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::new(file, options)
    }

    #[cfg(unix)]
    pub fn from_fd(
        fd: std::os::fd::OwnedFd,
        options: SidecarOptions,
    ) -> PosResult<Self> {
        Self::new(File::from(fd), options)
    }
}

impl KeyValueWriter<TcpStream> {
    pub fn from_stream(stream: TcpStream) -> PosResult<Self> {
        Self::new(stream, SidecarOptions::socket())
    }
}

impl<W: Write> KeyValueWriter<W> {
    pub fn new(
        inner: W,
        options: SidecarOptions,
    ) -> PosResult<Self> {
        options.validate()?;
        Ok(Self {
            inner: Some(BufWriter::with_capacity(options.buffer_size, inner)),
            options,
            records: 0,
        })
    }

    pub fn terminator(&self) -> Terminator {
        self.options.terminator
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Пишет `key<разделитель>value` и терминатор.
    ///
    /// Запись, которую читатель не вернёт в том же виде, отвергается:
    /// пустой ключ, ключ с маркером комментария в начале, пробелы по краям
    /// ключа или значения, разделитель в ключе, концы строк.
    pub fn write(
        &mut self,
        key: &str,
        value: &str,
    ) -> PosResult<()> {
        self.check_record(key, value)?;

        let inner = self.inner.as_mut().ok_or(SidecarError::Closed)?;
        let mut line = String::with_capacity(key.len() + value.len() + 3);
        line.push_str(key);
        line.push(self.options.delimiter);
        line.push_str(value);
        inner
            .write_all(line.as_bytes())
            .and_then(|_| inner.write_all(self.options.terminator.as_bytes()))
            .with_context(|| format!("writing sidecar key {key:?}"))?;
        self.records += 1;
        Ok(())
    }

    /// Строка комментария.
    pub fn comment(
        &mut self,
        text: &str,
    ) -> PosResult<()> {
        if text.contains(LINE_BREAKS) {
            return Err(SidecarError::InvalidValue {
                key: self.options.comment.to_string(),
                reason: "comment contains a line terminator".to_string(),
            }
            .into());
        }
        let marker = self.options.comment;
        let inner = self.inner.as_mut().ok_or(SidecarError::Closed)?;
        write!(inner, "{marker} {text}")
            .and_then(|_| inner.write_all(self.options.terminator.as_bytes()))
            .context("writing sidecar comment")
    }

    fn check_record(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), SidecarError> {
        let invalid_key = |reason: &str| SidecarError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if key.is_empty() {
            return Err(invalid_key("key is empty"));
        }
        if key.starts_with(self.options.comment) {
            return Err(invalid_key("starts with the comment marker"));
        }
        if key.contains(self.options.delimiter) {
            return Err(SidecarError::DelimiterInKey {
                key: key.to_string(),
                delimiter: self.options.delimiter,
            });
        }
        if key.contains(LINE_BREAKS) {
            return Err(invalid_key("contains a line terminator"));
        }
        if key.trim() != key {
            return Err(invalid_key("has leading or trailing whitespace"));
        }
        if key.len() > self.options.max_len {
            return Err(invalid_key("longer than the configured max length"));
        }

        let invalid_value = |reason: &str| SidecarError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if value.contains(LINE_BREAKS) {
            return Err(invalid_value("contains a line terminator"));
        }
        if value.trim() != value {
            return Err(invalid_value("has leading or trailing whitespace"));
        }
        if value.len() > self.options.max_len {
            return Err(invalid_value("longer than the configured max length"));
        }
        Ok(())
    }

    pub fn flush(&mut self) -> PosResult<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush().context("flushing sidecar"),
            None => Ok(()),
        }
    }

    /// Сбрасывает буфер и освобождает приёмник. Повторный вызов ничего не
    /// делает.
    pub fn close(&mut self) -> PosResult<()> {
        match self.inner.take() {
            Some(mut inner) => inner.flush().context("closing sidecar"),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for KeyValueWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close sidecar writer on drop");
        }
    }
}

use std::{
    fs::File,
    io::{self, Read},
    net::TcpStream,
    path::Path,
};

use posdata_error::{PosResult, ResultExt, SidecarError};
use tracing::debug;

use super::{KeyValue, RecordSplitter, SidecarOptions};

/// Синхронный читатель записей «ключ/значение».
///
/// Источник — файл, открытый дескриптор (в том числе сокет) или любой
/// `Read`. Чтения идут кусками не больше внутреннего буфера; запись,
/// разорванная между чтениями, собирается целиком.
pub struct KeyValueReader<R> {
    inner: Option<R>,
    splitter: RecordSplitter,
    chunk: Vec<u8>,
    eof: bool,
    records: u64,
}

impl KeyValueReader<File> {
    pub fn open<P: AsRef<Path>>(
        path: P,
        options: SidecarOptions,
    ) -> PosResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SidecarError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::new(file, options)
    }

    /// Забирает владение уже открытым дескриптором.
    #[cfg(unix)]
    pub fn from_fd(
        fd: std::os::fd::OwnedFd,
        options: SidecarOptions,
    ) -> PosResult<Self> {
        Self::new(File::from(fd), options)
    }
}

impl KeyValueReader<TcpStream> {
    /// Сокетный вариант: по умолчанию записи заканчиваются `\0`.
    pub fn from_stream(stream: TcpStream) -> PosResult<Self> {
        Self::new(stream, SidecarOptions::socket())
    }
}

impl<R: Read> KeyValueReader<R> {
    pub fn new(
        inner: R,
        options: SidecarOptions,
    ) -> PosResult<Self> {
        options.validate()?;
        Ok(Self {
            inner: Some(inner),
            chunk: vec![0u8; options.buffer_size],
            splitter: RecordSplitter::new(options),
            eof: false,
            records: 0,
        })
    }

    pub fn options(&self) -> &SidecarOptions {
        self.splitter.options()
    }

    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Следующая запись или `None` в конце файла / после закрытия сокета
    /// собеседником.
    pub fn next_record(&mut self) -> PosResult<Option<KeyValue>> {
        loop {
            if let Some(kv) = self.splitter.next_record() {
                self.records += 1;
                return Ok(Some(kv));
            }
            if self.eof {
                let last = self.splitter.finish();
                if last.is_some() {
                    self.records += 1;
                }
                return Ok(last);
            }
            self.fill()?;
        }
    }

    /// Форма с буферами вызывающего кода: `Ok(false)` — записей больше нет.
    pub fn read(
        &mut self,
        key: &mut String,
        value: &mut String,
        max_len: usize,
    ) -> PosResult<bool> {
        self.splitter.set_max_len(max_len);
        match self.next_record()? {
            Some(kv) => {
                *key = kv.key;
                *value = kv.value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn fill(&mut self) -> PosResult<()> {
        let want = self.splitter.room().min(self.chunk.len());
        let inner = self.inner.as_mut().ok_or(SidecarError::Closed)?;
        loop {
            match inner.read(&mut self.chunk[..want]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.splitter.push(&self.chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    debug!(error = %e, "Sidecar peer went away");
                    self.eof = true;
                    return Ok(());
                }
                Err(e) => return Err(e).context("reading sidecar data"),
            }
        }
    }

    /// Освобождает источник. Повторный вызов ничего не делает.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!(records = self.records, "Closed sidecar reader");
        }
    }
}

impl<R: Read> Iterator for KeyValueReader<R> {
    type Item = PosResult<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Источник, который отдаёт заранее нарезанные куски по одному за
    /// чтение, как сокет.
    struct Chunked {
        parts: Vec<Vec<u8>>,
    }

    impl Read for Chunked {
        fn read(
            &mut self,
            buf: &mut [u8],
        ) -> io::Result<usize> {
            if self.parts.is_empty() {
                return Ok(0);
            }
            let part = self.parts.remove(0);
            let n = part.len().min(buf.len());
            buf[..n].copy_from_slice(&part[..n]);
            if n < part.len() {
                self.parts.insert(0, part[n..].to_vec());
            }
            Ok(n)
        }
    }

    #[test]
    fn test_socket_partial_read() {
        let source = Chunked {
            parts: vec![b"Order".to_vec(), b"ID:7\0".to_vec()],
        };
        let mut r = KeyValueReader::new(source, SidecarOptions::socket()).unwrap();
        assert_eq!(r.next_record().unwrap(), Some(KeyValue::new("OrderID", "7")));
        assert_eq!(r.next_record().unwrap(), None);
    }

    #[test]
    fn test_read_into_buffers() {
        let mut r = KeyValueReader::new(
            Cursor::new(b"name: Main Bar\n".to_vec()),
            SidecarOptions::default(),
        )
        .unwrap();
        let (mut k, mut v) = (String::new(), String::new());
        assert!(r.read(&mut k, &mut v, 4).unwrap());
        assert_eq!((k.as_str(), v.as_str()), ("name", "Main"));
        assert!(!r.read(&mut k, &mut v, 4).unwrap());
    }

    /// Тест проверяет, что маленький буфер не ломает длинный поток записей.
    #[test]
    fn test_small_buffer_many_records() {
        let mut data = Vec::new();
        for i in 0..100 {
            data.extend_from_slice(format!("key{i}:{i}\n").as_bytes());
        }
        let options = SidecarOptions {
            buffer_size: 16,
            ..SidecarOptions::default()
        };
        let r = KeyValueReader::new(Cursor::new(data), options).unwrap();
        let records: Vec<KeyValue> = r.map(Result::unwrap).collect();
        assert_eq!(records.len(), 100);
        assert_eq!(records[42], KeyValue::new("key42", "42"));
    }

    #[test]
    fn test_read_after_close() {
        let mut r =
            KeyValueReader::new(Cursor::new(b"a:1\n".to_vec()), SidecarOptions::default()).unwrap();
        r.close();
        r.close();
        let err = r.next_record().unwrap_err();
        assert!(err.downcast_ref::<SidecarError>().is_some());
    }
}

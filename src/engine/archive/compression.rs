//! Потоковое сжатие архивов.
//!
//! Запись: [`ArchiveSink`] либо пропускает байты как есть, либо упаковывает
//! весь архив в один zstd-поток. Чтение: [`open_source`] смотрит на первые
//! байты и сам выбирает распаковщик, поэтому читателю не нужно знать, как
//! архив был записан.

use std::io::{self, BufRead, BufReader, Cursor, Read, Write};

use flate2::read::GzDecoder;
use posdata_error::{ArchiveError, CompressionOp, PosResult, ResultExt};
use tracing::trace;

use super::file::Framing;

/// Уровень zstd по умолчанию: баланс скорости и размера.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Источник байт архива после распаковки.
pub type ArchiveSource = Box<dyn BufRead + Send>;

/// Приёмник байт архива.
pub enum ArchiveSink<W: Write> {
    Plain(W),
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> ArchiveSink<W> {
    pub fn new(
        inner: W,
        compress: bool,
        level: i32,
    ) -> PosResult<Self> {
        if !compress {
            return Ok(ArchiveSink::Plain(inner));
        }
        let encoder = zstd::stream::write::Encoder::new(inner, level).map_err(|e| {
            ArchiveError::CompressionError {
                operation: CompressionOp::Compress,
                reason: e.to_string(),
                offset: None,
            }
        })?;
        Ok(ArchiveSink::Zstd(encoder))
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, ArchiveSink::Zstd(_))
    }

    /// Завершает zstd-кадр (если он есть) и сбрасывает буферы.
    pub fn finish(self) -> PosResult<W> {
        let mut inner = match self {
            ArchiveSink::Plain(w) => w,
            ArchiveSink::Zstd(encoder) => {
                encoder
                    .finish()
                    .map_err(|e| ArchiveError::CompressionError {
                        operation: CompressionOp::Compress,
                        reason: e.to_string(),
                        offset: None,
                    })?
            }
        };
        inner.flush().context("flushing archive")?;
        Ok(inner)
    }
}

impl<W: Write> Write for ArchiveSink<W> {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> io::Result<usize> {
        match self {
            ArchiveSink::Plain(w) => w.write(buf),
            ArchiveSink::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveSink::Plain(w) => w.flush(),
            ArchiveSink::Zstd(e) => e.flush(),
        }
    }
}

/// Распаковщик, который превращает сбои декодера в
/// `ArchiveError::CompressionError`, оставляя обрыв потока обрывом.
struct Decompressing<R> {
    inner: R,
}

impl<R: Read> Read for Decompressing<R> {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        self.inner.read(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof || e.kind() == io::ErrorKind::Interrupted {
                return e;
            }
            io::Error::new(
                io::ErrorKind::InvalidData,
                ArchiveError::CompressionError {
                    operation: CompressionOp::Decompress,
                    reason: e.to_string(),
                    offset: None,
                },
            )
        })
    }
}

/// Читает до `n` байт префикса, не теряя их для дальнейшего чтения.
fn read_prefix<R: Read>(
    inner: &mut R,
    n: usize,
) -> io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(n);
    inner.by_ref().take(n as u64).read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Определяет упаковку архива и возвращает распакованный источник.
pub fn open_source<R>(mut inner: R) -> PosResult<(Framing, ArchiveSource)>
where
    R: Read + Send + 'static,
{
    let prefix = read_prefix(&mut inner, 4).context("reading container signature")?;
    let framing = Framing::detect(&prefix)?;
    trace!(framing = %framing, "Detected archive framing");

    let raw = Cursor::new(prefix).chain(inner);
    let source: ArchiveSource = match framing {
        Framing::CompressedBinary => {
            let decoder = zstd::stream::read::Decoder::new(raw).map_err(|e| {
                ArchiveError::CompressionError {
                    operation: CompressionOp::Decompress,
                    reason: e.to_string(),
                    offset: None,
                }
            })?;
            Box::new(BufReader::new(Decompressing { inner: decoder }))
        }
        Framing::LegacyGzipText => Box::new(BufReader::new(Decompressing {
            inner: GzDecoder::new(raw),
        })),
        Framing::Binary | Framing::LegacyText => Box::new(BufReader::new(raw)),
    };

    Ok((framing, source))
}

#[cfg(test)]
mod tests {
    use flate2::{write::GzEncoder, Compression};

    use super::*;

    fn zstd_bytes(data: &[u8]) -> Vec<u8> {
        let mut sink = ArchiveSink::new(Vec::new(), true, DEFAULT_COMPRESSION_LEVEL).unwrap();
        sink.write_all(data).unwrap();
        sink.finish().unwrap()
    }

    /// Тест проверяет, что сжатый поток распознаётся и распаковывается
    /// прозрачно.
    #[test]
    fn test_zstd_source_roundtrip() {
        let data = b"PDAT\x01 payload payload payload".to_vec();
        let packed = zstd_bytes(&data);
        assert_eq!(&packed[..4], &[0x28, 0xB5, 0x2F, 0xFD]);

        let (framing, mut source) = open_source(Cursor::new(packed)).unwrap();
        assert_eq!(framing, Framing::CompressedBinary);
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_plain_sink_passthrough() {
        let mut sink = ArchiveSink::new(Vec::new(), false, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(!sink.is_compressed());
        sink.write_all(b"PDAT").unwrap();
        assert_eq!(sink.finish().unwrap(), b"PDAT");
    }

    #[test]
    fn test_gzip_text_source() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"7 \"Bob\" 42\n").unwrap();
        let packed = enc.finish().unwrap();

        let (framing, mut source) = open_source(Cursor::new(packed)).unwrap();
        assert_eq!(framing, Framing::LegacyGzipText);
        let mut out = String::new();
        source.read_to_string(&mut out).unwrap();
        assert_eq!(out, "7 \"Bob\" 42\n");
    }

    /// Тест проверяет, что источник короче четырёх байт не теряет префикс.
    #[test]
    fn test_short_source_keeps_prefix() {
        let (framing, mut source) = open_source(Cursor::new(b"7\n".to_vec())).unwrap();
        assert_eq!(framing, Framing::LegacyText);
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"7\n");
    }

    /// Тест проверяет, что мусор внутри zstd-кадра даёт ошибку распаковки,
    /// а не панику.
    #[test]
    fn test_corrupt_zstd_stream() {
        // Зарезервированный бит в дескрипторе заголовка кадра.
        let mut packed = vec![0x28, 0xB5, 0x2F, 0xFD, 0xFF];
        packed.extend_from_slice(&[0xAB; 32]);
        let (_, mut source) = open_source(Cursor::new(packed)).unwrap();
        let mut out = Vec::new();
        let err = source.read_to_end(&mut out).unwrap_err();
        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<ArchiveError>())
            .cloned();
        assert!(
            matches!(inner, Some(ArchiveError::CompressionError { .. }))
                || err.kind() == io::ErrorKind::UnexpectedEof
        );
    }
}

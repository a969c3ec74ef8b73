//! Разбиение потока байт на записи «ключ/значение».
//!
//! Сплиттер не делает ввода-вывода: ему скармливают куски данных в том
//! виде, в каком они пришли из файла или сокета, и забирают готовые
//! записи. Запись может прийти по частям в нескольких чтениях.

use bytes::{Buf, BytesMut};
use memchr::memchr3;
use tracing::warn;

use super::{KeyValue, SidecarOptions};

/// Состояние разбора между кусками данных.
#[derive(Debug)]
pub struct RecordSplitter {
    buf: BytesMut,
    options: SidecarOptions,
    /// Строка не поместилась в буфер: байты до конца строки отбрасываются.
    discarding: bool,
    lines: u64,
}

impl RecordSplitter {
    pub fn new(options: SidecarOptions) -> Self {
        Self {
            buf: BytesMut::with_capacity(options.buffer_size),
            options,
            discarding: false,
            lines: 0,
        }
    }

    pub fn options(&self) -> &SidecarOptions {
        &self.options
    }

    pub fn set_max_len(
        &mut self,
        max_len: usize,
    ) {
        self.options.max_len = max_len;
    }

    /// Сколько строк (включая пропущенные) уже разобрано.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Есть ли неразобранные байты.
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Сколько байт можно принять, не превышая размер буфера.
    pub fn room(&self) -> usize {
        self.options.buffer_size.saturating_sub(self.buf.len()).max(1)
    }

    /// Добавляет очередной кусок данных.
    pub fn push(
        &mut self,
        data: &[u8],
    ) {
        self.buf.extend_from_slice(data);
    }

    /// Следующая полная запись из буфера, если она уже пришла целиком.
    pub fn next_record(&mut self) -> Option<KeyValue> {
        loop {
            match memchr3(b'\n', b'\0', b'\r', &self.buf) {
                Some(pos) => {
                    let line = self.buf.split_to(pos);
                    self.buf.advance(1);
                    if std::mem::take(&mut self.discarding) {
                        continue;
                    }
                    if let Some(kv) = self.parse_line(&line) {
                        return Some(kv);
                    }
                }
                None => {
                    if self.buf.len() >= self.options.buffer_size {
                        self.overflow();
                    }
                    return None;
                }
            }
        }
    }

    /// Разбирает остаток без завершающего символа (конец файла или
    /// закрытие сокета).
    pub fn finish(&mut self) -> Option<KeyValue> {
        if let Some(kv) = self.next_record() {
            return Some(kv);
        }
        let line = self.buf.split();
        if std::mem::take(&mut self.discarding) || line.is_empty() {
            return None;
        }
        self.parse_line(&line)
    }

    fn overflow(&mut self) {
        let line = self.buf.split();
        if !self.discarding {
            warn!(
                line = self.lines + 1,
                size = line.len(),
                limit = self.options.buffer_size,
                "Sidecar line exceeds buffer, dropping it"
            );
            self.discarding = true;
        }
    }

    fn parse_line(
        &mut self,
        raw: &[u8],
    ) -> Option<KeyValue> {
        self.lines += 1;
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() || line.starts_with(self.options.comment) {
            return None;
        }

        let (key, value) = line.split_once(self.options.delimiter)?;
        let key = self.bounded(key.trim(), "key");
        let value = self.bounded(value.trim(), "value");
        if key.is_empty() {
            return None;
        }
        Some(KeyValue { key, value })
    }

    /// Обрезает строку до `max_len` байт по границе символа.
    fn bounded(
        &self,
        s: &str,
        what: &str,
    ) -> String {
        let max = self.options.max_len;
        if s.len() <= max {
            return s.to_string();
        }
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        warn!(
            line = self.lines,
            what,
            size = s.len(),
            limit = max,
            "Truncating over-long sidecar field"
        );
        s[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(splitter: &mut RecordSplitter) -> Vec<(String, String)> {
        let mut out = Vec::new();
        while let Some(kv) = splitter.next_record() {
            out.push((kv.key, kv.value));
        }
        if let Some(kv) = splitter.finish() {
            out.push((kv.key, kv.value));
        }
        out
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Тест проверяет, что запись, пришедшая в двух чтениях, собирается в одну.
    #[test]
    fn test_partial_record_across_pushes() {
        let mut s = RecordSplitter::new(SidecarOptions::socket());
        s.push(b"Order");
        assert!(s.next_record().is_none());
        s.push(b"ID:7\0");
        assert_eq!(s.next_record(), Some(KeyValue::new("OrderID", "7")));
        assert!(!s.has_pending());
    }

    #[test]
    fn test_comments_blank_and_malformed_lines() {
        let mut s = RecordSplitter::new(SidecarOptions::default());
        s.push(b"# header\n\nautoupdate:1\nno delimiter here\n  # indented\nselecttimeout : 5 \n");
        assert_eq!(
            drain(&mut s),
            pairs(&[("autoupdate", "1"), ("selecttimeout", "5")])
        );
    }

    /// Тест проверяет, что \r\n, \n\0 и \0 дают ровно одну запись каждая.
    #[test]
    fn test_mixed_terminators() {
        let mut s = RecordSplitter::new(SidecarOptions::default());
        s.push(b"a:1\r\nb:2\n\0c:3\0d:4");
        assert_eq!(
            drain(&mut s),
            pairs(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")])
        );
    }

    #[test]
    fn test_value_keeps_later_delimiters() {
        let mut s = RecordSplitter::new(SidecarOptions::default());
        s.push(b"opens:08:30\n");
        assert_eq!(drain(&mut s), pairs(&[("opens", "08:30")]));
    }

    /// Тест проверяет обрезку длинного значения по границе UTF-8 символа.
    #[test]
    fn test_truncation_on_char_boundary() {
        let mut s = RecordSplitter::new(SidecarOptions::default().with_max_len(5));
        s.push("greeting:привет\n".as_bytes());
        let kv = s.next_record().unwrap();
        assert_eq!(kv.key, "greet");
        assert_eq!(kv.value, "пр");
    }

    #[test]
    fn test_overlong_line_is_dropped() {
        let options = SidecarOptions {
            buffer_size: 8,
            ..SidecarOptions::default()
        };
        let mut s = RecordSplitter::new(options);
        s.push(b"key:0123456789");
        assert!(s.next_record().is_none());
        s.push(b"abc\nnext:1\n");
        assert_eq!(drain(&mut s), pairs(&[("next", "1")]));
    }

    #[test]
    fn test_custom_delimiter() {
        let mut s = RecordSplitter::new(SidecarOptions::default().with_delimiter('='));
        s.push(b"lang=ru\nx:y\n");
        assert_eq!(drain(&mut s), pairs(&[("lang", "ru")]));
    }
}

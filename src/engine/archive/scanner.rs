//! Разбор токенов старого текстового формата архива.
//!
//! Токен — последовательность байт без пробелов либо строка в двойных
//! кавычках (`\"` и `\\` внутри экранируются). Незакрытая кавычка
//! заканчивается на конце строки.

use std::{collections::VecDeque, io::BufRead};

use posdata_error::{ArchiveError, PosResult};

use super::{decode::read_failure, value::LONG_STRING_LIMIT};

/// Сканер токенов с очередью просмотра вперёд.
pub struct TokenScanner<R> {
    inner: R,
    lookahead: VecDeque<String>,
    line: u64,
}

impl<R: BufRead> TokenScanner<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            lookahead: VecDeque::new(),
            line: 1,
        }
    }

    /// Номер текущей строки (с единицы), для диагностики.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Следующий токен или `None` в конце потока. Токен длиннее `max_len`
    /// байт — ошибка, он никогда не режется молча. Уже просмотренный
    /// токен при такой ошибке остаётся в очереди.
    pub fn next_token(
        &mut self,
        max_len: usize,
    ) -> PosResult<Option<String>> {
        match self.lookahead.front().map(String::len) {
            Some(len) if len > max_len => Err(self.too_long(len, max_len)),
            Some(_) => Ok(self.lookahead.pop_front()),
            None => self.scan(max_len),
        }
    }

    /// Следующий токен без потребления.
    pub fn peek_token(&mut self) -> PosResult<Option<&str>> {
        if self.lookahead.is_empty() {
            if let Some(token) = self.scan(LONG_STRING_LIMIT)? {
                self.lookahead.push_back(token);
            }
        }
        Ok(self.lookahead.front().map(String::as_str))
    }

    /// Рендерит до `n` ближайших токенов, не потребляя их.
    pub fn dump_upcoming(
        &mut self,
        n: usize,
    ) -> PosResult<String> {
        let mut exhausted = false;
        while self.lookahead.len() < n {
            match self.scan(LONG_STRING_LIMIT)? {
                Some(token) => self.lookahead.push_back(token),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        let mut out = self
            .lookahead
            .iter()
            .take(n)
            .map(|t| format!("{t:?}"))
            .collect::<Vec<_>>()
            .join(" ");
        if exhausted {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str("<eof>");
        }
        Ok(out)
    }

    fn too_long(
        &self,
        size: usize,
        limit: usize,
    ) -> posdata_error::StackError {
        posdata_error::StackError::new(ArchiveError::SizeLimit {
            what: "token".to_string(),
            size: size as u64,
            limit: limit as u64,
            offset: None,
        })
        .context(format!("line {}", self.line))
    }

    fn peek_byte(&mut self) -> PosResult<Option<u8>> {
        let buf = self
            .inner
            .fill_buf()
            .map_err(|e| read_failure(e, "reading token", 1))?;
        Ok(buf.first().copied())
    }

    fn next_byte(&mut self) -> PosResult<Option<u8>> {
        let b = self.peek_byte()?;
        if let Some(b) = b {
            self.inner.consume(1);
            if b == b'\n' {
                self.line += 1;
            }
        }
        Ok(b)
    }

    fn scan(
        &mut self,
        max_len: usize,
    ) -> PosResult<Option<String>> {
        loop {
            match self.peek_byte()? {
                None => return Ok(None),
                Some(b) if b.is_ascii_whitespace() => {
                    self.next_byte()?;
                }
                Some(_) => break,
            }
        }

        let mut token = Vec::new();
        if self.peek_byte()? == Some(b'"') {
            self.next_byte()?;
            loop {
                let b = match self.next_byte()? {
                    None | Some(b'"') | Some(b'\n') => break,
                    Some(b'\\') => match self.peek_byte()? {
                        Some(esc @ (b'"' | b'\\')) => {
                            self.next_byte()?;
                            esc
                        }
                        _ => b'\\',
                    },
                    Some(b) => b,
                };
                token.push(b);
                if token.len() > max_len {
                    return Err(self.too_long(token.len(), max_len));
                }
            }
        } else {
            while let Some(b) = self.peek_byte()? {
                if b.is_ascii_whitespace() {
                    break;
                }
                self.next_byte()?;
                token.push(b);
                if token.len() > max_len {
                    return Err(self.too_long(token.len(), max_len));
                }
            }
        }

        Ok(Some(match String::from_utf8(token) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }))
    }
}

use std::io::{self, BufRead, Read};

/// Обёртка над источником, которая считает прочитанные байты.
///
/// Смещение считается в логическом (распакованном) потоке архива и
/// попадает в ошибки чтения.
pub struct OffsetRead<R> {
    inner: R,
    offset: u64,
}

impl<R> OffsetRead<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Сколько байт потреблено с начала потока.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for OffsetRead<R> {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for OffsetRead<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(
        &mut self,
        amt: usize,
    ) {
        self.inner.consume(amt);
        self.offset += amt as u64;
    }
}

use std::{io::ErrorKind, time::Duration};

use posdata_error::{PosResult, ResultExt, SidecarError};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::timeout,
};
use tracing::{debug, trace, warn};

use crate::sidecar::{KeyValue, RecordSplitter, SidecarOptions};

/// Ключ, которым собеседник завершает сессию.
pub const DONE_KEY: &str = "done";

/// Состояние сокетной сессии.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Соединения нет или сессия завершена.
    Idle,
    /// Соединение принято, записи читаются.
    Reading,
}

/// Что обработчик хочет сделать после записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Получатель записей сессии. Смысл ключей (`EndItem`, `EndOrder`, ...)
/// знает только он.
pub trait RecordHandler: Send {
    fn on_record(
        &mut self,
        record: &KeyValue,
    ) -> PosResult<Flow>;

    /// Вызывается один раз, когда сессия переходит в `Idle`.
    fn on_close(&mut self) {}
}

/// Асинхронное чтение записей из принятого соединения.
///
/// Разбор тот же, что у синхронного [`KeyValueReader`], поэтому запись,
/// пришедшая по частям, собирается целиком.
///
/// [`KeyValueReader`]: crate::sidecar::KeyValueReader
pub struct SidecarSession<S> {
    stream: S,
    splitter: RecordSplitter,
    chunk: Vec<u8>,
    state: SessionState,
    peer_closed: bool,
    idle_timeout: Option<Duration>,
    records: u64,
}

impl<S: AsyncRead + Unpin> SidecarSession<S> {
    /// Сессия создаётся для уже принятого соединения и сразу находится в
    /// состоянии `Reading`.
    pub fn new(
        stream: S,
        options: SidecarOptions,
    ) -> PosResult<Self> {
        options.validate()?;
        Ok(Self {
            stream,
            chunk: vec![0u8; options.buffer_size],
            splitter: RecordSplitter::new(options),
            state: SessionState::Reading,
            peer_closed: false,
            idle_timeout: None,
            records: 0,
        })
    }

    pub fn with_idle_timeout(
        mut self,
        idle_timeout: Option<Duration>,
    ) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn records_read(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Следующая запись. `None` означает переход в `Idle`: собеседник
    /// закрыл соединение, прислал `done` или молчал дольше таймаута.
    pub async fn next_record(&mut self) -> PosResult<Option<KeyValue>> {
        if self.state == SessionState::Idle {
            return Ok(None);
        }
        loop {
            let next = match self.splitter.next_record() {
                Some(kv) => Some(kv),
                None if self.peer_closed => self.splitter.finish(),
                None => {
                    self.fill().await?;
                    continue;
                }
            };

            let Some(kv) = next else {
                self.state = SessionState::Idle;
                debug!(records = self.records, "Sidecar peer closed the session");
                return Ok(None);
            };
            if kv.is(DONE_KEY) {
                self.state = SessionState::Idle;
                debug!(records = self.records, "Sidecar session finished by peer");
                return Ok(None);
            }
            self.records += 1;
            trace!(key = %kv.key, value = %kv.value, "Sidecar record");
            return Ok(Some(kv));
        }
    }

    /// Передаёт записи обработчику, пока сессия не станет `Idle`.
    /// Возвращает число обработанных записей.
    pub async fn run<H: RecordHandler + ?Sized>(
        &mut self,
        handler: &mut H,
    ) -> PosResult<u64> {
        let mut handled = 0;
        let result = loop {
            let record = match self.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => break Ok(handled),
                Err(e) => break Err(e),
            };
            handled += 1;
            match handler.on_record(&record) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done) => {
                    self.state = SessionState::Idle;
                    break Ok(handled);
                }
                Err(e) => break Err(e.context(format!("handling key {:?}", record.key))),
            }
        };
        self.state = SessionState::Idle;
        handler.on_close();
        result
    }

    async fn fill(&mut self) -> PosResult<()> {
        let want = self.splitter.room().min(self.chunk.len());
        loop {
            let read = self.stream.read(&mut self.chunk[..want]);
            let result = match self.idle_timeout {
                Some(limit) => match timeout(limit, read).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(timeout = ?limit, "Sidecar session idle timeout");
                        self.peer_closed = true;
                        return Ok(());
                    }
                },
                None => read.await,
            };

            match result {
                Ok(0) => {
                    self.peer_closed = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.splitter.push(&self.chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset
                            | ErrorKind::ConnectionAborted
                            | ErrorKind::BrokenPipe
                    ) =>
                {
                    debug!(error = %e, "Sidecar peer went away");
                    self.peer_closed = true;
                    return Ok(());
                }
                Err(e) => {
                    self.state = SessionState::Idle;
                    return Err(SidecarError::Connection(e.to_string()))
                        .context("reading sidecar socket");
                }
            }
        }
    }
}

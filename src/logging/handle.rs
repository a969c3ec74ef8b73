use std::time::{Duration, Instant};

use tracing_appender::non_blocking::WorkerGuard;

/// Держит guard файлового приёмника. Пока handle жив, неблокирующий
/// писатель сбрасывает очередь в файл.
#[derive(Debug)]
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    flush_timeout: Duration,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Сбрасывает очередь файлового приёмника. Повторный вызов ничего не
    /// делает.
    pub fn shutdown(&mut self) {
        let Some(guard) = self.file_guard.take() else {
            return;
        };
        tracing::debug!("Flushing file log sink");
        let start = Instant::now();
        drop(guard);
        let elapsed = start.elapsed();
        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

use std::{net::SocketAddr, sync::Arc, time::Duration};

use posdata_error::{PosResult, ResultExt, SidecarError};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::{Notify, Semaphore},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use super::session::{RecordHandler, SidecarSession};
use crate::sidecar::SidecarOptions;

/// Параметры приёма сокетных сессий.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Максимальное кол-во одновременных сессий.
    pub max_connections: usize,
    /// Сколько ждать следующей записи, прежде чем закрыть сессию.
    pub idle_timeout: Option<Duration>,
    pub options: SidecarOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 64,
            idle_timeout: Some(Duration::from_secs(300)),
            options: SidecarOptions::socket(),
        }
    }
}

/// Принимает соединения, пока не придёт сигнал `shutdown`. Каждое
/// соединение обслуживается своей задачей со своим обработчиком из
/// `factory`. После сигнала незавершённые сессии прерываются.
pub async fn serve_sidecar<F, H>(
    listener: TcpListener,
    config: ServerConfig,
    factory: F,
    shutdown: Arc<Notify>,
) -> PosResult<()>
where
    F: Fn(SocketAddr) -> H + Send,
    H: RecordHandler + 'static,
{
    config.options.validate()?;
    let limit = Arc::new(Semaphore::new(config.max_connections));
    let mut sessions = JoinSet::new();
    let local = listener
        .local_addr()
        .map_err(|e| SidecarError::Connection(e.to_string()))?;
    info!(addr = %local, max = config.max_connections, "Listening for sidecar sessions");

    let stop = shutdown.notified();
    tokio::pin!(stop);

    loop {
        select! {
            _ = &mut stop => {
                info!(active = sessions.len(), "Sidecar listener shutting down");
                break;
            }

            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    error!(error = %e, "Sidecar session task failed");
                }
            }

            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept sidecar connection");
                        continue;
                    }
                };

                let Ok(permit) = limit.clone().try_acquire_owned() else {
                    warn!(%addr, "Sidecar connection limit reached, rejecting");
                    continue;
                };

                let handler = factory(addr);
                let config = config.clone();
                sessions.spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_connection(socket, addr, &config, handler).await {
                        error!(%addr, error = %e, code = %e.status_code(), "Sidecar session failed");
                    }
                });
            }
        }
    }

    sessions.shutdown().await;
    Ok(())
}

async fn handle_connection<H: RecordHandler>(
    socket: TcpStream,
    addr: SocketAddr,
    config: &ServerConfig,
    mut handler: H,
) -> PosResult<()> {
    debug!(%addr, "Sidecar session started");
    let mut session = SidecarSession::new(socket, config.options)
        .with_context(|| format!("session from {addr}"))?
        .with_idle_timeout(config.idle_timeout);
    let handled = session.run(&mut handler).await?;
    debug!(%addr, records = handled, "Sidecar session closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::{io::AsyncWriteExt, net::TcpStream};

    use super::*;
    use crate::{network::session::Flow, sidecar::KeyValue};

    struct Shared(Arc<Mutex<Vec<KeyValue>>>, Arc<Notify>);

    impl RecordHandler for Shared {
        fn on_record(
            &mut self,
            record: &KeyValue,
        ) -> PosResult<Flow> {
            self.0.lock().unwrap().push(record.clone());
            Ok(Flow::Continue)
        }

        fn on_close(&mut self) {
            self.1.notify_one();
        }
    }

    /// Тест проверяет полный путь: TCP-клиент пишет записи кусками,
    /// обработчик получает их по одной.
    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Notify::new());
        let shutdown = Arc::new(Notify::new());

        let server = {
            let seen = seen.clone();
            let closed = closed.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(serve_sidecar(
                listener,
                ServerConfig::default(),
                move |_| Shared(seen.clone(), closed.clone()),
                shutdown,
            ))
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"Order").await.unwrap();
        client.flush().await.unwrap();
        client.write_all(b"ID:7\0Item:Tea\0done:\0").await.unwrap();

        closed.notified().await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![KeyValue::new("OrderID", "7"), KeyValue::new("Item", "Tea")]
        );

        shutdown.notify_one();
        server.await.unwrap().unwrap();
    }
}

use std::sync::Arc;

use anyhow::Context;
use posdata::{
    config::Settings,
    init_logging,
    network::{serve_sidecar, OrderCollector},
};
use tokio::{net::TcpListener, sync::mpsc};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load(None).context("loading settings")?;
    let mut logging = init_logging(settings.logging.clone()).context("initialising logging")?;

    let listener = TcpListener::bind(&settings.listen.address)
        .await
        .with_context(|| format!("binding {}", settings.listen.address))?;

    let (orders_tx, mut orders_rx) = mpsc::unbounded_channel();
    let shutdown = Arc::new(tokio::sync::Notify::new());

    let server = tokio::spawn(serve_sidecar(
        listener,
        settings.server_config(),
        move |_| OrderCollector::new(orders_tx.clone()),
        shutdown.clone(),
    ));

    let printer = tokio::spawn(async move {
        while let Some(order) = orders_rx.recv().await {
            info!(id = %order.id, total = %order.total(), "Order ready");
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutdown requested");
    shutdown.notify_one();

    server.await.context("listener task")??;
    printer.abort();
    logging.shutdown();
    Ok(())
}

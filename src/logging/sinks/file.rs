use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, RollingFileAppender},
};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::{LoggingConfig, Rotation},
    formatter,
};

fn appender(config: &LoggingConfig) -> RollingFileAppender {
    let dir = &config.log_dir;
    let name = &config.file.filename;
    match config.file.rotation {
        Rotation::Hourly => rolling::hourly(dir, name),
        Rotation::Daily => rolling::daily(dir, name),
        Rotation::Never => rolling::never(dir, name),
    }
}

/// Файловый слой с неблокирующей записью. Guard нужно держать живым до
/// завершения программы, иначе хвост логов потеряется.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let (writer, guard) = tracing_appender::non_blocking(appender(config));
    let layer = formatter::build_formatter(&config.console, config.file.format, false, writer);
    (layer, guard)
}

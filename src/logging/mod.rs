//! Логирование через `tracing`: консоль и (по желанию) файл с ротацией.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig, Rotation};
pub use handle::LoggingHandle;
use posdata_error::{ConfigError, PosResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Устанавливает глобальный subscriber. Возвращённый handle нужно держать
/// до конца работы программы.
pub fn init_logging(mut config: LoggingConfig) -> PosResult<LoggingHandle> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }

    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config);
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers.with_filter(env_filter))
        .try_init()
        .map_err(|e| ConfigError::Load(format!("logging already initialised: {e}")))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        log_dir = %config.log_dir.display(),
        file = config.file.enabled,
        "Logging initialised"
    );

    Ok(LoggingHandle::new(file_guard))
}

use std::{fmt, path::PathBuf, str::FromStr};

use posdata_error::ConfigError;
use serde::{Deserialize, Serialize};

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(ConfigError::InvalidValue {
                key: "logging.format".into(),
                reason: format!("unknown format {other:?}"),
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
        };
        f.write_str(s)
    }
}

/// Период ротации файла логов.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_line_numbers: bool,
    /// Формат консоли; если не задан, используется общий.
    pub format: Option<LogFormat>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub filename: String,
    pub rotation: Rotation,
    /// Формат файла; по умолчанию JSON.
    pub format: LogFormat,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень для событий этого крейта (`trace` ... `error`).
    pub level: String,
    /// Уровень для всех остальных крейтов.
    pub dependency_level: String,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            with_ansi: true,
            with_target: true,
            with_line_numbers: false,
            format: None,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: "posdata.log".into(),
            rotation: Rotation::Daily,
            format: LogFormat::Json,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            dependency_level: "warn".into(),
            format: LogFormat::Compact,
            log_dir: PathBuf::from("logs"),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl LoggingConfig {
    /// Переменные `POSDATA_LOG_LEVEL`, `POSDATA_LOG_FORMAT`, `POSDATA_LOG_DIR`
    /// и `POSDATA_LOG_FILE` (`1`/`true` включает файл) перекрывают значения
    /// из конфигурации.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("POSDATA_LOG_LEVEL") {
            self.level = level.to_ascii_lowercase();
        }
        if let Ok(format) = std::env::var("POSDATA_LOG_FORMAT") {
            match format.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("Ignoring POSDATA_LOG_FORMAT: {e}"),
            }
        }
        if let Ok(dir) = std::env::var("POSDATA_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Ok(file) = std::env::var("POSDATA_LOG_FILE") {
            self.file.enabled = matches!(file.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, level) in [
            ("logging.level", &self.level),
            ("logging.dependency_level", &self.dependency_level),
        ] {
            if !LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    reason: format!("unknown level {level:?}"),
                });
            }
        }
        if self.file.enabled && self.file.filename.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "logging.file.filename".into(),
                reason: "file name is empty".into(),
            });
        }
        Ok(())
    }

    /// Директива для `EnvFilter`, например `warn,posdata=info`.
    pub fn build_filter_directive(&self) -> String {
        format!(
            "{},posdata={},posdata_error={}",
            self.dependency_level, self.level, self.level
        )
    }

    pub fn console_format(&self) -> LogFormat {
        self.console.format.unwrap_or(self.format)
    }

    pub fn ensure_log_dir(&self) -> Result<(), ConfigError> {
        if !self.file.enabled {
            return Ok(());
        }
        std::fs::create_dir_all(&self.log_dir).map_err(|e| ConfigError::InvalidValue {
            key: "logging.log_dir".into(),
            reason: format!("{}: {e}", self.log_dir.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_default_directive() {
        let cfg = LoggingConfig::default();
        assert_eq!(
            cfg.build_filter_directive(),
            "warn,posdata=info,posdata_error=info"
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_level() {
        let cfg = LoggingConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    /// Тест проверяет, что переменные окружения перекрывают конфигурацию.
    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("POSDATA_LOG_LEVEL", "DEBUG");
        std::env::set_var("POSDATA_LOG_FORMAT", "json");
        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides();
        std::env::remove_var("POSDATA_LOG_LEVEL");
        std::env::remove_var("POSDATA_LOG_FORMAT");

        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.console_format(), LogFormat::Json);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}

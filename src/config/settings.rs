use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File};
use posdata_error::{ConfigError, PosResult, ResultExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    engine::archive::{
        compression::DEFAULT_COMPRESSION_LEVEL, StringClass, WriterOptions, LONG_STRING_LIMIT,
        SHORT_STRING_LIMIT,
    },
    logging::LoggingConfig,
    network::ServerConfig,
    sidecar::{
        KeyValue, KeyValueReader, SidecarOptions, Terminator, DEFAULT_BUFFER_SIZE,
        DEFAULT_COMMENT, DEFAULT_DELIMITER, DEFAULT_MAX_LEN,
    },
};

/// Переменная окружения с путём к файлу настроек.
pub const CONFIG_PATH_ENV: &str = "POSDATA_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Сжимать ли новые архивы.
    pub compress: bool,
    pub compression_level: i32,
    /// Лимит строк по умолчанию для писателей.
    pub string_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarSettings {
    pub delimiter: char,
    pub comment: char,
    pub max_len: usize,
    pub buffer_size: usize,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenSettings {
    pub address: String,
    pub max_connections: usize,
    /// 0 отключает таймаут.
    pub idle_timeout_secs: u64,
}

/// Настройки приложения: значения по умолчанию, затем файл, затем
/// переменные окружения `POSDATA__<секция>__<ключ>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub archive: ArchiveSettings,
    pub sidecar: SidecarSettings,
    pub listen: ListenSettings,
    pub logging: LoggingConfig,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            compress: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            string_limit: SHORT_STRING_LIMIT,
        }
    }
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            comment: DEFAULT_COMMENT,
            max_len: DEFAULT_MAX_LEN,
            buffer_size: DEFAULT_BUFFER_SIZE,
            terminator: Terminator::Newline,
        }
    }
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7070".into(),
            max_connections: 64,
            idle_timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Загружает настройки. Файл берётся из `path`, а если он не задан, из
    /// `POSDATA_CONFIG`; отсутствие файла не ошибка.
    pub fn load(path: Option<&Path>) -> PosResult<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let defaults =
            Config::try_from(&Settings::default()).map_err(|e| ConfigError::Load(e.to_string()))?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = &path {
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("POSDATA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> PosResult<()> {
        self.sidecar_options()
            .validate()
            .context("invalid sidecar settings")?;
        if !(1..=22).contains(&self.archive.compression_level) {
            return Err(ConfigError::InvalidValue {
                key: "archive.compression_level".into(),
                reason: format!("{} is outside 1..=22", self.archive.compression_level),
            }
            .into());
        }
        if self.archive.string_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "archive.string_limit".into(),
                reason: "must be positive".into(),
            }
            .into());
        }
        self.logging.validate()?;
        Ok(())
    }

    pub fn string_class(&self) -> StringClass {
        match self.archive.string_limit {
            SHORT_STRING_LIMIT => StringClass::Short,
            LONG_STRING_LIMIT => StringClass::Long,
            n => StringClass::Limit(n),
        }
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            compress: self.archive.compress,
            level: self.archive.compression_level,
            string_class: self.string_class(),
        }
    }

    pub fn sidecar_options(&self) -> SidecarOptions {
        SidecarOptions {
            delimiter: self.sidecar.delimiter,
            comment: self.sidecar.comment,
            max_len: self.sidecar.max_len,
            buffer_size: self.sidecar.buffer_size,
            terminator: self.sidecar.terminator,
        }
    }

    /// Параметры для сокетов: те же, но записи заканчиваются `\0`.
    pub fn socket_options(&self) -> SidecarOptions {
        SidecarOptions {
            terminator: Terminator::Nul,
            ..self.sidecar_options()
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_connections: self.listen.max_connections,
            idle_timeout: match self.listen.idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            options: self.socket_options(),
        }
    }

    /// Накладывает значения из файла «ключ/значение». Неизвестные ключи
    /// пропускаются. Возвращает число применённых ключей.
    pub fn apply_sidecar(
        &mut self,
        path: &Path,
    ) -> PosResult<usize> {
        let reader = KeyValueReader::open(path, self.sidecar_options())?;
        let mut applied = 0;
        for record in reader {
            let record = record?;
            if self.apply_key(&record)? {
                applied += 1;
            } else {
                debug!(key = %record.key, path = %path.display(), "Ignoring unknown settings key");
            }
        }
        self.validate()?;
        Ok(applied)
    }

    fn apply_key(
        &mut self,
        kv: &KeyValue,
    ) -> PosResult<bool> {
        match kv.key.to_ascii_lowercase().as_str() {
            "compress" => self.archive.compress = parse_flag(kv)?,
            "compression_level" => self.archive.compression_level = parse(kv)?,
            "string_limit" => self.archive.string_limit = parse(kv)?,
            "max_len" => self.sidecar.max_len = parse(kv)?,
            "buffer_size" => self.sidecar.buffer_size = parse(kv)?,
            "listen" | "address" => self.listen.address = kv.value.clone(),
            "max_connections" => self.listen.max_connections = parse(kv)?,
            "idle_timeout" => self.listen.idle_timeout_secs = parse(kv)?,
            "log_level" => self.logging.level = kv.value.to_ascii_lowercase(),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse<T: std::str::FromStr>(kv: &KeyValue) -> PosResult<T> {
    kv.parse().ok_or_else(|| {
        ConfigError::InvalidValue {
            key: kv.key.clone(),
            reason: format!("cannot parse {:?}", kv.value),
        }
        .into()
    })
}

fn parse_flag(kv: &KeyValue) -> PosResult<bool> {
    match kv.value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => parse(kv),
    }
}

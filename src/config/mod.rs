//! Загрузка настроек приложения.

pub mod settings;

pub use settings::{ArchiveSettings, ListenSettings, Settings, SidecarSettings, CONFIG_PATH_ENV};

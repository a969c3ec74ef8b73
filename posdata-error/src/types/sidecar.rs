use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки протокола ключ/значение (файл-компаньон или сокет).
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("Cannot open sidecar '{path}': {reason}")]
    Open { path: String, reason: String },

    #[error("Sidecar source is closed")]
    Closed,

    #[error("Key '{key}' contains the delimiter '{delimiter}'")]
    DelimiterInKey { key: String, delimiter: char },

    #[error("Key '{key}' cannot be read back: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Value for key '{key}' cannot be read back: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid sidecar option: {0}")]
    InvalidOption(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Sidecar handler failed on key '{key}': {reason}")]
    Handler { key: String, reason: String },
}

impl ErrorExt for SidecarError {
    fn status_code(&self) -> StatusCode {
        match self {
            SidecarError::Open { .. } => StatusCode::NotFound,
            SidecarError::Closed => StatusCode::ConnectionClosed,
            SidecarError::DelimiterInKey { .. } => StatusCode::InvalidKey,
            SidecarError::InvalidKey { .. } => StatusCode::InvalidKey,
            SidecarError::InvalidValue { .. } => StatusCode::InvalidValue,
            SidecarError::InvalidOption(_) => StatusCode::InvalidArgs,
            SidecarError::Connection(_) => StatusCode::ConnectionFailed,
            SidecarError::Handler { .. } => StatusCode::ProtocolError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Application settings (defaults, settings file, environment).
pub mod config;
/// Record archives: value codec, token scanner, compression, reader/writer.
pub mod engine;
/// Logging setup (console and rolling file sinks).
pub mod logging;
/// Socket sessions for the key/value protocol.
pub mod network;
/// Line-oriented key/value protocol over files, descriptors and sockets.
pub mod sidecar;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use config::Settings;
pub use engine::{
    FieldKind, FieldType, FieldValue, Framing, Money, Percent, Persist, RecordReader,
    RecordWriter, StringClass, TimeStamp, WriterOptions,
};
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
pub use network::{serve_sidecar, RecordHandler, ServerConfig, SidecarSession};
pub use posdata_error::{ArchiveError, PosResult, SidecarError, StackError, StatusCode};
pub use sidecar::{KeyValue, KeyValueReader, KeyValueWriter, SidecarOptions, Terminator};

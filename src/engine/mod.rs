//! Движок хранения: архивы записей и соглашение о резервных копиях.

pub mod archive;
pub mod backup;

pub use archive::{
    FieldKind, FieldType, FieldValue, Framing, Money, Percent, Persist, RecordReader,
    RecordWriter, StringClass, TimeStamp, WriterOptions,
};
pub use backup::{backup_file, backup_path, load_with_restore, restore_backup, save_with_backup};

pub mod attachments;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod directory;
pub mod document;
pub mod error;
pub mod exporter;
pub mod extract;
pub mod models;
pub mod source;
pub mod translate;

pub use config::{ExportConfig, SortOrder};
pub use error::{CoreError, TranslationError};
pub use exporter::{export_from_signal_db, ExportOutcome, ExportStats, RecordFailure};

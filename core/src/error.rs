use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid passphrase: {0}")]
    InvalidPassphrase(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("signal DB missing table: {0}")]
    MissingTable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(String),
}

/// Failure to translate a single message row. Never fatal for the run.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("message {message_id}: no contact or group for receiver {receiver:?} and no sender fallback")]
    UnresolvedAddress {
        message_id: i64,
        receiver: Option<i64>,
    },
    #[error("message {message_id}: attachment payload Attachment_{row_id}_{unique_id}.bin not found")]
    AttachmentNotFound {
        message_id: i64,
        row_id: i64,
        unique_id: i64,
    },
    #[error("message {message_id}: attachment read failed for {}: {source}", path.display())]
    AttachmentRead {
        message_id: i64,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TranslationError {
    pub fn message_id(&self) -> i64 {
        match self {
            TranslationError::UnresolvedAddress { message_id, .. }
            | TranslationError::AttachmentNotFound { message_id, .. }
            | TranslationError::AttachmentRead { message_id, .. } => *message_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TranslationError::UnresolvedAddress { .. } => "unresolved_address",
            TranslationError::AttachmentNotFound { .. } => "attachment_not_found",
            TranslationError::AttachmentRead { .. } => "attachment_read",
        }
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TranslationError;

/// Locates extracted attachment payloads by `(row id, unique id)`.
pub trait AttachmentStore {
    fn locate(&self, message_id: i64, row_id: i64, unique_id: i64) -> Result<PathBuf, TranslationError>;

    fn load(&self, message_id: i64, row_id: i64, unique_id: i64) -> Result<Vec<u8>, TranslationError> {
        let path = self.locate(message_id, row_id, unique_id)?;
        fs::read(&path).map_err(|source| TranslationError::AttachmentRead {
            message_id,
            path,
            source,
        })
    }
}

/// Directory of `Attachment_<row>_<unique>.bin` files written by the extractor.
#[derive(Debug, Clone)]
pub struct FrameDirStore {
    dir: PathBuf,
}

impl FrameDirStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        FrameDirStore {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl AttachmentStore for FrameDirStore {
    fn locate(&self, message_id: i64, row_id: i64, unique_id: i64) -> Result<PathBuf, TranslationError> {
        let path = self.dir.join(attachment_file_name(row_id, unique_id));
        if path.is_file() {
            Ok(path)
        } else {
            Err(TranslationError::AttachmentNotFound {
                message_id,
                row_id,
                unique_id,
            })
        }
    }
}

pub fn attachment_file_name(row_id: i64, unique_id: i64) -> String {
    format!("Attachment_{}_{}.bin", row_id, unique_id)
}

/// Extractor file names use -1 when a part has no unique id.
pub fn normalize_unique_id(unique_id: Option<i64>) -> i64 {
    match unique_id {
        Some(0) | None => -1,
        Some(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn locate_and_load_existing_payload() {
        let dir = tempdir().expect("temp");
        fs::write(dir.path().join("Attachment_5_1.bin"), b"test").expect("write");
        let store = FrameDirStore::new(dir.path());
        assert_eq!(store.load(1, 5, 1).expect("load"), b"test");
    }

    #[test]
    fn missing_payload_is_not_found() {
        let dir = tempdir().expect("temp");
        let store = FrameDirStore::new(dir.path());
        let err = store.locate(3, 5, 1).unwrap_err();
        assert!(matches!(
            err,
            TranslationError::AttachmentNotFound { message_id: 3, row_id: 5, unique_id: 1 }
        ));
    }

    #[test]
    fn unique_id_defaults_match_extractor_naming() {
        assert_eq!(normalize_unique_id(None), -1);
        assert_eq!(normalize_unique_id(Some(0)), -1);
        assert_eq!(normalize_unique_id(Some(1234)), 1234);
        assert_eq!(attachment_file_name(5, -1), "Attachment_5_-1.bin");
    }
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const DEFAULT_TOOL: &str = "signalbackup-tools";
pub const DEFAULT_OUTPUT: &str = "sms-backup-restore.xml";

/// Order in which records are written, by message timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn sql_keyword(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(CoreError::InvalidArgument(format!("unknown sort order: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Extraction tool binary, resolved through PATH when relative.
    pub tool_path: PathBuf,
    pub output_path: PathBuf,
    pub order: SortOrder,
    /// Keep the extraction directory instead of deleting it after the run.
    pub keep_scratch: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            tool_path: PathBuf::from(DEFAULT_TOOL),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            order: SortOrder::default(),
            keep_scratch: false,
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tool_path.as_os_str().is_empty() {
            return Err(CoreError::InvalidArgument("extraction tool path is empty".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(CoreError::InvalidArgument("output path is empty".to_string()));
        }
        if self.output_path.is_dir() {
            return Err(CoreError::InvalidArgument("output path is a directory".to_string()));
        }
        Ok(())
    }
}

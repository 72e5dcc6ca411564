use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::attachments::{AttachmentStore, FrameDirStore};
use crate::classify::{self, Channel};
use crate::config::{ExportConfig, SortOrder};
use crate::directory::Directories;
use crate::document::DocumentAssembler;
use crate::error::{CoreError, TranslationError};
use crate::extract;
use crate::models::{MessageKind, MessageRow};
use crate::source::SignalSource;
use crate::translate::{RolePolicy, SenderMatchPolicy, Translator};

const PROGRESS_EVERY: usize = 1000;

#[derive(Clone)]
pub struct ExportPlan {
    pub source_path: String,
    pub passphrase: Zeroizing<String>,
    pub source_filename: String,
    pub source_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub message_id: i64,
    pub kind: String,
    pub reason: String,
}

impl From<&TranslationError> for RecordFailure {
    fn from(err: &TranslationError) -> Self {
        RecordFailure {
            message_id: err.message_id(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    pub contacts: usize,
    pub groups: usize,
    pub rows_read: usize,
    pub text_rows: usize,
    pub multimedia_rows: usize,
    pub plain_rows: usize,
    pub secure_rows: usize,
    pub unknown_type_rows: usize,
    pub records_written: usize,
    pub system_events_skipped: usize,
    pub failures: Vec<RecordFailure>,
}

impl ExportStats {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn tally(&mut self, row: &MessageRow) {
        self.rows_read += 1;
        match row.kind {
            MessageKind::Text => self.text_rows += 1,
            MessageKind::Multimedia => self.multimedia_rows += 1,
        }
        match classify::lookup(row.type_code).map(|known| known.channel) {
            Some(Channel::Plain) => self.plain_rows += 1,
            Some(Channel::Secure) => self.secure_rows += 1,
            None => self.unknown_type_rows += 1,
        }
    }
}

pub struct ExportOutcome {
    pub document: DocumentAssembler,
    pub stats: ExportStats,
}

pub fn normalize_passphrase(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidPassphrase("passphrase is empty".to_string()));
    }
    let normalized: String = trimmed.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    if normalized.len() != 30 {
        return Err(CoreError::InvalidPassphrase(
            "passphrase must be 30 digits".to_string(),
        ));
    }
    if !normalized.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::InvalidPassphrase(
            "passphrase must contain only digits".to_string(),
        ));
    }
    Ok(normalized)
}

pub fn plan_export(source_path: &Path, passphrase: &str) -> Result<ExportPlan, CoreError> {
    plan_export_with_progress(source_path, passphrase, |_| {})
}

pub fn plan_export_with_progress<F>(
    source_path: &Path,
    passphrase: &str,
    progress: F,
) -> Result<ExportPlan, CoreError>
where
    F: Fn(&str),
{
    let normalized = Zeroizing::new(normalize_passphrase(passphrase)?);
    if !source_path.exists() {
        return Err(CoreError::InvalidArgument("backup file not found".to_string()));
    }
    if source_path.extension().and_then(|s| s.to_str()) != Some("backup") {
        return Err(CoreError::InvalidArgument("file must have .backup extension".to_string()));
    }
    let metadata = fs::metadata(source_path)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    if metadata.len() == 0 {
        return Err(CoreError::InvalidArgument("backup file is empty".to_string()));
    }
    progress("Preparing export...");
    let source_hash = hash_file_sha256_with_progress(source_path, &progress)?;
    let source_filename = source_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("signal.backup")
        .to_string();
    Ok(ExportPlan {
        source_path: source_path.display().to_string(),
        passphrase: normalized,
        source_filename,
        source_hash,
    })
}

fn hash_file_sha256_with_progress<F>(path: &Path, progress: F) -> Result<String, CoreError>
where
    F: Fn(&str),
{
    let mut file = fs::File::open(path)
        .map_err(|e| CoreError::InvalidArgument(format!("backup open failed: {}", e)))?;
    let total = file
        .metadata()
        .map_err(|e| CoreError::InvalidArgument(format!("backup stat failed: {}", e)))?
        .len()
        .max(1);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut processed: u64 = 0;
    let mut last_percent: u64 = 0;
    loop {
        let n = std::io::Read::read(&mut file, &mut buf)
            .map_err(|e| CoreError::InvalidArgument(format!("backup read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        processed = processed.saturating_add(n as u64);
        let percent = (processed * 100) / total;
        if percent > last_percent {
            last_percent = percent;
            if percent <= 100 {
                progress(&format!("Preparing export... {}%", percent));
            }
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn export_backup(plan: &ExportPlan, config: &ExportConfig) -> Result<ExportStats, CoreError> {
    export_backup_with_progress(plan, config, |_| {})
}

/// Extracts the backup into a scratch directory, translates it and writes the
/// document to `config.output_path`. The scratch directory is removed
/// afterwards unless `keep_scratch` is set.
pub fn export_backup_with_progress<F>(
    plan: &ExportPlan,
    config: &ExportConfig,
    progress: F,
) -> Result<ExportStats, CoreError>
where
    F: Fn(&str),
{
    config.validate()?;
    progress("Extracting backup...");
    let scratch = tempfile::tempdir()?;
    let result = extract::extract_backup(
        &config.tool_path,
        Path::new(&plan.source_path),
        &plan.passphrase,
        scratch.path(),
    )
    .and_then(|extracted| export_extracted(&extracted.db_path, &extracted.frames_dir, config, &progress));

    if config.keep_scratch {
        let kept = scratch.keep();
        progress(&format!("Scratch directory kept at {}", kept.display()));
    }

    let mut stats = result?;
    stats.source_hash = Some(plan.source_hash.clone());
    Ok(stats)
}

/// Translates an already extracted database and attachment directory.
pub fn export_extracted<F>(
    db_path: &Path,
    frames_dir: &Path,
    config: &ExportConfig,
    progress: &F,
) -> Result<ExportStats, CoreError>
where
    F: Fn(&str),
{
    config.validate()?;
    progress("Opening decrypted database...");
    let signal = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let store = FrameDirStore::new(frames_dir);
    let outcome = export_from_signal_db(&signal, &store, SenderMatchPolicy, config.order, progress)?;

    progress("Writing document...");
    write_document(&outcome.document, &config.output_path)?;
    let size = fs::metadata(&config.output_path).map(|m| m.len()).unwrap_or(0);
    progress(&format!(
        "Wrote {} records ({}) to {}",
        outcome.document.len(),
        format_bytes(size),
        config.output_path.display()
    ));
    Ok(outcome.stats)
}

/// Single pass over every message row. Per-row translation failures are
/// recorded in the stats and never stop the run; store errors do.
pub fn export_from_signal_db<S, P, F>(
    signal: &Connection,
    store: &S,
    policy: P,
    order: SortOrder,
    progress: &F,
) -> Result<ExportOutcome, CoreError>
where
    S: AttachmentStore + ?Sized,
    P: RolePolicy,
    F: Fn(&str),
{
    let source = SignalSource::open(signal, order)?;

    progress("Reading recipients...");
    let recipients = source.recipients()?;
    let groups = source.groups()?;
    let directories = Directories::build(&recipients, &groups);
    let mut stats = ExportStats {
        contacts: directories.contacts.len(),
        groups: directories.groups.len(),
        ..ExportStats::default()
    };
    info!(contacts = stats.contacts, groups = stats.groups, "directories built");

    let messages = source.messages()?;
    let total = messages.len();
    progress(&format!("Translating {} messages...", total));

    let translator = Translator::new(&directories, store, policy);
    let mut document = DocumentAssembler::new();
    for raw in messages {
        let row = MessageRow::from(raw);
        stats.tally(&row);
        let parts = match row.kind {
            MessageKind::Multimedia => source.parts_for(row.id)?,
            MessageKind::Text => Vec::new(),
        };
        debug!(message_id = row.id, kind = ?row.kind, parts = parts.len(), "translating message");
        match translator.translate(&row, &parts) {
            Ok(Some(record)) => {
                document.append(record);
                stats.records_written += 1;
            }
            Ok(None) => stats.system_events_skipped += 1,
            Err(err) => {
                warn!(message_id = row.id, error = %err, "skipping message");
                stats.failures.push(RecordFailure::from(&err));
            }
        }
        if stats.rows_read % PROGRESS_EVERY == 0 {
            progress(&format!("Translating messages... {}/{}", stats.rows_read, total));
        }
    }

    if let Some(summary) = failure_summary(&stats, total) {
        warn!(failed = stats.failed(), written = stats.records_written, "{}", summary);
    }
    info!(
        written = stats.records_written,
        skipped = stats.system_events_skipped,
        "translation finished"
    );
    Ok(ExportOutcome { document, stats })
}

/// Text of the run's single aggregate warning, if any row failed.
fn failure_summary(stats: &ExportStats, total: usize) -> Option<String> {
    if stats.failed() == 0 {
        return None;
    }
    Some(format!(
        "{} of {} messages could not be exported; the document contains everything else",
        stats.failed(),
        total
    ))
}

fn write_document(document: &DocumentAssembler, path: &Path) -> Result<(), CoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent)?;
    {
        let mut out = BufWriter::new(&mut temp);
        document.write_to(&mut out)?;
        out.flush()?;
    }
    temp.persist(path)
        .map_err(|e| CoreError::InvalidArgument(format!("document persist failed: {}", e)))?;
    Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

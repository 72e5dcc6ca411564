use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::exporter::RecordFailure;

const MAX_LOG_BYTES: u64 = 1_500_000;
const LOG_FILE: &str = "diagnostics.log";
// shortest digit run treated as a phone number or passphrase fragment
const MIN_REDACTED_DIGITS: usize = 7;

#[derive(Debug, Serialize)]
pub struct LogEvent {
    pub ts: String,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
}

/// Strips filesystem paths and phone-number-like digit runs.
pub fn sanitize(input: &str) -> String {
    let mut out = input.to_string();
    for prefix in ["/Users/", "/home/", "/var/", "/private/", "/tmp/", "C:\\", "D:\\"] {
        if let Some(idx) = out.find(prefix) {
            out.replace_range(idx.., "[redacted]");
            break;
        }
    }
    out.split_whitespace()
        .map(|token| {
            let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
            if digits >= MIN_REDACTED_DIGITS {
                "[redacted]".to_string()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn log_event(log_dir: &Path, kind: &str, message: &str) -> io::Result<()> {
    write_event(
        log_dir,
        LogEvent {
            ts: Utc::now().to_rfc3339(),
            kind: kind.to_string(),
            message: sanitize(message),
            message_id: None,
        },
    )
}

pub fn log_record_failure(log_dir: &Path, failure: &RecordFailure) -> io::Result<()> {
    write_event(
        log_dir,
        LogEvent {
            ts: Utc::now().to_rfc3339(),
            kind: format!("record_error:{}", failure.kind),
            message: sanitize(&failure.reason),
            message_id: Some(failure.message_id),
        },
    )
}

fn write_event(log_dir: &Path, event: LogEvent) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(LOG_FILE);
    trim_log(&path)?;
    let line = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

fn trim_log(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let meta = fs::metadata(path)?;
    if meta.len() <= MAX_LOG_BYTES {
        return Ok(());
    }
    let data = fs::read(path)?;
    let mut keep_from = data.len().saturating_sub((MAX_LOG_BYTES / 2) as usize);
    // resume at a line boundary
    if let Some(offset) = data[keep_from..].iter().position(|b| *b == b'\n') {
        keep_from += offset + 1;
    }
    fs::write(path, &data[keep_from..])?;
    Ok(())
}

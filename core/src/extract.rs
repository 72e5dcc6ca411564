use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;
use zeroize::Zeroizing;

use crate::error::CoreError;

const DATABASE_FILE: &str = "database.sqlite";
const STDERR_TAIL_BYTES: usize = 2048;

pub struct ExtractOutput {
    pub db_path: PathBuf,
    pub frames_dir: PathBuf,
}

/// Runs the external extraction tool, which decrypts `backup_path` into
/// `out_dir/database.sqlite` plus one `Attachment_*.bin` file per payload.
pub fn extract_backup(
    tool: &Path,
    backup_path: &Path,
    passphrase: &str,
    out_dir: &Path,
) -> Result<ExtractOutput, CoreError> {
    let passphrase = Zeroizing::new(passphrase.to_string());
    info!(tool = %tool.display(), "running extraction tool");
    let output = Command::new(tool)
        .arg("--input")
        .arg(backup_path)
        .arg("--output")
        .arg(out_dir)
        .arg("--password")
        .arg(passphrase.as_str())
        .arg("--no-showprogress")
        .output()
        .map_err(|e| CoreError::Extraction(format!("could not run {}: {}", tool.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = stderr_tail(&stderr);
        let msg = match output.status.code() {
            Some(code) if tail.is_empty() => format!("extraction tool exited with code {}", code),
            Some(code) => format!("extraction tool exited with code {}: {}", code, tail),
            None => format!("extraction tool terminated by signal: {}", tail),
        };
        return Err(CoreError::Extraction(msg));
    }

    let db_path = out_dir.join(DATABASE_FILE);
    if !db_path.is_file() {
        return Err(CoreError::Extraction(format!(
            "extraction produced no {}",
            DATABASE_FILE
        )));
    }
    Ok(ExtractOutput {
        db_path,
        frames_dir: out_dir.to_path_buf(),
    })
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_tool_is_extraction_error() {
        let dir = tempdir().expect("temp");
        let err = extract_backup(
            &dir.path().join("no-such-tool"),
            &dir.path().join("x.backup"),
            "123",
            dir.path(),
        )
        .err()
        .expect("error");
        assert!(matches!(err, CoreError::Extraction(_)));
    }

    #[test]
    fn stderr_tail_keeps_end() {
        let long = format!("{}END", "x".repeat(STDERR_TAIL_BYTES * 2));
        let tail = stderr_tail(&long);
        assert_eq!(tail.len(), STDERR_TAIL_BYTES);
        assert!(tail.ends_with("END"));
    }
}

//! Audit log
//!
//! Appends one JSON line per caller-facing wallet operation. Entries carry
//! public data only (addresses, hashes, error codes); passphrases and keys
//! never reach this module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::Mutex;

/// Entry in the audit log
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    pub duration_ms: u64,
}

impl AuditEntry {
    pub fn new(operation: &'static str, started: Instant) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            status: "success",
            address: None,
            tx_hash: None,
            error_code: None,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn failed(mut self, error_code: &'static str) -> Self {
        self.status = "error";
        self.error_code = Some(error_code);
        self
    }
}

/// Writer for audit log entries
struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

pub struct AuditLog {
    writer: Mutex<AuditLogWriter>,
}

impl AuditLog {
    /// # Arguments
    /// * `log_path` - Path to the audit log file (JSONL format)
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Mutex::new(AuditLogWriter {
                path: log_path.into(),
            }),
        }
    }

    /// Append an entry; failures are logged and never surfaced
    pub async fn record(&self, entry: AuditEntry) {
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(error = %e, "Failed to write audit log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let temp_file = NamedTempFile::new().unwrap();
        let log = AuditLog::new(temp_file.path());
        let started = Instant::now();

        log.record(
            AuditEntry::new("transfer_native", started)
                .address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
                .tx_hash("0xabc"),
        )
        .await;
        log.record(AuditEntry::new("unlock", started).failed("DECRYPTION_FAILED"))
            .await;

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["operation"], "transfer_native");
        assert_eq!(lines[0]["status"], "success");
        assert_eq!(lines[0]["tx_hash"], "0xabc");
        assert_eq!(lines[1]["status"], "error");
        assert_eq!(lines[1]["error_code"], "DECRYPTION_FAILED");
        assert!(lines[1].get("address").is_none());
    }
}

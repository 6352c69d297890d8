//! Incident records and the JSON incident log.
//!
//! The log is one pretty-printed JSON array. Appending reads the whole file,
//! pushes one record and rewrites the file through a temporary file and a
//! rename. The read-modify-write runs under an exclusive advisory lock on a
//! sidecar `.lock` file, so cooperating writers (threads or processes) do not
//! lose each other's records.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const INCIDENT_LOG_FILE: &str = "incident_log.json";

/// One non-secure analysis outcome. Never mutated once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Local creation time, ISO-8601 with microseconds and no offset.
    pub timestamp: String,
    pub event_type: String,
    pub description: String,
    pub confidence_score: u8,
    /// File name of the evidence image, relative to the evidence directory.
    pub evidence_file: String,
}

impl IncidentRecord {
    pub fn new(
        at: DateTime<Local>,
        event_type: &str,
        description: &str,
        confidence_score: u8,
        evidence_file: &str,
    ) -> Self {
        Self {
            timestamp: format_timestamp(at),
            event_type: event_type.to_string(),
            description: description.to_string(),
            confidence_score: confidence_score.min(100),
            evidence_file: evidence_file.to_string(),
        }
    }
}

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Handle on the incident log file.
#[derive(Clone, Debug)]
pub struct IncidentLog {
    path: PathBuf,
}

impl IncidentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file inside an evidence directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(INCIDENT_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. A missing file is an empty log; so is a corrupt one.
    pub fn load(&self) -> Result<Vec<IncidentRecord>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("read incident log {}", self.path.display())))
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        // Invalid UTF-8 surfaces here as a decode error, like any other corruption.
        match serde_json::from_slice::<Vec<IncidentRecord>>(&raw) {
            Ok(records) => Ok(records),
            Err(err) => {
                log::warn!(
                    "incident log {} is corrupt ({}); starting a new log",
                    self.path.display(),
                    err
                );
                Ok(Vec::new())
            }
        }
    }

    /// Append one record and rewrite the log. Returns the new record count.
    pub fn append(&self, record: &IncidentRecord) -> Result<usize> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("create incident log directory {}", parent.display())
                })?;
            }
        }

        let lock = self.lock()?;
        let mut records = self.load()?;
        records.push(record.clone());
        self.rewrite(&records)?;
        lock.unlock()
            .with_context(|| format!("unlock {}", self.lock_path().display()))?;

        log::info!(
            "incident log saved: {} ({} records)",
            self.path.display(),
            records.len()
        );
        Ok(records.len())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn lock(&self) -> Result<File> {
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("open lock file {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("lock {}", lock_path.display()))?;
        Ok(file)
    }

    fn rewrite(&self, records: &[IncidentRecord]) -> Result<()> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        records
            .serialize(&mut serializer)
            .map_err(|e| anyhow!("serialize incident log: {}", e))?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, &out)
            .with_context(|| format!("write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replace incident log {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(event_type: &str, file: &str) -> IncidentRecord {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 14, 3, 22).unwrap();
        IncidentRecord::new(at, event_type, "Aggressive Stance", 75, file)
    }

    #[test]
    fn timestamp_matches_iso_format() {
        let rec = record("SUSPICIOUS", "evidence2024-05-01_14-03-22.jpg");
        assert_eq!(rec.timestamp, "2024-05-01T14:03:22.000000");
    }

    #[test]
    fn missing_log_is_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = IncidentLog::in_dir(dir.path());
        assert!(log.load()?.is_empty());
        Ok(())
    }

    #[test]
    fn appends_keep_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = IncidentLog::in_dir(dir.path());
        assert_eq!(log.append(&record("SUSPICIOUS", "a.jpg"))?, 1);
        assert_eq!(log.append(&record("PERSON DOWN", "b.jpg"))?, 2);

        let records = log.load()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].evidence_file, "a.jpg");
        assert_eq!(records[1].event_type, "PERSON DOWN");
        Ok(())
    }

    #[test]
    fn log_is_pretty_printed_with_record_fields() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = IncidentLog::in_dir(dir.path());
        log.append(&record("WEAPON DETECTED", "w.jpg"))?;

        let raw = std::fs::read_to_string(log.path())?;
        assert!(raw.starts_with("[\n    {\n        \"timestamp\""));
        for key in [
            "timestamp",
            "event_type",
            "description",
            "confidence_score",
            "evidence_file",
        ] {
            assert!(raw.contains(&format!("\"{}\"", key)), "missing {key}");
        }
        assert!(!dir.path().join("incident_log.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn corrupt_log_is_replaced() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = IncidentLog::in_dir(dir.path());
        std::fs::write(log.path(), "{ not json")?;
        assert!(log.load()?.is_empty());

        log.append(&record("SUSPICIOUS", "c.jpg"))?;
        let records = log.load()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].evidence_file, "c.jpg");
        Ok(())
    }

    #[test]
    fn log_with_invalid_utf8_is_replaced() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = IncidentLog::in_dir(dir.path());
        std::fs::write(log.path(), [0xFF, 0xFE, b'[', 0x80])?;
        assert!(log.load()?.is_empty());

        assert_eq!(log.append(&record("WEAPON DETECTED", "d.jpg"))?, 1);
        let records = log.load()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].evidence_file, "d.jpg");
        Ok(())
    }

    #[test]
    fn whitespace_only_log_is_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = IncidentLog::in_dir(dir.path());
        std::fs::write(log.path(), " \n\t")?;
        assert!(log.load()?.is_empty());
        Ok(())
    }

    #[test]
    fn concurrent_appends_are_not_lost() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log = IncidentLog::in_dir(dir.path());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    log.append(&record("SUSPICIOUS", &format!("{i}.jpg")))
                        .map(|_| ())
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("append thread")?;
        }
        assert_eq!(log.load()?.len(), 8);
        Ok(())
    }
}

//! Evidence recorder: writes the full-size frame and appends the incident.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::classify::ThreatStatus;
use crate::frame::Frame;
use crate::incidents::{IncidentLog, IncidentRecord};

pub const DEFAULT_EVIDENCE_QUALITY: u8 = 95;

/// `evidence<YYYY-MM-DD_HH-MM-SS>.jpg`
pub fn evidence_file_name(at: DateTime<Local>) -> String {
    format!("evidence{}.jpg", at.format("%Y-%m-%d_%H-%M-%S"))
}

pub struct EvidenceRecorder {
    dir: PathBuf,
    log: IncidentLog,
    jpeg_quality: u8,
}

impl EvidenceRecorder {
    pub fn new(dir: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        let dir = dir.into();
        Self {
            log: IncidentLog::in_dir(&dir),
            dir,
            jpeg_quality,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log(&self) -> &IncidentLog {
        &self.log
    }

    /// Persist one incident.
    ///
    /// The image is written first; a record is only appended once its image
    /// exists. Two incidents within the same second share a file name and the
    /// later image replaces the earlier one.
    pub fn record(
        &self,
        frame: &Frame,
        status: ThreatStatus,
        detail: &str,
        confidence: u8,
    ) -> Result<IncidentRecord> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create evidence directory {}", self.dir.display()))?;

        let now = Local::now();
        let file_name = evidence_file_name(now);
        let image_path = self.dir.join(&file_name);
        let jpeg = frame.to_jpeg(self.jpeg_quality)?;
        std::fs::write(&image_path, jpeg)
            .with_context(|| format!("write evidence image {}", image_path.display()))?;

        let record = IncidentRecord::new(now, status.as_str(), detail, confidence, &file_name);
        self.log.append(&record)?;
        log::warn!(
            "evidence recorded: {} {} ({}%) -> {}",
            record.event_type,
            record.description,
            record.confidence_score,
            image_path.display()
        );
        Ok(record)
    }
}

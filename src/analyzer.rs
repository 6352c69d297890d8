//! One frame through the full pipeline.
//!
//! resize -> JPEG -> inference (one retry on 503) -> classify -> evidence -> notify

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::classify::{classify, ThreatStatus};
use crate::evidence::EvidenceRecorder;
use crate::frame::Frame;
use crate::incidents::IncidentRecord;
use crate::inference::{
    build_prompt, is_transient, InferenceClient, Label, DEFAULT_QUESTIONS, OBJECTS_OF_INTEREST,
};
use crate::notify::NotifierSet;

pub const DEFAULT_UPLOAD_WIDTH: u32 = 480;
pub const DEFAULT_UPLOAD_QUALITY: u8 = 50;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct AnalyzerSettings {
    pub upload_width: u32,
    pub upload_quality: u8,
    pub retry_delay: Duration,
    pub prompt: String,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            upload_width: DEFAULT_UPLOAD_WIDTH,
            upload_quality: DEFAULT_UPLOAD_QUALITY,
            retry_delay: DEFAULT_RETRY_DELAY,
            prompt: build_prompt(OBJECTS_OF_INTEREST, DEFAULT_QUESTIONS),
        }
    }
}

/// Outcome of one analysis.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub status: ThreatStatus,
    pub detail: String,
    /// `None` when the analysis failed.
    pub confidence: Option<u8>,
    pub labels: Vec<Label>,
    /// Present when evidence was recorded.
    pub incident: Option<IncidentRecord>,
}

impl AnalysisReport {
    fn error(detail: String) -> Self {
        Self {
            status: ThreatStatus::Error,
            detail,
            confidence: None,
            labels: Vec::new(),
            incident: None,
        }
    }
}

pub struct Analyzer {
    client: Arc<dyn InferenceClient>,
    recorder: EvidenceRecorder,
    notifiers: NotifierSet,
    settings: AnalyzerSettings,
}

impl Analyzer {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        recorder: EvidenceRecorder,
        notifiers: NotifierSet,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            client,
            recorder,
            notifiers,
            settings,
        }
    }

    pub fn recorder(&self) -> &EvidenceRecorder {
        &self.recorder
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Analyze one frame. Never fails: problems surface as `ERROR` reports.
    ///
    /// For incident statuses the evidence is recorded and the notifiers are
    /// run before this returns.
    pub fn analyze_frame(&self, frame: &Frame) -> AnalysisReport {
        let upload = match frame
            .resized(self.settings.upload_width)
            .and_then(|small| small.to_jpeg(self.settings.upload_quality))
        {
            Ok(jpeg) => jpeg,
            Err(err) => {
                log::error!("could not prepare upload image: {:#}", err);
                return AnalysisReport::error(format!("{:#}", err));
            }
        };

        let labels = match self.infer(&upload) {
            Ok(labels) => labels,
            Err(err) => {
                log::error!("inference via {} failed: {:#}", self.client.name(), err);
                return AnalysisReport::error(format!("{:#}", err));
            }
        };

        let verdict = classify(&labels);
        log::info!(
            "verdict: {} - {} ({}%, score {})",
            verdict.status,
            verdict.detail,
            verdict.confidence,
            verdict.signals.score
        );

        let mut report = AnalysisReport {
            status: verdict.status,
            detail: verdict.detail.to_string(),
            confidence: Some(verdict.confidence),
            labels,
            incident: None,
        };
        if !verdict.status.is_incident() {
            return report;
        }

        match self
            .recorder
            .record(frame, verdict.status, verdict.detail, verdict.confidence)
        {
            Ok(record) => {
                let delivered = self.notifiers.dispatch(&record);
                log::debug!("incident delivered to {} notifier(s)", delivered);
                report.incident = Some(record);
            }
            Err(err) => log::error!("could not record evidence: {:#}", err),
        }
        report
    }

    fn infer(&self, jpeg: &[u8]) -> anyhow::Result<Vec<Label>> {
        match self.client.analyze(jpeg, &self.settings.prompt) {
            Err(err) if is_transient(&err) => {
                log::warn!(
                    "{:#}; retrying once in {:?}",
                    err,
                    self.settings.retry_delay
                );
                std::thread::sleep(self.settings.retry_delay);
                self.client.analyze(jpeg, &self.settings.prompt)
            }
            other => other,
        }
    }
}

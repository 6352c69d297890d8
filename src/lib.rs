//! Watchpost
//!
//! A camera threat monitor. Frames from a camera are periodically sent, with a
//! fixed question prompt, to a remote vision service. The labels it returns are
//! turned into a scene status by an ordered rule table:
//!
//! `SECURE`, `SUSPICIOUS`, `THREAT DETECTED`, `WEAPON DETECTED`, `PERSON DOWN`
//!
//! Any non-secure status writes a full-size evidence JPEG, appends a record to
//! a JSON incident log and fans the record out to the configured notifiers.
//! A failed analysis reports `ERROR` and records nothing.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (camera device or synthetic, still image)
//! - `frame`: frames, resize/JPEG, latest-frame hub for the video stream
//! - `inference`: vision service client seam, prompt, HTTP and stub clients
//! - `classify`: signal extraction, threat score, rule table
//! - `evidence` / `incidents`: evidence images and the incident log
//! - `notify`: log, webhook and MQTT alert channels
//! - `analyzer`: one frame through the whole pipeline
//! - `monitor`: live capture loop with single-flight analysis
//! - `status` / `api`: current status and the HTTP surface
//! - `config`: file plus environment configuration

pub mod analyzer;
pub mod api;
pub mod classify;
pub mod config;
pub mod evidence;
pub mod frame;
pub mod incidents;
pub mod inference;
pub mod ingest;
pub mod monitor;
pub mod notify;
pub mod status;

pub use analyzer::{AnalysisReport, Analyzer, AnalyzerSettings};
pub use classify::{classify, ThreatStatus, Verdict};
pub use config::WatchpostConfig;
pub use evidence::EvidenceRecorder;
pub use frame::{Frame, FrameHub};
pub use incidents::{IncidentLog, IncidentRecord};
pub use inference::{client_for_endpoint, InferenceClient, Label};
pub use ingest::{CameraConfig, CameraSource, FrameSource, StillImageSource};
pub use monitor::{LiveMonitor, MonitorOptions, MonitorStats, StopReason};
pub use notify::{LogNotifier, Notifier, NotifierSet};
pub use status::StatusBoard;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Notifiers named by the configuration. The log channel is always present;
/// an unreachable webhook or broker address is an error, a broker that is
/// merely down is not (the MQTT client reconnects in the background).
pub fn build_notifiers(cfg: &WatchpostConfig) -> Result<NotifierSet> {
    let mut set = NotifierSet::new().with(LogNotifier);
    if let Some(url) = &cfg.notify.webhook_url {
        set.push(Box::new(notify::WebhookNotifier::new(
            url,
            Duration::from_secs(10),
        )?));
    }
    if let Some(broker) = &cfg.notify.mqtt_broker {
        let endpoint = notify::MqttEndpoint::parse(broker)?;
        let client_id = format!("watchpost-{}", std::process::id());
        set.push(Box::new(notify::MqttNotifier::connect(
            &endpoint,
            &client_id,
            &cfg.notify.mqtt_topic,
        )?));
    }
    Ok(set)
}

/// Analyzer wired from configuration: inference client, evidence recorder and
/// notifiers.
pub fn build_analyzer(cfg: &WatchpostConfig) -> Result<Analyzer> {
    let client = client_for_endpoint(
        &cfg.inference.endpoint,
        cfg.inference.api_key.as_deref(),
        cfg.inference.timeout,
    )?;
    Ok(Analyzer::new(
        Arc::from(client),
        EvidenceRecorder::new(&cfg.evidence.dir, cfg.evidence.quality),
        build_notifiers(cfg)?,
        cfg.analyzer_settings(),
    ))
}

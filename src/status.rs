//! Shared view of the latest verdict, read by the HTTP surface.

use serde::Serialize;
use std::sync::Mutex;

use crate::classify::ThreatStatus;
use crate::incidents::{format_timestamp, IncidentRecord};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: ThreatStatus,
    pub detail: String,
    pub confidence: Option<u8>,
    pub last_alert: Option<IncidentRecord>,
    pub analyses: u64,
    pub last_analyzed_at: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: ThreatStatus::Secure,
            detail: "Awaiting first analysis".to_string(),
            confidence: None,
            last_alert: None,
            analyses: 0,
            last_analyzed_at: None,
        }
    }
}

#[derive(Default)]
pub struct StatusBoard {
    inner: Mutex<StatusSnapshot>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished analysis. `last_alert` only moves forward on incidents.
    pub fn update(
        &self,
        status: ThreatStatus,
        detail: &str,
        confidence: Option<u8>,
        incident: Option<&IncidentRecord>,
    ) {
        let Ok(mut snap) = self.inner.lock() else {
            log::error!("status board lock poisoned");
            return;
        };
        snap.status = status;
        snap.detail = detail.to_string();
        snap.confidence = confidence;
        snap.analyses += 1;
        snap.last_analyzed_at = Some(format_timestamp(chrono::Local::now()));
        if let Some(record) = incident {
            snap.last_alert = Some(record.clone());
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner
            .lock()
            .map(|snap| snap.clone())
            .unwrap_or_default()
    }
}

//! Threat classification.
//!
//! Turns the labels returned for one frame into a [`Verdict`]:
//! - labels are parsed into boolean [`Signals`] and a threat score
//! - the score picks a confidence bucket
//! - the ordered [`RULES`] table picks the status and detail text
//!
//! Classification is pure. Evidence and notification for non-secure verdicts
//! are driven by [`crate::analyzer::Analyzer`].

mod rules;
mod signals;

use serde::Serialize;

use crate::inference::Label;

pub use rules::{first_match, Rule, RULES};
pub use signals::{extract_signals, is_negative, Signals};

/// Scene status codes. `Error` is never produced by [`classify`]; it marks a
/// failed analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreatStatus {
    Secure,
    Suspicious,
    ThreatDetected,
    WeaponDetected,
    PersonDown,
    Error,
}

impl ThreatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatStatus::Secure => "SECURE",
            ThreatStatus::Suspicious => "SUSPICIOUS",
            ThreatStatus::ThreatDetected => "THREAT DETECTED",
            ThreatStatus::WeaponDetected => "WEAPON DETECTED",
            ThreatStatus::PersonDown => "PERSON DOWN",
            ThreatStatus::Error => "ERROR",
        }
    }

    /// Statuses that produce evidence and alerts.
    pub fn is_incident(&self) -> bool {
        !matches!(self, ThreatStatus::Secure | ThreatStatus::Error)
    }
}

impl std::fmt::Display for ThreatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ThreatStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Classification result for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub status: ThreatStatus,
    pub detail: &'static str,
    /// Always 98, 75 or 99.
    pub confidence: u8,
    pub signals: Signals,
}

/// Map a threat score onto its confidence bucket.
///
/// A score of zero reports higher confidence than a score of one.
pub fn confidence_for_score(score: u32) -> u8 {
    match score {
        0 => 99,
        1 => 75,
        _ => 98,
    }
}

/// Classify one frame's labels. An empty label set resolves to `SECURE`.
pub fn classify(labels: &[Label]) -> Verdict {
    let signals = extract_signals(labels);
    let rule = first_match(&signals);
    Verdict {
        status: rule.status,
        detail: rule.detail,
        confidence: confidence_for_score(signals.score),
        signals,
    }
}

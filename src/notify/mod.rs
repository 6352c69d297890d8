//! Incident notification.
//!
//! Every incident goes to a [`NotifierSet`], which forwards it to each
//! configured channel:
//! - [`LogNotifier`]: a warn-level log line (always on)
//! - [`WebhookNotifier`]: JSON `POST` to a URL
//! - [`MqttNotifier`]: QoS 1 publish to a broker topic
//!
//! A failing channel is logged and skipped; notification never fails an analysis.

mod mqtt;
mod webhook;

use anyhow::Result;

use crate::incidents::IncidentRecord;

pub use mqtt::{MqttEndpoint, MqttNotifier};
pub use webhook::WebhookNotifier;

/// An alert channel.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn notify(&self, record: &IncidentRecord) -> Result<()>;
}

/// Writes incidents to the process log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, record: &IncidentRecord) -> Result<()> {
        log::warn!(
            "ALERT {}: {} (confidence {}%, evidence {})",
            record.event_type,
            record.description,
            record.confidence_score,
            record.evidence_file
        );
        Ok(())
    }
}

/// Fan-out over several channels.
#[derive(Default)]
pub struct NotifierSet {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.push(Box::new(notifier));
        self
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Deliver to every channel. Returns how many accepted the record.
    pub fn dispatch(&self, record: &IncidentRecord) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.notify(record) {
                Ok(()) => delivered += 1,
                Err(err) => log::warn!("notifier {} failed: {:#}", notifier.name(), err),
            }
        }
        delivered
    }
}

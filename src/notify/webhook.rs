use anyhow::{anyhow, Result};
use std::time::Duration;

use super::Notifier;
use crate::incidents::IncidentRecord;

/// Posts each incident record as JSON.
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!("webhook url must be http(s), got '{}'", url));
        }
        Ok(Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn notify(&self, record: &IncidentRecord) -> Result<()> {
        match self.agent.post(&self.url).send_json(record) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => {
                Err(anyhow!("webhook {} answered {}", self.url, code))
            }
            Err(err) => Err(anyhow::Error::new(err).context(format!("post to {}", self.url))),
        }
    }
}

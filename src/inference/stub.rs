use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{InferenceClient, Label, ServiceUnavailable};

/// One scripted answer.
#[derive(Clone, Debug)]
pub enum StubReply {
    Labels(Vec<Label>),
    Unavailable,
    Fail(String),
}

/// Offline inference client.
///
/// Replies are served from a script in order; once the script is exhausted
/// every call gets the fallback (no labels unless changed).
pub struct StubInference {
    script: Mutex<VecDeque<StubReply>>,
    fallback: StubReply,
    calls: AtomicUsize,
}

impl StubInference {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: StubReply::Labels(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answer with these labels.
    pub fn answering(labels: Vec<Label>) -> Self {
        Self {
            fallback: StubReply::Labels(labels),
            ..Self::new()
        }
    }

    pub fn with_script(replies: impl IntoIterator<Item = StubReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Self::new()
        }
    }

    /// Number of `analyze` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubInference {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceClient for StubInference {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn analyze(&self, jpeg: &[u8], _prompt: &str) -> Result<Vec<Label>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if jpeg.is_empty() {
            return Err(anyhow!("stub inference received an empty image"));
        }
        let reply = {
            let mut script = self
                .script
                .lock()
                .map_err(|_| anyhow!("stub script lock poisoned"))?;
            script.pop_front().unwrap_or_else(|| self.fallback.clone())
        };
        match reply {
            StubReply::Labels(labels) => Ok(labels),
            StubReply::Unavailable => Err(ServiceUnavailable {
                status: 503,
                message: "stub unavailable".to_string(),
            }
            .into()),
            StubReply::Fail(message) => Err(anyhow!(message)),
        }
    }
}

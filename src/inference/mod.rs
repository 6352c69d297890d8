//! Remote vision inference.
//!
//! The analytical engine is an external vision service. This module defines the
//! seam the rest of the crate talks to ([`InferenceClient`]), the prompt sent
//! with every frame, and two clients:
//! - [`HttpInferenceClient`]: JSON over HTTP with a bearer credential
//! - [`StubInference`]: offline scripted answers (`stub://` endpoints, tests)

mod http;
mod prompt;
mod stub;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use http::{HttpInferenceClient, InferenceRequest, InferenceResponse};
pub use prompt::{build_prompt, DEFAULT_QUESTIONS, OBJECTS_OF_INTEREST};
pub use stub::{StubInference, StubReply};

/// One answered question: `(category, classLabel)` in the service's terms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub category: String,
    #[serde(rename = "classLabel")]
    pub answer: String,
}

impl Label {
    pub fn new(category: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            answer: answer.into(),
        }
    }
}

/// Client for the vision service.
///
/// `analyze` receives an already-downsized JPEG and the prompt text and returns
/// whatever labels the service produced. An empty vector is a valid answer.
pub trait InferenceClient: Send + Sync {
    /// Client identifier for logs.
    fn name(&self) -> &'static str;

    fn analyze(&self, jpeg: &[u8], prompt: &str) -> Result<Vec<Label>>;
}

/// The service reported itself temporarily unavailable (HTTP 503).
///
/// This is the only failure class the analyzer retries.
#[derive(Clone, Debug)]
pub struct ServiceUnavailable {
    pub status: u16,
    pub message: String,
}

impl std::fmt::Display for ServiceUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inference service unavailable ({}): {}",
            self.status, self.message
        )
    }
}

impl std::error::Error for ServiceUnavailable {}

/// True when any error in the chain is a [`ServiceUnavailable`].
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<ServiceUnavailable>())
}

/// Build the configured client: `stub://` endpoints get a [`StubInference`],
/// anything else the HTTP client.
pub fn client_for_endpoint(
    endpoint: &str,
    api_key: Option<&str>,
    timeout: std::time::Duration,
) -> Result<Box<dyn InferenceClient>> {
    if endpoint.starts_with("stub://") {
        log::info!("inference: using offline stub for {}", endpoint);
        return Ok(Box::new(StubInference::new()));
    }
    let api_key =
        api_key.ok_or_else(|| anyhow::anyhow!("an API key is required for {}", endpoint))?;
    Ok(Box::new(HttpInferenceClient::new(endpoint, api_key, timeout)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn transient_detection_walks_the_chain() {
        let err = anyhow::Error::new(ServiceUnavailable {
            status: 503,
            message: "busy".to_string(),
        })
        .context("analyze frame");
        assert!(is_transient(&err));

        let other = anyhow!("connection refused");
        assert!(!is_transient(&other));

        let wrapped: Result<()> = Err(other).context("upload");
        assert!(!is_transient(&wrapped.unwrap_err()));
    }

    #[test]
    fn label_uses_service_field_names() {
        let json = r#"{"category":"weapon check","classLabel":"none"}"#;
        let label: Label = serde_json::from_str(json).unwrap();
        assert_eq!(label, Label::new("weapon check", "none"));
        assert_eq!(serde_json::to_string(&label).unwrap(), json);
    }

    #[test]
    fn http_endpoint_requires_a_key() {
        let timeout = std::time::Duration::from_secs(5);
        assert!(client_for_endpoint("https://vision.invalid/v1", None, timeout).is_err());
        let stub = client_for_endpoint("stub://secure", None, timeout).unwrap();
        assert_eq!(stub.name(), "stub");
    }
}

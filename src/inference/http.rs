use anyhow::{anyhow, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{InferenceClient, Label, ServiceUnavailable};

const MAX_ERROR_BODY_BYTES: usize = 512;

/// Request body posted to the vision service.
#[derive(Debug, Serialize)]
pub struct InferenceRequest<'a> {
    pub prompt: &'a str,
    pub image: EncodedImage,
}

#[derive(Debug, Serialize)]
pub struct EncodedImage {
    pub content_type: &'static str,
    pub data: String,
}

/// Response body. A missing `classes` array means no labels.
#[derive(Debug, Default, Deserialize)]
pub struct InferenceResponse {
    #[serde(default)]
    pub classes: Vec<Label>,
}

/// Vision service client over HTTP.
///
/// The credential is supplied at construction and sent as a bearer token.
pub struct HttpInferenceClient {
    endpoint: String,
    api_key: String,
    agent: ureq::Agent,
}

impl HttpInferenceClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(anyhow!(
                "inference endpoint must be an http(s) URL, got '{}'",
                endpoint
            ));
        }
        if api_key.trim().is_empty() {
            return Err(anyhow!("inference API key is empty"));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.trim().to_string(),
            agent,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl InferenceClient for HttpInferenceClient {
    fn name(&self) -> &'static str {
        "http"
    }

    fn analyze(&self, jpeg: &[u8], prompt: &str) -> Result<Vec<Label>> {
        let request = InferenceRequest {
            prompt,
            image: EncodedImage {
                content_type: "image/jpeg",
                data: base64::engine::general_purpose::STANDARD.encode(jpeg),
            },
        };

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Accept", "application/json")
            .send_json(&request);

        match response {
            Ok(response) => {
                let body: InferenceResponse = response
                    .into_json()
                    .context("decode inference response")?;
                Ok(body.classes)
            }
            Err(ureq::Error::Status(503, response)) => Err(ServiceUnavailable {
                status: 503,
                message: error_body(response),
            }
            .into()),
            Err(ureq::Error::Status(code, response)) => Err(anyhow!(
                "inference service returned {}: {}",
                code,
                error_body(response)
            )),
            Err(err) => Err(anyhow::Error::new(err).context("send inference request")),
        }
    }
}

fn error_body(response: ureq::Response) -> String {
    let mut body = response.into_string().unwrap_or_default();
    if body.len() > MAX_ERROR_BODY_BYTES {
        let mut cut = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::is_transient;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Serve exactly one canned response and hand back the raw request.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/v1/analyze", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut data = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).unwrap();
                data.extend_from_slice(&buf[..n]);
                if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if data.len() >= end + 4 + length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&data).to_string()
        });
        (url, handle)
    }

    #[test]
    fn posts_prompt_and_image_with_bearer_key() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"classes":[{"category":"weapon check","classLabel":"none"}]}"#,
        );
        let client = HttpInferenceClient::new(&url, "secret-key", Duration::from_secs(5)).unwrap();
        let labels = client.analyze(b"\xFF\xD8jpeg", "count the people").unwrap();
        assert_eq!(labels, vec![Label::new("weapon check", "none")]);

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /v1/analyze"));
        assert!(request.contains("Bearer secret-key"));
        assert!(request.contains("count the people"));
        assert!(request.contains("image/jpeg"));
    }

    #[test]
    fn missing_classes_means_no_labels() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", r#"{"status":"done"}"#);
        let client = HttpInferenceClient::new(&url, "k", Duration::from_secs(5)).unwrap();
        assert!(client.analyze(b"jpeg", "prompt").unwrap().is_empty());
        server.join().unwrap();
    }

    #[test]
    fn unavailable_is_transient() {
        let (url, server) = serve_once(
            "HTTP/1.1 503 Service Unavailable",
            r#"{"error":"overloaded"}"#,
        );
        let client = HttpInferenceClient::new(&url, "k", Duration::from_secs(5)).unwrap();
        let err = client.analyze(b"jpeg", "prompt").unwrap_err();
        assert!(is_transient(&err));
        assert!(err.to_string().contains("overloaded"));
        server.join().unwrap();
    }

    #[test]
    fn other_status_codes_are_not_transient() {
        let (url, server) = serve_once("HTTP/1.1 401 Unauthorized", r#"{"error":"bad key"}"#);
        let client = HttpInferenceClient::new(&url, "k", Duration::from_secs(5)).unwrap();
        let err = client.analyze(b"jpeg", "prompt").unwrap_err();
        assert!(!is_transient(&err));
        assert!(err.to_string().contains("401"));
        server.join().unwrap();
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(HttpInferenceClient::new("ftp://x", "k", Duration::from_secs(1)).is_err());
        assert!(HttpInferenceClient::new("https://x", "  ", Duration::from_secs(1)).is_err());
    }
}

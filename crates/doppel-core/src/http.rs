//! Shared HTTP plumbing for the match and lookup gateway clients.

use std::time::Duration;

use serde::Deserialize;

/// Per-request timeout applied when the caller does not configure one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent sent on every outbound request.
const USER_AGENT: &str = concat!("doppel/", env!("CARGO_PKG_VERSION"));

/// Location and credentials of one remote service.
///
/// The URL is a complete endpoint; clients request it as-is and never
/// join path segments onto it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    /// Sent as an `x-api-key` header when present.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .expect("failed to build HTTP client")
}

/// Error body both services use: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct WireError {
    pub error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorDetail {
    pub code: String,
    pub message: String,
}

impl WireError {
    pub fn describe(&self) -> String {
        format!("{}: {}", self.error.code, self.error.message)
    }
}

/// Human-readable form of a non-success response, folding in the wire
/// error body when one was sent.
pub(crate) fn describe_status(status: reqwest::StatusCode, body: &[u8]) -> String {
    if let Ok(wire) = serde_json::from_slice::<WireError>(body) {
        return wire.describe();
    }
    format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("unknown")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_format() {
        assert!(USER_AGENT.starts_with("doppel/"));
    }

    #[test]
    fn test_endpoint_defaults() {
        let ep = Endpoint::new("https://faces.example/v1/search", None);
        assert_eq!(ep.url, "https://faces.example/v1/search");
        assert_eq!(ep.timeout, DEFAULT_TIMEOUT);
        assert!(ep.api_key.is_none());
    }

    #[test]
    fn test_describe_status_with_wire_body() {
        let body = br#"{"error": {"code": "INVALID_IMAGE", "message": "no face found"}}"#;
        let text = describe_status(reqwest::StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(text, "INVALID_IMAGE: no face found");
    }

    #[test]
    fn test_describe_status_without_wire_body() {
        let text = describe_status(reqwest::StatusCode::BAD_GATEWAY, b"oops");
        assert_eq!(text, "HTTP 502: Bad Gateway");
    }
}

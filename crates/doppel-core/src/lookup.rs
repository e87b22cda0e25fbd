//! Enrichment lookup gateway.
//!
//! Resolves a selected match id against the remote lookup service and
//! returns whatever record it holds for it. The record's shape is owned
//! entirely by the service.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::http::{self, Endpoint};
use crate::types::EnrichmentResult;

/// Failure reported by the lookup boundary.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The service holds no record for this match id.
    #[error("no record found for match {0}")]
    NotFound(String),

    /// Transport failure, service-side failure, or malformed response.
    #[error("lookup failed: {0}")]
    Remote(String),
}

/// Client interface for the lookup service.
#[async_trait]
pub trait LookupApi: Send + Sync {
    /// Resolve one match id. The id must come from the current candidate
    /// list; the session layer enforces that before calling here.
    async fn lookup(&self, match_id: &str) -> Result<EnrichmentResult, LookupError>;
}

/// HTTP client for the lookup endpoint.
pub struct LookupClient {
    http_client: reqwest::Client,
    endpoint: Endpoint,
}

impl LookupClient {
    pub fn new(endpoint: Endpoint) -> Self {
        let http_client = http::build_client(endpoint.timeout);
        Self {
            http_client,
            endpoint,
        }
    }

    fn request_url(&self, match_id: &str) -> String {
        format!(
            "{}?matchId={}",
            self.endpoint.url,
            urlencoding::encode(match_id)
        )
    }
}

#[async_trait]
impl LookupApi for LookupClient {
    async fn lookup(&self, match_id: &str) -> Result<EnrichmentResult, LookupError> {
        let url = self.request_url(match_id);
        debug!(match_id, "requesting enrichment record");

        let mut request = self.http_client.get(&url);
        if let Some(key) = &self.endpoint.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LookupError::Remote(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(match_id.to_string()));
        }
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(LookupError::Remote(http::describe_status(status, &body)));
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| LookupError::Remote(format!("malformed lookup response: {e}")))?;

        let record = to_enrichment(match_id, value)?;
        info!(match_id, fields = record.0.len(), "lookup responded");
        Ok(record)
    }
}

/// A `null` body and an empty object both mean the service resolved the
/// id to nothing. Any other non-object body is malformed.
fn to_enrichment(match_id: &str, value: Value) -> Result<EnrichmentResult, LookupError> {
    match value {
        Value::Null => Err(LookupError::NotFound(match_id.to_string())),
        Value::Object(fields) if fields.is_empty() => {
            Err(LookupError::NotFound(match_id.to_string()))
        }
        Value::Object(fields) => Ok(EnrichmentResult(fields)),
        other => Err(LookupError::Remote(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_url_encodes_match_id() {
        let client = LookupClient::new(Endpoint::new("https://records.example/v1/people", None));
        assert_eq!(
            client.request_url("m 1/x"),
            "https://records.example/v1/people?matchId=m%201%2Fx"
        );
    }

    #[test]
    fn test_object_body_passes_through() {
        let value = json!({"bio": "...", "name": "Jane Doe"});
        let record = to_enrichment("m1", value).unwrap();
        assert_eq!(record.get("bio").and_then(|v| v.as_str()), Some("..."));
        assert_eq!(record.0.len(), 2);
    }

    #[test]
    fn test_null_body_is_not_found() {
        let err = to_enrichment("m1", Value::Null).unwrap_err();
        assert!(matches!(err, LookupError::NotFound(id) if id == "m1"));
    }

    #[test]
    fn test_empty_object_is_not_found() {
        let err = to_enrichment("m1", json!({})).unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
    }

    #[test]
    fn test_non_object_body_is_remote_error() {
        let err = to_enrichment("m1", json!(["a", "b"])).unwrap_err();
        match err {
            LookupError::Remote(msg) => assert!(msg.contains("an array")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

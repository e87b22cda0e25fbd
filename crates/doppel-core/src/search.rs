//! Face search gateway.
//!
//! Relays one captured photo to the remote face-search service and returns
//! the candidate list it reports. The service ranks candidates by
//! descending similarity; that order is preserved exactly, never
//! recomputed or re-sorted here.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::http::{self, Endpoint};
use crate::types::{CapturedImage, MatchCandidate};

/// Failure reported by the face-search boundary.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The image itself was rejected (empty, oversized, undecodable).
    #[error("image rejected: {0}")]
    InvalidImage(String),

    /// Credentials missing or rejected by the service.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport failure, service-side failure, or malformed response.
    #[error("face search failed: {0}")]
    Remote(String),
}

/// Client interface for the face-search service.
#[async_trait]
pub trait FaceSearchApi: Send + Sync {
    /// Submit one image, receiving candidates in service ranking order.
    /// An empty list is a successful response, not an error.
    async fn find_matches(&self, image: CapturedImage) -> Result<Vec<MatchCandidate>, MatchError>;
}

/// HTTP client for the face-search endpoint.
pub struct FaceSearchClient {
    http_client: reqwest::Client,
    endpoint: Endpoint,
}

/// Request body: `{"image": "<base64>"}`.
#[derive(Debug, Serialize)]
struct MatchRequest<'a> {
    image: &'a str,
}

/// Response body: `{"matches": [...]}`. A missing `matches` field is
/// treated the same as an empty list.
#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    matches: Vec<MatchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchEntry {
    match_id: String,
    similarity_score: f32,
    /// Base64-encoded thumbnail; the service may omit it.
    #[serde(default)]
    thumbnail: Option<String>,
}

impl FaceSearchClient {
    pub fn new(endpoint: Endpoint) -> Self {
        let http_client = http::build_client(endpoint.timeout);
        Self {
            http_client,
            endpoint,
        }
    }

    async fn send_match_request(
        &self,
        image: &CapturedImage,
    ) -> Result<MatchResponse, MatchError> {
        let encoded = BASE64.encode(&image.data);
        let body = MatchRequest { image: &encoded };

        let mut request = self.http_client.post(&self.endpoint.url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MatchError::Remote(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(classify_status(status, http::describe_status(status, &body)));
        }

        response
            .json::<MatchResponse>()
            .await
            .map_err(|e| MatchError::Remote(format!("malformed match response: {e}")))
    }
}

#[async_trait]
impl FaceSearchApi for FaceSearchClient {
    async fn find_matches(&self, image: CapturedImage) -> Result<Vec<MatchCandidate>, MatchError> {
        if image.data.is_empty() {
            return Err(MatchError::InvalidImage("empty image buffer".to_string()));
        }

        debug!(
            bytes = image.data.len(),
            content_type = image.format.content_type(),
            "submitting image to face search"
        );

        let response = self.send_match_request(&image).await?;
        let candidates = to_candidates(response);
        info!(count = candidates.len(), "face search responded");
        Ok(candidates)
    }
}

/// Map a non-success status onto the error taxonomy. 4xx statuses that
/// blame the image map to `InvalidImage`; credential statuses map to
/// `Auth`; everything else is the service's problem.
fn classify_status(status: reqwest::StatusCode, detail: String) -> MatchError {
    use reqwest::StatusCode;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MatchError::Auth(detail),
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => MatchError::InvalidImage(detail),
        _ => MatchError::Remote(detail),
    }
}

fn to_candidates(response: MatchResponse) -> Vec<MatchCandidate> {
    response
        .matches
        .into_iter()
        .map(|entry| MatchCandidate {
            thumbnail: entry
                .thumbnail
                .as_deref()
                .map(decode_thumbnail)
                .unwrap_or_default(),
            match_id: entry.match_id,
            similarity: entry.similarity_score,
        })
        .collect()
}

/// An undecodable thumbnail degrades to an empty buffer rather than
/// failing the whole match response.
fn decode_thumbnail(encoded: &str) -> Vec<u8> {
    match BASE64.decode(encoded) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "dropping undecodable thumbnail");
            Vec::new()
        }
    }
}

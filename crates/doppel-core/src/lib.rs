//! Session state machine and remote gateways for doppel.
//!
//! Models one capture -> match -> select -> enrich session and hosts the
//! HTTP clients for the external face-search and lookup services. All
//! actual face matching happens remotely; this crate only relays requests
//! and tracks what the user is looking at.

pub mod http;
pub mod lookup;
pub mod search;
pub mod session;
pub mod types;

pub use http::Endpoint;
pub use lookup::{LookupApi, LookupClient, LookupError};
pub use search::{FaceSearchApi, FaceSearchClient, MatchError};
pub use session::{
    Failure, FailureKind, Outcome, Phase, SessionController, SessionSnapshot,
};
pub use types::{
    CaptureError, CapturedImage, EnrichmentResult, ImageFormat, ImageSource, MatchCandidate,
};

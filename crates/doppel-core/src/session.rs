//! Session state machine.
//!
//! One `SessionController` tracks one user-facing session through the
//! capture -> match -> select -> enrich flow. The controller is
//! synchronous and owned by a single driver; the daemon engine performs
//! the camera and network work between `begin_*` and `complete_*` calls.
//!
//! Supersession works through a generation counter. Every `begin_*` call
//! bumps the generation and stamps it into the ticket it returns;
//! completions arriving with a stale ticket are discarded, never applied.
//! `selected` therefore always refers to the candidate list of the most
//! recent capture.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lookup::LookupError;
use crate::search::MatchError;
use crate::types::{CaptureError, EnrichmentResult, MatchCandidate};

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Capturing,
    Matched,
    Enriching,
    Enriched,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Capturing => "capturing",
            Phase::Matched => "matched",
            Phase::Enriching => "enriching",
            Phase::Enriched => "enriched",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a session failure, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CaptureUnavailable,
    InvalidImage,
    Auth,
    RemoteService,
    NotFound,
}

/// What the `Error` phase carries.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<CaptureError> for Failure {
    fn from(err: CaptureError) -> Self {
        Self {
            kind: FailureKind::CaptureUnavailable,
            message: err.to_string(),
        }
    }
}

impl From<MatchError> for Failure {
    fn from(err: MatchError) -> Self {
        let kind = match &err {
            MatchError::InvalidImage(_) => FailureKind::InvalidImage,
            MatchError::Auth(_) => FailureKind::Auth,
            MatchError::Remote(_) => FailureKind::RemoteService,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<LookupError> for Failure {
    fn from(err: LookupError) -> Self {
        let kind = match &err {
            LookupError::NotFound(_) => FailureKind::NotFound,
            LookupError::Remote(_) => FailureKind::RemoteService,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Stamp identifying which generation an in-flight capture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTicket {
    generation: u64,
}

/// Stamp identifying which generation and candidate an in-flight
/// enrichment belongs to.
#[derive(Debug, Clone)]
pub struct EnrichTicket {
    generation: u64,
    match_id: String,
}

impl EnrichTicket {
    /// The id the enrichment lookup should resolve.
    pub fn match_id(&self) -> &str {
        &self.match_id
    }
}

/// Whether a completion landed in session state or arrived for a
/// superseded generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Discarded,
}

/// Rejected selection attempt. These are caller errors, not session
/// failures: the session stays in its current phase.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no selectable candidates while {0}")]
    NotReady(Phase),
    #[error("unknown candidate {0}")]
    UnknownCandidate(String),
}

/// The session state machine. Exactly one logical writer (the most
/// recent user action, applied by the engine thread) mutates it, so no
/// locking is involved.
#[derive(Debug, Default)]
pub struct SessionController {
    generation: u64,
    phase: Phase,
    candidates: Vec<MatchCandidate>,
    /// Index into `candidates`; cleared whenever `candidates` changes.
    selected: Option<usize>,
    enrichment: Option<EnrichmentResult>,
    failure: Option<Failure>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn candidates(&self) -> &[MatchCandidate] {
        &self.candidates
    }

    pub fn selected(&self) -> Option<&MatchCandidate> {
        self.selected.map(|idx| &self.candidates[idx])
    }

    pub fn enrichment(&self) -> Option<&EnrichmentResult> {
        self.enrichment.as_ref()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Start a new capture. Permitted in every phase, including `Error`.
    ///
    /// Prior candidates, selection, and enrichment are discarded here at
    /// issue time, so a completion from a superseded operation can never
    /// resurrect them.
    pub fn begin_capture(&mut self) -> CaptureTicket {
        self.generation += 1;
        self.phase = Phase::Capturing;
        self.candidates.clear();
        self.selected = None;
        self.enrichment = None;
        self.failure = None;
        debug!(generation = self.generation, "capture started");
        CaptureTicket {
            generation: self.generation,
        }
    }

    /// Apply the result of a capture+match run. Stale tickets are
    /// discarded without touching state.
    ///
    /// An empty candidate list is a normal `Matched` outcome; a failure
    /// moves to `Error` and changes nothing besides phase and failure.
    pub fn complete_capture(
        &mut self,
        ticket: CaptureTicket,
        result: Result<Vec<MatchCandidate>, Failure>,
    ) -> Outcome {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding superseded capture result"
            );
            return Outcome::Discarded;
        }

        match result {
            Ok(candidates) => {
                info!(
                    generation = self.generation,
                    count = candidates.len(),
                    "match results installed"
                );
                self.candidates = candidates;
                self.selected = None;
                self.enrichment = None;
                self.phase = Phase::Matched;
            }
            Err(failure) => {
                warn!(
                    generation = self.generation,
                    kind = ?failure.kind,
                    message = %failure.message,
                    "capture failed"
                );
                self.failure = Some(failure);
                self.phase = Phase::Error;
            }
        }
        Outcome::Applied
    }

    /// Select one candidate by id, starting its enrichment lookup.
    ///
    /// Permitted while the candidate list is live: in `Matched`,
    /// `Enriching` (superseding the in-flight lookup), and `Enriched`
    /// (re-selection). After a failure only a fresh capture moves the
    /// session forward.
    pub fn begin_select(&mut self, match_id: &str) -> Result<EnrichTicket, SelectError> {
        match self.phase {
            Phase::Matched | Phase::Enriching | Phase::Enriched => {}
            phase => return Err(SelectError::NotReady(phase)),
        }

        let idx = self
            .candidates
            .iter()
            .position(|c| c.match_id == match_id)
            .ok_or_else(|| SelectError::UnknownCandidate(match_id.to_string()))?;

        self.generation += 1;
        self.selected = Some(idx);
        self.enrichment = None;
        self.phase = Phase::Enriching;
        debug!(generation = self.generation, match_id, "selection started");
        Ok(EnrichTicket {
            generation: self.generation,
            match_id: self.candidates[idx].match_id.clone(),
        })
    }

    /// Apply the result of an enrichment lookup. Stale tickets are
    /// discarded without touching state.
    pub fn complete_enrichment(
        &mut self,
        ticket: EnrichTicket,
        result: Result<EnrichmentResult, Failure>,
    ) -> Outcome {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                match_id = ticket.match_id,
                "discarding superseded enrichment result"
            );
            return Outcome::Discarded;
        }

        match result {
            Ok(record) => {
                info!(
                    generation = self.generation,
                    match_id = ticket.match_id,
                    "enrichment installed"
                );
                self.enrichment = Some(record);
                self.phase = Phase::Enriched;
            }
            Err(failure) => {
                warn!(
                    generation = self.generation,
                    kind = ?failure.kind,
                    message = %failure.message,
                    "enrichment failed"
                );
                self.failure = Some(failure);
                self.phase = Phase::Error;
            }
        }
        Outcome::Applied
    }

    /// Serializable view of the current session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase.as_str(),
            generation: self.generation,
            failure: self.failure.clone(),
            candidates: self.candidates.iter().map(CandidateSummary::from).collect(),
            selected: self
                .selected
                .map(|idx| self.candidates[idx].match_id.clone()),
            enrichment: self.enrichment.clone(),
        }
    }
}

/// View of the session handed to IPC clients as JSON.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub phase: &'static str,
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub candidates: Vec<CandidateSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentResult>,
}

/// One candidate as shown to clients. Thumbnails travel base64-encoded.
#[derive(Debug, Serialize)]
pub struct CandidateSummary {
    pub match_id: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thumbnail: String,
}

impl From<&MatchCandidate> for CandidateSummary {
    fn from(candidate: &MatchCandidate) -> Self {
        Self {
            match_id: candidate.match_id.clone(),
            similarity: candidate.similarity,
            thumbnail: if candidate.thumbnail.is_empty() {
                String::new()
            } else {
                BASE64.encode(&candidate.thumbnail)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, similarity: f32) -> MatchCandidate {
        MatchCandidate {
            match_id: id.to_string(),
            similarity,
            thumbnail: Vec::new(),
        }
    }

    fn bio_record(text: &str) -> EnrichmentResult {
        let mut fields = serde_json::Map::new();
        fields.insert("bio".to_string(), serde_json::Value::from(text));
        EnrichmentResult(fields)
    }

    fn matched_session(ids: &[(&str, f32)]) -> SessionController {
        let mut session = SessionController::new();
        let ticket = session.begin_capture();
        let candidates = ids.iter().map(|(id, sim)| candidate(id, *sim)).collect();
        assert_eq!(
            session.complete_capture(ticket, Ok(candidates)),
            Outcome::Applied
        );
        session
    }

    #[test]
    fn test_initial_state() {
        let session = SessionController::new();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.generation(), 0);
        assert!(session.candidates().is_empty());
        assert!(session.selected().is_none());
        assert!(session.enrichment().is_none());
        assert!(session.failure().is_none());
    }

    #[test]
    fn test_capture_success_keeps_service_order() {
        let session = matched_session(&[("m1", 97.2), ("m2", 81.0)]);

        assert_eq!(session.phase(), Phase::Matched);
        assert_eq!(session.candidates().len(), 2);
        assert_eq!(session.candidates()[0].match_id, "m1");
        assert!((session.candidates()[0].similarity - 97.2).abs() < 1e-6);
        assert_eq!(session.candidates()[1].match_id, "m2");
        assert!(session.selected().is_none());
    }

    #[test]
    fn test_empty_match_list_is_matched_not_error() {
        let session = matched_session(&[]);
        assert_eq!(session.phase(), Phase::Matched);
        assert!(session.candidates().is_empty());
        assert!(session.failure().is_none());
    }

    #[test]
    fn test_capture_failure_carries_kind() {
        let mut session = SessionController::new();
        let ticket = session.begin_capture();
        let failure = Failure::from(MatchError::Auth("authentication failed: 401".to_string()));

        assert_eq!(session.complete_capture(ticket, Err(failure)), Outcome::Applied);
        assert_eq!(session.phase(), Phase::Error);
        let recorded = session.failure().unwrap();
        assert_eq!(recorded.kind, FailureKind::Auth);
        // The failure path leaves candidate data alone.
        assert!(session.candidates().is_empty());
    }

    #[test]
    fn test_second_capture_supersedes_first() {
        let mut session = SessionController::new();
        let first = session.begin_capture();
        let second = session.begin_capture();

        assert_eq!(
            session.complete_capture(first, Ok(vec![candidate("stale", 50.0)])),
            Outcome::Discarded
        );
        assert_eq!(session.phase(), Phase::Capturing);
        assert!(session.candidates().is_empty());

        assert_eq!(
            session.complete_capture(second, Ok(vec![candidate("fresh", 90.0)])),
            Outcome::Applied
        );
        assert_eq!(session.phase(), Phase::Matched);
        assert_eq!(session.candidates()[0].match_id, "fresh");
    }

    #[test]
    fn test_new_capture_discards_prior_results() {
        let mut session = matched_session(&[("m1", 97.2)]);
        let enrich = session.begin_select("m1").unwrap();
        session.complete_enrichment(enrich, Ok(bio_record("...")));
        assert_eq!(session.phase(), Phase::Enriched);

        session.begin_capture();
        assert_eq!(session.phase(), Phase::Capturing);
        assert!(session.candidates().is_empty());
        assert!(session.selected().is_none());
        assert!(session.enrichment().is_none());
    }

    #[test]
    fn test_capture_from_error_clears_failure() {
        let mut session = SessionController::new();
        let ticket = session.begin_capture();
        session.complete_capture(
            ticket,
            Err(Failure::from(CaptureError::DeviceUnavailable(
                "/dev/video0 missing".to_string(),
            ))),
        );
        assert_eq!(session.phase(), Phase::Error);

        session.begin_capture();
        assert_eq!(session.phase(), Phase::Capturing);
        assert!(session.failure().is_none());
    }

    #[test]
    fn test_select_starts_enrichment() {
        let mut session = matched_session(&[("m1", 97.2), ("m2", 81.0)]);
        let ticket = session.begin_select("m1").unwrap();

        assert_eq!(session.phase(), Phase::Enriching);
        assert_eq!(ticket.match_id(), "m1");
        assert_eq!(session.selected().unwrap().match_id, "m1");
    }

    #[test]
    fn test_enrichment_success_installs_record() {
        let mut session = matched_session(&[("m1", 97.2)]);
        let ticket = session.begin_select("m1").unwrap();

        assert_eq!(
            session.complete_enrichment(ticket, Ok(bio_record("..."))),
            Outcome::Applied
        );
        assert_eq!(session.phase(), Phase::Enriched);
        let record = session.enrichment().unwrap();
        assert_eq!(record.get("bio").and_then(|v| v.as_str()), Some("..."));
    }

    #[test]
    fn test_enrichment_failure_keeps_candidates_and_selection() {
        let mut session = matched_session(&[("m1", 97.2), ("m2", 81.0)]);
        let ticket = session.begin_select("m2").unwrap();

        let failure = Failure::from(LookupError::NotFound("m2".to_string()));
        assert_eq!(session.complete_enrichment(ticket, Err(failure)), Outcome::Applied);

        assert_eq!(session.phase(), Phase::Error);
        assert_eq!(session.failure().unwrap().kind, FailureKind::NotFound);
        assert_eq!(session.candidates().len(), 2);
        assert_eq!(session.selected().unwrap().match_id, "m2");
    }

    #[test]
    fn test_select_rejected_when_not_ready() {
        let mut idle = SessionController::new();
        assert!(matches!(
            idle.begin_select("m1"),
            Err(SelectError::NotReady(Phase::Idle))
        ));

        let mut capturing = SessionController::new();
        capturing.begin_capture();
        assert!(matches!(
            capturing.begin_select("m1"),
            Err(SelectError::NotReady(Phase::Capturing))
        ));

        let mut errored = SessionController::new();
        let ticket = errored.begin_capture();
        errored.complete_capture(
            ticket,
            Err(Failure::from(MatchError::Remote("503".to_string()))),
        );
        assert!(matches!(
            errored.begin_select("m1"),
            Err(SelectError::NotReady(Phase::Error))
        ));
    }

    #[test]
    fn test_select_unknown_candidate() {
        let mut session = matched_session(&[("m1", 97.2)]);
        assert!(matches!(
            session.begin_select("m9"),
            Err(SelectError::UnknownCandidate(id)) if id == "m9"
        ));
        // A rejected selection leaves the session untouched.
        assert_eq!(session.phase(), Phase::Matched);
    }

    #[test]
    fn test_capture_during_enrichment_discards_stale_result() {
        let mut session = matched_session(&[("m1", 97.2)]);
        let enrich = session.begin_select("m1").unwrap();

        // User gives up waiting and captures again.
        let capture = session.begin_capture();

        assert_eq!(
            session.complete_enrichment(enrich, Ok(bio_record("stale"))),
            Outcome::Discarded
        );
        assert_eq!(session.phase(), Phase::Capturing);
        assert!(session.enrichment().is_none());

        session.complete_capture(capture, Ok(vec![candidate("m3", 88.8)]));
        assert_eq!(session.phase(), Phase::Matched);
        assert_eq!(session.candidates()[0].match_id, "m3");
    }

    #[test]
    fn test_reselect_during_enrichment_supersedes() {
        let mut session = matched_session(&[("m1", 97.2), ("m2", 81.0)]);
        let first = session.begin_select("m1").unwrap();
        let second = session.begin_select("m2").unwrap();

        assert_eq!(
            session.complete_enrichment(first, Ok(bio_record("first"))),
            Outcome::Discarded
        );
        assert_eq!(session.phase(), Phase::Enriching);

        assert_eq!(
            session.complete_enrichment(second, Ok(bio_record("second"))),
            Outcome::Applied
        );
        assert_eq!(session.phase(), Phase::Enriched);
        assert_eq!(session.selected().unwrap().match_id, "m2");
        assert_eq!(
            session.enrichment().unwrap().get("bio").and_then(|v| v.as_str()),
            Some("second")
        );
    }

    #[test]
    fn test_reselect_after_enriched_clears_previous_record() {
        let mut session = matched_session(&[("m1", 97.2), ("m2", 81.0)]);
        let first = session.begin_select("m1").unwrap();
        session.complete_enrichment(first, Ok(bio_record("first")));
        assert_eq!(session.phase(), Phase::Enriched);

        session.begin_select("m2").unwrap();
        assert_eq!(session.phase(), Phase::Enriching);
        assert!(session.enrichment().is_none());
        assert_eq!(session.selected().unwrap().match_id, "m2");
    }

    #[test]
    fn test_generation_increases_per_operation() {
        let mut session = matched_session(&[("m1", 97.2)]);
        let after_capture = session.generation();
        session.begin_select("m1").unwrap();
        assert!(session.generation() > after_capture);
        let after_select = session.generation();
        session.begin_capture();
        assert!(session.generation() > after_select);
    }

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            Failure::from(CaptureError::NoFrame("timeout".to_string())).kind,
            FailureKind::CaptureUnavailable
        );
        assert_eq!(
            Failure::from(MatchError::InvalidImage("empty".to_string())).kind,
            FailureKind::InvalidImage
        );
        assert_eq!(
            Failure::from(MatchError::Auth("denied".to_string())).kind,
            FailureKind::Auth
        );
        assert_eq!(
            Failure::from(MatchError::Remote("502".to_string())).kind,
            FailureKind::RemoteService
        );
        assert_eq!(
            Failure::from(LookupError::NotFound("m1".to_string())).kind,
            FailureKind::NotFound
        );
        assert_eq!(
            Failure::from(LookupError::Remote("io".to_string())).kind,
            FailureKind::RemoteService
        );
    }

    #[test]
    fn test_snapshot_shape() {
        let mut session = SessionController::new();
        let ticket = session.begin_capture();
        session.complete_capture(
            ticket,
            Ok(vec![MatchCandidate {
                match_id: "m1".to_string(),
                similarity: 97.2,
                thumbnail: b"hi".to_vec(),
            }]),
        );
        session.begin_select("m1").unwrap();

        let value = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(value["phase"], "enriching");
        assert_eq!(value["selected"], "m1");
        assert_eq!(value["candidates"][0]["match_id"], "m1");
        assert_eq!(value["candidates"][0]["thumbnail"], "aGk=");
        // Absent optional fields are omitted, not serialized as null.
        assert!(value.get("failure").is_none());
        assert!(value.get("enrichment").is_none());
    }

    #[test]
    fn test_snapshot_omits_empty_thumbnail() {
        let session = matched_session(&[("m1", 97.2)]);
        let value = serde_json::to_value(session.snapshot()).unwrap();
        assert!(value["candidates"][0].get("thumbnail").is_none());
        assert!((value["candidates"][0]["similarity"].as_f64().unwrap() - 97.2).abs() < 1e-6);
    }
}

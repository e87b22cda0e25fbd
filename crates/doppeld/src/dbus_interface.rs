use doppel_core::session::SelectError;
use doppel_core::SessionSnapshot;
use zbus::interface;

use crate::engine::{EngineError, EngineHandle};

/// D-Bus interface for the doppel session daemon.
///
/// Bus name: org.doppel.Doppel1
/// Object path: /org/doppel/Doppel1
pub struct DoppelService {
    engine: EngineHandle,
    camera_device: String,
    face_api_url: String,
    lookup_api_url: String,
}

impl DoppelService {
    pub fn new(
        engine: EngineHandle,
        camera_device: String,
        face_api_url: String,
        lookup_api_url: String,
    ) -> Self {
        Self {
            engine,
            camera_device,
            face_api_url,
            lookup_api_url,
        }
    }
}

#[interface(name = "org.doppel.Doppel1")]
impl DoppelService {
    /// Capture a photo and run the face search. Returns the resulting
    /// session snapshot as JSON; a failed capture or search is reported
    /// inside the snapshot, not as a D-Bus error.
    async fn capture(&self) -> zbus::fdo::Result<String> {
        tracing::info!("capture requested");
        let snapshot = self.engine.capture().await.map_err(to_fdo)?;
        to_json(&snapshot)
    }

    /// Select one candidate from the current matches and look up its
    /// record. Returns the resulting session snapshot as JSON.
    async fn select(&self, match_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(match_id, "select requested");
        let snapshot = self.engine.select(match_id).await.map_err(to_fdo)?;
        to_json(&snapshot)
    }

    /// Current session snapshot as JSON, without side effects.
    async fn info(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.engine.snapshot().await.map_err(to_fdo)?;
        to_json(&snapshot)
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.engine.snapshot().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": self.camera_device,
            "face_api_url": self.face_api_url,
            "lookup_api_url": self.lookup_api_url,
            "phase": snapshot.phase,
        })
        .to_string())
    }
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Select(SelectError::UnknownCandidate(id)) => {
            zbus::fdo::Error::InvalidArgs(format!("unknown candidate {id}"))
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn to_json(snapshot: &SessionSnapshot) -> zbus::fdo::Result<String> {
    serde_json::to_string(snapshot)
        .map_err(|e| zbus::fdo::Error::Failed(format!("snapshot serialization failed: {e}")))
}

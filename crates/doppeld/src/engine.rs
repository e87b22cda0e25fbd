use std::sync::Arc;

use doppel_core::session::{CaptureTicket, EnrichTicket, SelectError};
use doppel_core::{
    Failure, FaceSearchApi, ImageSource, LookupApi, Outcome, SessionController, SessionSnapshot,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    /// A newer capture or selection took over before this one resolved.
    #[error("superseded by a newer action")]
    Superseded,
    #[error("selection rejected: {0}")]
    Select(#[from] SelectError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers (and from completion tasks) to the
/// engine thread.
enum EngineRequest {
    Capture {
        reply: oneshot::Sender<Result<SessionSnapshot, EngineError>>,
    },
    Select {
        match_id: String,
        reply: oneshot::Sender<Result<SessionSnapshot, EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    MatchesReady {
        ticket: CaptureTicket,
        result: Result<Vec<doppel_core::MatchCandidate>, Failure>,
        reply: oneshot::Sender<Result<SessionSnapshot, EngineError>>,
    },
    EnrichmentReady {
        ticket: EnrichTicket,
        result: Result<doppel_core::EnrichmentResult, Failure>,
        reply: oneshot::Sender<Result<SessionSnapshot, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture a photo and run the face search, returning the resulting
    /// session snapshot. A snapshot in the error phase is a normal
    /// return; `EngineError::Superseded` means a newer action replaced
    /// this one before its result landed.
    pub async fn capture(&self) -> Result<SessionSnapshot, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Capture { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Select one candidate from the current match list and run its
    /// enrichment lookup.
    pub async fn select(&self, match_id: &str) -> Result<SessionSnapshot, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Select {
                match_id: match_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Current session snapshot, without side effects.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the image source and all session state. Gateway calls
/// run on the tokio runtime and re-enter the loop as completion
/// requests, so a slow remote service never blocks the loop; a capture
/// issued while a search or lookup is in flight simply supersedes it.
///
/// Must be called from within a tokio runtime.
pub fn spawn_engine(
    source: Box<dyn ImageSource>,
    search: Arc<dyn FaceSearchApi>,
    lookup: Arc<dyn LookupApi>,
) -> EngineHandle {
    let (tx, rx) = mpsc::channel::<EngineRequest>(8);
    // The loop and its completion tasks hold only weak senders, so the
    // channel closes (and the thread exits) once the last external
    // handle is dropped.
    let weak = tx.downgrade();
    let rt = tokio::runtime::Handle::current();

    std::thread::Builder::new()
        .name("doppel-engine".into())
        .spawn(move || run_engine(rx, weak, source, search, lookup, rt))
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_engine(
    mut rx: mpsc::Receiver<EngineRequest>,
    weak: mpsc::WeakSender<EngineRequest>,
    mut source: Box<dyn ImageSource>,
    search: Arc<dyn FaceSearchApi>,
    lookup: Arc<dyn LookupApi>,
    rt: tokio::runtime::Handle,
) {
    let mut session = SessionController::new();
    tracing::info!("engine thread started");

    while let Some(req) = rx.blocking_recv() {
        match req {
            EngineRequest::Capture { reply } => {
                run_capture(&mut session, source.as_mut(), &search, &weak, &rt, reply);
            }
            EngineRequest::Select { match_id, reply } => {
                run_select(&mut session, &lookup, &weak, &rt, &match_id, reply);
            }
            EngineRequest::Snapshot { reply } => {
                let _ = reply.send(session.snapshot());
            }
            EngineRequest::MatchesReady {
                ticket,
                result,
                reply,
            } => {
                let outcome = session.complete_capture(ticket, result);
                reply_with_outcome(outcome, &session, reply);
            }
            EngineRequest::EnrichmentReady {
                ticket,
                result,
                reply,
            } => {
                let outcome = session.complete_enrichment(ticket, result);
                reply_with_outcome(outcome, &session, reply);
            }
        }
    }

    tracing::info!("engine thread exiting");
}

/// Photograph synchronously, then hand the search call to the runtime.
/// A capture failure is applied as session state and answered with a
/// normal snapshot, not an engine error.
fn run_capture(
    session: &mut SessionController,
    source: &mut dyn ImageSource,
    search: &Arc<dyn FaceSearchApi>,
    weak: &mpsc::WeakSender<EngineRequest>,
    rt: &tokio::runtime::Handle,
    reply: oneshot::Sender<Result<SessionSnapshot, EngineError>>,
) {
    let ticket = session.begin_capture();

    let image = match source.capture() {
        Ok(image) => image,
        Err(err) => {
            session.complete_capture(ticket, Err(Failure::from(err)));
            let _ = reply.send(Ok(session.snapshot()));
            return;
        }
    };

    let search = Arc::clone(search);
    let weak = weak.clone();
    rt.spawn(async move {
        let result = search.find_matches(image).await.map_err(Failure::from);
        let Some(tx) = weak.upgrade() else {
            return;
        };
        let _ = tx
            .send(EngineRequest::MatchesReady {
                ticket,
                result,
                reply,
            })
            .await;
    });
}

/// Validate the selection against the current candidates, then hand the
/// lookup call to the runtime. Rejections answer the caller directly and
/// leave session state alone.
fn run_select(
    session: &mut SessionController,
    lookup: &Arc<dyn LookupApi>,
    weak: &mpsc::WeakSender<EngineRequest>,
    rt: &tokio::runtime::Handle,
    match_id: &str,
    reply: oneshot::Sender<Result<SessionSnapshot, EngineError>>,
) {
    let ticket = match session.begin_select(match_id) {
        Ok(ticket) => ticket,
        Err(err) => {
            let _ = reply.send(Err(EngineError::Select(err)));
            return;
        }
    };

    let lookup = Arc::clone(lookup);
    let weak = weak.clone();
    rt.spawn(async move {
        let result = lookup
            .lookup(ticket.match_id())
            .await
            .map_err(Failure::from);
        let Some(tx) = weak.upgrade() else {
            return;
        };
        let _ = tx
            .send(EngineRequest::EnrichmentReady {
                ticket,
                result,
                reply,
            })
            .await;
    });
}

fn reply_with_outcome(
    outcome: Outcome,
    session: &SessionController,
    reply: oneshot::Sender<Result<SessionSnapshot, EngineError>>,
) {
    let response = match outcome {
        Outcome::Applied => Ok(session.snapshot()),
        Outcome::Discarded => Err(EngineError::Superseded),
    };
    let _ = reply.send(response);
}

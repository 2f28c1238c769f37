//! I/O seams.
//!
//! [`Authority`] is the request/response side (snapshots, hands, actions,
//! match creation) and [`PushTransport`] opens the real-time channel. The
//! session state machine never calls either; a runtime executes the session's
//! actions against them. Production implementations live behind the
//! `transport` feature, simulated ones in the harness crate.

use std::future::Future;

use tokio::{sync::mpsc, task::AbortHandle};
use truco_core::{CreateMatchRequest, HandView, MatchId, MatchSnapshot};

use crate::{
    dispatcher::ActionKind,
    error::{AuthorityError, TransportError},
};

/// The remote authority owning match state.
pub trait Authority: Clone + Send + Sync + 'static {
    /// Full snapshot of `match_id`.
    fn fetch_snapshot(
        &self,
        match_id: MatchId,
    ) -> impl Future<Output = Result<MatchSnapshot, AuthorityError>> + Send;

    /// `player`'s private view of `match_id`.
    fn fetch_hand(
        &self,
        match_id: MatchId,
        player: String,
    ) -> impl Future<Output = Result<HandView, AuthorityError>> + Send;

    /// Perform `action` as `player`. Resolves to the acknowledgement text.
    fn submit(
        &self,
        match_id: MatchId,
        player: String,
        action: ActionKind,
    ) -> impl Future<Output = Result<String, AuthorityError>> + Send;

    /// Create a match. Resolves to its identifier.
    fn create_match(
        &self,
        request: CreateMatchRequest,
    ) -> impl Future<Output = Result<MatchId, AuthorityError>> + Send;
}

/// Opens real-time subscriptions.
pub trait PushTransport: Clone + Send + Sync + 'static {
    /// Subscribe to `match_id`. Resolves once the channel is ready to deliver.
    fn open(
        &self,
        match_id: MatchId,
    ) -> impl Future<Output = Result<PushChannel, TransportError>> + Send;
}

/// A live subscription: inbound text frames in arrival order.
///
/// The channel ends (`recv` returns `None`) when the transport closes.
/// Dropping the channel stops the background task feeding it, if any.
#[derive(Debug)]
pub struct PushChannel {
    frames: mpsc::Receiver<String>,
    abort_handle: Option<AbortHandle>,
}

impl PushChannel {
    /// Wrap a frame receiver. `abort_handle` stops the task feeding it.
    pub fn new(frames: mpsc::Receiver<String>, abort_handle: Option<AbortHandle>) -> Self {
        Self { frames, abort_handle }
    }

    /// Next inbound frame. `None` once the transport is closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.frames.recv().await
    }

    /// Stop the transport.
    pub fn close(&mut self) {
        self.frames.close();
        if let Some(handle) = self.abort_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.close();
    }
}

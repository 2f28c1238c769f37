//! Consumer-facing handle to a running session.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use truco_client::{ActionKind, ClientError};
use truco_core::{
    BidKind, ConnectionState, CreateMatchRequest, HandView, MatchId, MatchSnapshot,
};

use crate::state::MatchView;

/// Requests from handles to the runtime task.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe {
        match_id: MatchId,
        player: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Unsubscribe {
        reply: oneshot::Sender<()>,
    },
    Submit {
        action: ActionKind,
        reply: oneshot::Sender<Result<String, ClientError>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    CreateMatch {
        request: CreateMatchRequest,
        reply: oneshot::Sender<Result<MatchId, ClientError>>,
    },
    Shutdown,
}

/// Cloneable async API over one [`crate::Runtime`].
///
/// Every method fails with [`ClientError::Stopped`] once the runtime is gone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<MatchView>,
}

impl SessionHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, view: watch::Receiver<MatchView>) -> Self {
        Self { commands, view }
    }

    /// Follow `match_id` as `player`, replacing any current subscription.
    ///
    /// Resolves once the push channel is up. If the first connect fails the
    /// subscription stays active on fallback polling and the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectionTimeout`] or [`ClientError::TransportClosed`]
    ///   when the first connect fails
    /// - [`ClientError::TransportClosed`] when superseded before connecting
    pub async fn subscribe(
        &self,
        match_id: impl Into<MatchId>,
        player: impl Into<String>,
    ) -> Result<(), ClientError> {
        let (match_id, player) = (match_id.into(), player.into());
        self.request(|reply| Command::Subscribe { match_id, player, reply }).await?
    }

    /// Stop following the current match. Idempotent.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Stopped`] if the runtime is gone
    pub async fn unsubscribe(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Unsubscribe { reply }).await
    }

    /// Play the card at `index` in the local hand.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::submit`].
    pub async fn play_card(&self, index: usize) -> Result<String, ClientError> {
        self.submit(ActionKind::PlayCard { index }).await
    }

    /// Call truco or envido.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::submit`].
    pub async fn call_bid(&self, bid: BidKind) -> Result<String, ClientError> {
        self.submit(ActionKind::CallBid(bid)).await
    }

    /// Accept the pending bid.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::submit`].
    pub async fn accept(&self) -> Result<String, ClientError> {
        self.submit(ActionKind::Accept).await
    }

    /// Decline the pending bid.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::submit`].
    pub async fn decline(&self) -> Result<String, ClientError> {
        self.submit(ActionKind::Decline).await
    }

    /// Fold the round.
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::submit`].
    pub async fn fold(&self) -> Result<String, ClientError> {
        self.submit(ActionKind::Fold).await
    }

    /// Send `action` as the local player. Resolves to the authority's
    /// acknowledgement text.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotSubscribed`] without a subscription
    /// - [`ClientError::ActionBusy`] while another action is in flight
    /// - [`ClientError::NotYourTurn`] for turn-scoped actions out of turn
    /// - [`ClientError::RemoteRejected`] when the authority refuses
    /// - [`ClientError::AuthorityUnavailable`] when the authority is unreachable
    pub async fn submit(&self, action: ActionKind) -> Result<String, ClientError> {
        self.request(|reply| Command::Submit { action, reply }).await?
    }

    /// Fetch the snapshot and hand now. Resolves when the snapshot arrives.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotSubscribed`] without a subscription
    /// - [`ClientError::RefreshFailed`] when the fetch fails
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    /// Ask the authority to create a match.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidRequest`] for a roster the authority would refuse
    /// - [`ClientError::RemoteRejected`] when the authority refuses
    /// - [`ClientError::AuthorityUnavailable`] when the authority is unreachable
    pub async fn create_match(&self, request: CreateMatchRequest) -> Result<MatchId, ClientError> {
        self.request(|reply| Command::CreateMatch { request, reply }).await?
    }

    /// Stop the runtime. Outstanding requests fail with
    /// [`ClientError::Stopped`].
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    /// Current view.
    pub fn view(&self) -> MatchView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    pub fn watch(&self) -> watch::Receiver<MatchView> {
        self.view.clone()
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Option<Arc<MatchSnapshot>> {
        self.view.borrow().snapshot.clone()
    }

    /// Latest local hand.
    pub fn hand(&self) -> Option<Arc<HandView>> {
        self.view.borrow().hand.clone()
    }

    /// Push connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.view.borrow().connection
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(command(reply)).await.map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)
    }
}

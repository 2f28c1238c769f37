//! Match session state machine.
//!
//! Ties the push connection, the synchronizer, the fallback poller and the
//! action dispatcher together for one followed match. The connection state is
//! the single arbiter between push and poll: every state change re-evaluates
//! the poller, so a connected channel and an active poller never coexist.

use std::{
    ops::Sub,
    sync::Arc,
    time::{Duration, Instant},
};

use truco_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, HandView, MatchId,
    MatchSnapshot,
};

use crate::{
    dispatcher::{ActionKind, ActionTicket, Dispatcher},
    error::{AuthorityError, ClientError},
    event::{SessionAction, SessionEvent},
    poller::{DEFAULT_POLL_INTERVAL, Poller},
    sync::{DEFAULT_MAX_PENDING_UPDATES, SyncAction, Synchronizer},
};

/// Interval at which a runtime should feed [`SessionEvent::Tick`].
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Push channel timeouts and retry budget.
    pub connection: ConnectionConfig,
    /// Interval between fallback refreshes.
    pub poll_interval: Duration,
    /// Interval between ticks. Bounds timer precision.
    pub tick_interval: Duration,
    /// Updates kept while waiting for a baseline snapshot.
    pub max_pending_updates: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_pending_updates: DEFAULT_MAX_PENDING_UPDATES,
        }
    }
}

/// Outstanding request bookkeeping for one fetch kind.
#[derive(Debug, Default, Clone, Copy)]
struct FetchState {
    in_flight: bool,
    /// Another fetch was requested while one was in flight.
    again: bool,
    /// Push generation when the in-flight fetch was issued.
    generation: u64,
}

/// State machine for following one match at a time.
///
/// Event in, actions out: see [`SessionEvent`] and [`SessionAction`].
#[derive(Debug)]
pub struct MatchSession<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    connection: Connection<I>,
    sync: Synchronizer,
    poller: Poller<I>,
    dispatcher: Dispatcher,
    player: Option<String>,
    snapshot_fetch: FetchState,
    hand_fetch: FetchState,
    /// Bumped whenever a pushed update changes the published snapshot. A
    /// fetch issued under an older generation is stale.
    push_generation: u64,
}

impl<I> MatchSession<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an idle session.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            connection: Connection::new(config.connection),
            sync: Synchronizer::new(config.max_pending_updates),
            poller: Poller::new(config.poll_interval),
            dispatcher: Dispatcher::new(),
            player: None,
            snapshot_fetch: FetchState::default(),
            hand_fetch: FetchState::default(),
            push_generation: 0,
        }
    }

    /// Push channel state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Match being followed.
    pub fn match_id(&self) -> Option<&MatchId> {
        self.sync.match_id()
    }

    /// Local player name.
    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    /// Last reconciled snapshot.
    pub fn snapshot(&self) -> Option<Arc<MatchSnapshot>> {
        self.sync.current_snapshot()
    }

    /// Last fetched hand.
    pub fn hand(&self) -> Option<Arc<HandView>> {
        self.sync.current_hand()
    }

    /// Whether the fallback poller is active.
    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    /// Whether an action is in flight for the followed match.
    pub fn is_busy(&self) -> bool {
        self.sync.match_id().is_some_and(|id| self.dispatcher.is_busy(id))
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// Only consumer requests fail, and only before any I/O is requested:
    /// - `ClientError::NotSubscribed` for `Submit`/`Refresh` with no match
    /// - `ClientError::ActionBusy` / `ClientError::NotYourTurn` for `Submit`
    pub fn handle(&mut self, event: SessionEvent<I>) -> Result<Vec<SessionAction>, ClientError> {
        let mut out = Vec::new();

        match event {
            SessionEvent::Subscribe { match_id, player, now } => {
                self.subscribe(match_id, player, now, &mut out)?;
            },
            SessionEvent::Unsubscribe => self.unsubscribe(&mut out),
            SessionEvent::TransportReady { attempt } => {
                let actions = self.connection.transport_ready(attempt);
                self.apply_connection(actions, None, &mut out);
            },
            SessionEvent::TransportClosed { attempt, reason, now } => {
                let actions = self.connection.transport_closed(attempt, reason, now);
                self.apply_connection(actions, Some(now), &mut out);
            },
            SessionEvent::FrameReceived { attempt, text } => {
                let actions = self.connection.handle_message(attempt, &text);
                self.apply_connection(actions, None, &mut out);
            },
            SessionEvent::SnapshotFetched { match_id, result } => {
                self.on_snapshot_fetched(&match_id, result, &mut out);
            },
            SessionEvent::HandFetched { match_id, player, result } => {
                self.on_hand_fetched(&match_id, &player, result, &mut out);
            },
            SessionEvent::Submit { action } => self.submit(action, &mut out)?,
            SessionEvent::SubmitCompleted { ticket, result } => {
                self.on_submit_completed(ticket, result, &mut out);
            },
            SessionEvent::Refresh => {
                if self.sync.match_id().is_none() {
                    return Err(ClientError::NotSubscribed);
                }
                self.request_snapshot(&mut out);
                self.request_hand(&mut out);
            },
            SessionEvent::Tick { now } => self.tick(now, &mut out),
        }

        Ok(out)
    }

    fn subscribe(
        &mut self,
        match_id: MatchId,
        player: String,
        now: I,
        out: &mut Vec<SessionAction>,
    ) -> Result<(), ClientError> {
        if self.sync.match_id().is_some() || self.connection.state() != ConnectionState::Disconnected
        {
            self.unsubscribe(out);
        }

        tracing::info!(%match_id, %player, "subscribing to match");
        self.sync.track(match_id.clone());
        self.player = Some(player);
        self.snapshot_fetch = FetchState::default();
        self.hand_fetch = FetchState::default();

        let actions = self.connection.connect(match_id, now)?;
        self.apply_connection(actions, Some(now), out);

        self.request_snapshot(out);
        self.request_hand(out);
        Ok(())
    }

    fn unsubscribe(&mut self, out: &mut Vec<SessionAction>) {
        let actions = self.connection.disconnect();
        self.apply_connection(actions, None, out);
        self.poller.stop();

        if let Some(match_id) = self.sync.match_id() {
            tracing::info!(%match_id, "unsubscribed from match");
        }
        self.sync.clear();
        self.player = None;
        self.snapshot_fetch = FetchState::default();
        self.hand_fetch = FetchState::default();
        out.push(SessionAction::Cleared);
    }

    fn submit(&mut self, action: ActionKind, out: &mut Vec<SessionAction>) -> Result<(), ClientError> {
        let (Some(match_id), Some(player)) = (self.sync.match_id().cloned(), self.player.clone())
        else {
            return Err(ClientError::NotSubscribed);
        };

        let holds_turn = self.sync.is_turn_of(&player);
        let pending = self.dispatcher.begin(match_id, &player, action, holds_turn)?;

        out.push(SessionAction::Submit {
            ticket: pending.ticket,
            match_id: pending.match_id,
            player: pending.player,
            action: pending.kind,
        });
        Ok(())
    }

    fn on_submit_completed(
        &mut self,
        ticket: ActionTicket,
        result: Result<String, AuthorityError>,
        out: &mut Vec<SessionAction>,
    ) {
        let Some(pending) = self.dispatcher.complete(ticket) else {
            tracing::debug!(ticket, "completion for unknown action");
            return;
        };

        let result = match result {
            Ok(ack) => {
                tracing::debug!(ticket, kind = %pending.kind, %ack, "action acknowledged");
                if self.sync.match_id() != Some(&pending.match_id) {
                    tracing::debug!(
                        match_id = %pending.match_id,
                        "match no longer active, skipping refresh"
                    );
                } else if !self.connection.state().is_connected() {
                    self.request_snapshot(out);
                    self.request_hand(out);
                }
                Ok(ack)
            },
            Err(e) => {
                tracing::warn!(ticket, kind = %pending.kind, error = %e, "action rejected");
                Err(ClientError::from(e))
            },
        };

        out.push(SessionAction::ActionCompleted { ticket, result });
    }

    fn on_snapshot_fetched(
        &mut self,
        match_id: &MatchId,
        result: Result<MatchSnapshot, AuthorityError>,
        out: &mut Vec<SessionAction>,
    ) {
        if self.sync.match_id() != Some(match_id) {
            tracing::debug!(%match_id, "discarding refresh for inactive match");
            return;
        }
        self.snapshot_fetch.in_flight = false;

        match result {
            Ok(_) if self.snapshot_fetch.generation != self.push_generation => {
                tracing::debug!(%match_id, "discarding refresh overtaken by push");
                out.push(SessionAction::RefreshSettled(Ok(())));
            },
            Ok(snapshot) => {
                let actions = self.sync.apply_snapshot(snapshot);
                self.apply_sync(actions, out);
                out.push(SessionAction::RefreshSettled(Ok(())));
            },
            Err(e) => {
                tracing::warn!(%match_id, error = %e, "refresh failed");
                let err = ClientError::refresh_failed(&e);
                out.push(SessionAction::Report(err.clone()));
                out.push(SessionAction::RefreshSettled(Err(err)));
            },
        }

        if std::mem::take(&mut self.snapshot_fetch.again) {
            self.request_snapshot(out);
        }
    }

    fn on_hand_fetched(
        &mut self,
        match_id: &MatchId,
        player: &str,
        result: Result<HandView, AuthorityError>,
        out: &mut Vec<SessionAction>,
    ) {
        let same_player = self.player.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(player));
        if self.sync.match_id() != Some(match_id) || !same_player {
            tracing::debug!(%match_id, %player, "discarding hand for inactive subscription");
            return;
        }
        self.hand_fetch.in_flight = false;

        match result {
            Ok(hand) => {
                if let Some(hand) = self.sync.apply_hand(hand) {
                    out.push(SessionAction::PublishHand(hand));
                }
            },
            Err(e) => {
                tracing::warn!(%match_id, %player, error = %e, "hand refresh failed");
                out.push(SessionAction::Report(ClientError::refresh_failed(&e)));
            },
        }

        if std::mem::take(&mut self.hand_fetch.again) {
            self.request_hand(out);
        }
    }

    fn tick(&mut self, now: I, out: &mut Vec<SessionAction>) {
        let actions = self.connection.tick(now);
        self.apply_connection(actions, Some(now), out);

        if self.poller.tick(now) {
            if self.snapshot_fetch.in_flight {
                tracing::debug!("poll skipped, refresh already in flight");
                return;
            }
            tracing::debug!(match_id = ?self.sync.match_id(), "polling for state");
            self.request_snapshot(out);
            self.request_hand(out);
        }
    }

    fn apply_connection(
        &mut self,
        actions: Vec<ConnectionAction>,
        now: Option<I>,
        out: &mut Vec<SessionAction>,
    ) {
        for action in actions {
            match action {
                ConnectionAction::Open { match_id, attempt } => {
                    out.push(SessionAction::OpenPush { match_id, attempt });
                },
                ConnectionAction::Close { attempt, reason } => {
                    tracing::debug!(attempt, %reason, "closing push transport");
                    out.push(SessionAction::ClosePush { attempt });
                },
                ConnectionAction::Deliver(update) => {
                    let actions = self.sync.reconcile(update);
                    if actions.iter().any(|a| matches!(a, SyncAction::Publish(_))) {
                        self.push_generation += 1;
                    }
                    self.apply_sync(actions, out);
                },
                ConnectionAction::StateChanged(state) => {
                    self.arbitrate(state, now);
                    out.push(SessionAction::ConnectionChanged(state));
                },
                ConnectionAction::ConnectResolved(result) => {
                    out.push(SessionAction::Subscribed(result.map_err(ClientError::from)));
                },
                ConnectionAction::Report(err) => {
                    out.push(SessionAction::Report(ClientError::from(err)));
                },
            }
        }
    }

    /// Poll exactly when a match is followed and push is not connected.
    fn arbitrate(&mut self, state: ConnectionState, now: Option<I>) {
        if state.is_connected() || self.sync.match_id().is_none() {
            self.poller.stop();
            return;
        }
        if let Some(now) = now {
            self.poller.start(now);
        }
    }

    fn apply_sync(&mut self, actions: Vec<SyncAction>, out: &mut Vec<SessionAction>) {
        for action in actions {
            match action {
                SyncAction::Publish(snapshot) => out.push(SessionAction::PublishSnapshot(snapshot)),
                SyncAction::RequestRefresh => self.request_snapshot(out),
                SyncAction::RefreshHand => self.request_hand(out),
            }
        }
    }

    fn request_snapshot(&mut self, out: &mut Vec<SessionAction>) {
        let Some(match_id) = self.sync.match_id().cloned() else {
            return;
        };
        if self.snapshot_fetch.in_flight {
            self.snapshot_fetch.again = true;
            return;
        }
        self.snapshot_fetch.in_flight = true;
        self.snapshot_fetch.generation = self.push_generation;
        out.push(SessionAction::FetchSnapshot { match_id });
    }

    fn request_hand(&mut self, out: &mut Vec<SessionAction>) {
        let (Some(match_id), Some(player)) = (self.sync.match_id().cloned(), self.player.clone())
        else {
            return;
        };
        if self.hand_fetch.in_flight {
            self.hand_fetch.again = true;
            return;
        }
        self.hand_fetch.in_flight = true;
        out.push(SessionAction::FetchHand { match_id, player });
    }
}

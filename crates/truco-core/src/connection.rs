//! Push channel state machine.
//!
//! Manages the lifecycle of one real-time subscription per match: the initial
//! connect with its timeout, bounded reconnection after a drop, and explicit
//! disconnect. Uses the action pattern: methods take time as input and return
//! actions for the driver to execute. No timers, no sockets.
//!
//! # State Machine
//!
//! ```text
//!                connect              ready
//! ┌──────────────┐ ──────> ┌────────────┐ ──────> ┌───────────┐
//! │ Disconnected │         │ Connecting │         │ Connected │<──────┐
//! └──────────────┘         └────────────┘         └───────────┘       │
//!        ^                       │ timeout/error        │ closed      │ ready
//!        │ disconnect            ↓                      ↓             │
//!        │ (any state)      ┌────────┐  cap hit  ┌──────────────┐     │
//!        └──────────────────│ Failed │<──────────│ Reconnecting │─────┘
//!                           └────────┘           └──────────────┘
//!                               │ retry                 ^
//!                               └───────────────────────┘
//! ```
//!
//! A failed initial connect resolves the caller's `connect` with the error and
//! then enters the same bounded retry schedule as a dropped channel. The state
//! stays `Failed` until the first retry opens.
//!
//! Every transport the driver opens is tagged with an [`AttemptId`]. Events
//! carrying an older id are stale and ignored, so a late `ready` from an
//! aborted attempt can never resurrect a connection.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use crate::{
    error::ConnectionError,
    protocol::{InboundUpdate, MatchId},
};

/// Time allowed for a transport to signal ready.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between a drop (or failed attempt) and the next reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Reconnection attempts allowed before giving up on push delivery.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Identifies one transport opened by the driver.
pub type AttemptId = u64;

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a transport subscription scoped to `match_id`.
    Open {
        /// Match to subscribe to.
        match_id: MatchId,
        /// Tag to attach to every event from this transport.
        attempt: AttemptId,
    },

    /// Close the transport opened for `attempt`.
    Close {
        /// Transport to close.
        attempt: AttemptId,
        /// Reason for closing.
        reason: String,
    },

    /// Forward a parsed update to the synchronizer.
    Deliver(InboundUpdate),

    /// Observable state changed.
    StateChanged(ConnectionState),

    /// Outcome of the caller's `connect`.
    ConnectResolved(Result<(), ConnectionError>),

    /// Non-fatal failure worth reporting (dropped transport, malformed frame,
    /// exhausted retries).
    Report(ConnectionError),
}

/// Connection state. The single source of truth for push-vs-poll arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No subscription.
    Disconnected,
    /// Initial connect in progress.
    Connecting,
    /// Push channel live.
    Connected,
    /// Channel dropped; waiting for or running a reconnection attempt.
    Reconnecting,
    /// Connect failed or retries exhausted. After a failed initial connect a
    /// retry may still be scheduled; once retries are exhausted, none is.
    Failed,
}

impl ConnectionState {
    /// Push channel is live.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for a transport to become ready.
    pub connect_timeout: Duration,
    /// Delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Attempts allowed after a drop.
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Connection state machine for one match subscription.
///
/// Pure: time is passed into every method that needs it. Generic over
/// `Instant` to support both real time and virtual time.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    /// Match being followed. `None` once disconnected.
    match_id: Option<MatchId>,
    /// Reconnection attempts since the last successful connect.
    attempts: u32,
    /// Id of the most recently opened transport.
    attempt: AttemptId,
    /// When the in-flight transport was opened. `None` if nothing is in flight.
    opened_at: Option<I>,
    /// When the retry delay started. `None` if no retry is scheduled.
    retry_from: Option<I>,
    /// The caller's `connect` is still waiting for an outcome.
    connect_pending: bool,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a connection in [`ConnectionState::Disconnected`].
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            match_id: None,
            attempts: 0,
            attempt: 0,
            opened_at: None,
            retry_from: None,
            connect_pending: false,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Match being followed. `None` if disconnected.
    pub fn match_id(&self) -> Option<&MatchId> {
        self.match_id.as_ref()
    }

    /// Reconnection attempts made since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Id of the most recently opened transport.
    pub fn current_attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Start following `match_id`.
    ///
    /// Allowed from `Disconnected` and `Failed`. Returns the `Open` action; the
    /// driver reports back through [`Self::transport_ready`] or
    /// [`Self::transport_closed`], and [`Self::tick`] enforces the timeout.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if a subscription is already active
    pub fn connect(
        &mut self,
        match_id: MatchId,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if !matches!(self.state, ConnectionState::Disconnected | ConnectionState::Failed) {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "connect" });
        }

        self.match_id = Some(match_id);
        self.attempts = 0;
        self.retry_from = None;
        self.connect_pending = true;

        let mut actions = Vec::new();
        self.set_state(ConnectionState::Connecting, &mut actions);
        self.open(now, &mut actions);
        Ok(actions)
    }

    /// Stop following the current match. Idempotent.
    ///
    /// Closes any live transport, forgets the match and pins the retry counter
    /// at the cap so a scheduled retry can never fire.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if self.opened_at.is_some() || self.state == ConnectionState::Connected {
            actions.push(ConnectionAction::Close {
                attempt: self.attempt,
                reason: "disconnect".to_string(),
            });
        }

        if self.connect_pending {
            self.connect_pending = false;
            actions.push(ConnectionAction::ConnectResolved(Err(
                ConnectionError::TransportClosed { reason: "disconnected".to_string() },
            )));
        }

        self.match_id = None;
        self.attempts = self.config.max_reconnect_attempts;
        self.opened_at = None;
        self.retry_from = None;
        // Anything still in flight from the old transport is now stale.
        self.attempt += 1;

        self.set_state(ConnectionState::Disconnected, &mut actions);
        actions
    }

    /// Transport `attempt` signalled ready.
    pub fn transport_ready(&mut self, attempt: AttemptId) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if !self.is_in_flight(attempt) {
            tracing::debug!(attempt, current = self.attempt, "ignoring stale transport ready");
            return actions;
        }

        self.opened_at = None;
        self.attempts = 0;
        self.set_state(ConnectionState::Connected, &mut actions);

        if self.connect_pending {
            self.connect_pending = false;
            actions.push(ConnectionAction::ConnectResolved(Ok(())));
        }

        tracing::info!(match_id = ?self.match_id, attempt, "push channel connected");
        actions
    }

    /// Transport `attempt` closed (peer close, network failure, or refused).
    pub fn transport_closed(
        &mut self,
        attempt: AttemptId,
        reason: impl Into<String>,
        now: I,
    ) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if attempt != self.attempt {
            return actions;
        }

        let reason = reason.into();
        match self.state {
            ConnectionState::Connected => {
                tracing::warn!(match_id = ?self.match_id, %reason, "push channel closed");
                actions.push(ConnectionAction::Report(ConnectionError::TransportClosed {
                    reason,
                }));
                self.schedule_retry(now, &mut actions);
            },
            ConnectionState::Connecting if self.opened_at.is_some() => {
                self.opened_at = None;
                self.fail_connect(ConnectionError::TransportClosed { reason }, now, &mut actions);
            },
            ConnectionState::Reconnecting if self.opened_at.is_some() => {
                tracing::debug!(attempt = self.attempts, %reason, "reconnection attempt failed");
                self.opened_at = None;
                self.schedule_retry(now, &mut actions);
            },
            _ => {},
        }

        actions
    }

    /// Raw text frame received on transport `attempt`.
    ///
    /// Parsed frames become `Deliver` actions in arrival order. Malformed
    /// frames are reported and dropped without touching the state.
    pub fn handle_message(&mut self, attempt: AttemptId, text: &str) -> Vec<ConnectionAction> {
        if attempt != self.attempt || self.match_id.is_none() {
            tracing::debug!(attempt, "dropping frame from stale transport");
            return Vec::new();
        }

        match InboundUpdate::parse(text) {
            Ok(update) => vec![ConnectionAction::Deliver(update)],
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed update");
                vec![ConnectionAction::Report(ConnectionError::MalformedUpdate {
                    reason: e.to_string(),
                })]
            },
        }
    }

    /// Process timeouts and due reconnection attempts.
    ///
    /// Call this periodically; the granularity of the calls bounds the
    /// precision of both the connect timeout and the reconnect delay.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if let Some(opened_at) = self.opened_at {
            let elapsed = now - opened_at;
            if elapsed >= self.config.connect_timeout {
                actions.push(ConnectionAction::Close {
                    attempt: self.attempt,
                    reason: format!("connect timeout after {elapsed:?}"),
                });
                self.opened_at = None;

                match self.state {
                    ConnectionState::Connecting => {
                        let error = ConnectionError::ConnectionTimeout { elapsed };
                        self.fail_connect(error, now, &mut actions);
                    },
                    ConnectionState::Reconnecting => self.schedule_retry(now, &mut actions),
                    _ => {},
                }
            }
            return actions;
        }

        if let Some(retry_from) = self.retry_from
            && matches!(self.state, ConnectionState::Reconnecting | ConnectionState::Failed)
            && now - retry_from >= self.config.reconnect_delay
        {
            self.retry_from = None;
            self.set_state(ConnectionState::Reconnecting, &mut actions);
            tracing::info!(
                attempt = self.attempts,
                max = self.config.max_reconnect_attempts,
                "attempting to reconnect"
            );
            self.open(now, &mut actions);
        }

        actions
    }

    fn is_in_flight(&self, attempt: AttemptId) -> bool {
        attempt == self.attempt && self.opened_at.is_some()
    }

    fn open(&mut self, now: I, actions: &mut Vec<ConnectionAction>) {
        let Some(match_id) = self.match_id.clone() else {
            return;
        };
        self.attempt += 1;
        self.opened_at = Some(now);
        actions.push(ConnectionAction::Open { match_id, attempt: self.attempt });
    }

    fn schedule_retry(&mut self, now: I, actions: &mut Vec<ConnectionAction>) {
        if self.attempts >= self.config.max_reconnect_attempts {
            self.retry_from = None;
            tracing::warn!(attempts = self.attempts, "max reconnect attempts reached");
            actions.push(ConnectionAction::Report(ConnectionError::ReconnectExhausted {
                attempts: self.attempts,
            }));
            self.set_state(ConnectionState::Failed, actions);
            return;
        }

        self.attempts += 1;
        self.retry_from = Some(now);
        self.set_state(ConnectionState::Reconnecting, actions);
    }

    fn fail_connect(
        &mut self,
        error: ConnectionError,
        now: I,
        actions: &mut Vec<ConnectionAction>,
    ) {
        tracing::warn!(match_id = ?self.match_id, %error, "push channel unavailable");
        self.set_state(ConnectionState::Failed, actions);
        if self.connect_pending {
            self.connect_pending = false;
            actions.push(ConnectionAction::ConnectResolved(Err(error)));
        }

        if self.attempts < self.config.max_reconnect_attempts {
            self.attempts += 1;
            self.retry_from = Some(now);
        }
    }

    fn set_state(&mut self, state: ConnectionState, actions: &mut Vec<ConnectionAction>) {
        if self.state != state {
            self.state = state;
            actions.push(ConnectionAction::StateChanged(state));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn opened(actions: &[ConnectionAction]) -> Option<AttemptId> {
        actions.iter().find_map(|a| match a {
            ConnectionAction::Open { attempt, .. } => Some(*attempt),
            _ => None,
        })
    }

    fn connected(base: Instant) -> Connection {
        let mut conn = Connection::new(ConnectionConfig::default());
        let actions = conn.connect(MatchId::new("M1"), base).unwrap();
        let attempt = opened(&actions).unwrap();
        conn.transport_ready(attempt);
        conn
    }

    #[test]
    fn connect_lifecycle() {
        let base = Instant::now();
        let mut conn: Connection = Connection::new(ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let actions = conn.connect(MatchId::new("M1"), base).unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(matches!(actions.as_slice(), [
            ConnectionAction::StateChanged(ConnectionState::Connecting),
            ConnectionAction::Open { .. }
        ]));

        let attempt = opened(&actions).unwrap();
        let actions = conn.transport_ready(attempt);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(actions.contains(&ConnectionAction::ConnectResolved(Ok(()))));

        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.match_id(), None);
    }

    #[test]
    fn connect_timeout_fails_attempt() {
        let base = Instant::now();
        let mut conn: Connection = Connection::new(ConnectionConfig::default());
        conn.connect(MatchId::new("M1"), base).unwrap();

        assert!(conn.tick(base + t(4)).is_empty());

        let actions = conn.tick(base + t(5));
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert!(actions.iter().any(|a| matches!(a, ConnectionAction::Close { .. })));
        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::ConnectResolved(Err(ConnectionError::ConnectionTimeout { .. }))
        )));

        // Stays Failed through the reconnect delay, then retries.
        assert!(conn.tick(base + t(7)).is_empty());
        let actions = conn.tick(base + t(8));
        assert!(opened(&actions).is_some());
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert_eq!(conn.attempts(), 1);
    }

    #[test]
    fn refused_initial_connect_retries_up_to_cap() {
        let base = Instant::now();
        let mut conn: Connection = Connection::new(ConnectionConfig::default());
        let first = opened(&conn.connect(MatchId::new("M1"), base).unwrap()).unwrap();

        let actions = conn.transport_closed(first, "refused", base);
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::ConnectResolved(Err(ConnectionError::TransportClosed { .. }))
        )));

        let mut opens = 0;
        let mut now = base;
        for _ in 0..120 {
            now += Duration::from_millis(500);
            for action in conn.tick(now) {
                if let ConnectionAction::Open { attempt, .. } = action {
                    opens += 1;
                    conn.transport_closed(attempt, "refused", now);
                }
            }
        }

        assert_eq!(opens, DEFAULT_MAX_RECONNECT_ATTEMPTS);
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[test]
    fn retry_after_initial_failure_can_connect() {
        let base = Instant::now();
        let mut conn: Connection = Connection::new(ConnectionConfig::default());
        let first = opened(&conn.connect(MatchId::new("M1"), base).unwrap()).unwrap();
        conn.transport_closed(first, "refused", base);

        let retry = opened(&conn.tick(base + t(3))).unwrap();
        let actions = conn.transport_ready(retry);

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.attempts(), 0);
        // The caller already got the initial error.
        assert!(!actions.iter().any(|a| matches!(a, ConnectionAction::ConnectResolved(_))));
    }

    #[test]
    fn late_ready_after_timeout_is_ignored() {
        let base = Instant::now();
        let mut conn: Connection = Connection::new(ConnectionConfig::default());
        let attempt = opened(&conn.connect(MatchId::new("M1"), base).unwrap()).unwrap();
        conn.tick(base + t(5));

        assert!(conn.transport_ready(attempt).is_empty());
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[test]
    fn drop_schedules_reconnect_after_delay() {
        let base = Instant::now();
        let mut conn = connected(base);
        let attempt = conn.current_attempt();

        let actions = conn.transport_closed(attempt, "reset", base + t(10));
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert_eq!(conn.attempts(), 1);
        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::Report(ConnectionError::TransportClosed { .. })
        )));

        assert!(conn.tick(base + t(12)).is_empty());
        let actions = conn.tick(base + t(13));
        let retry = opened(&actions).unwrap();
        assert!(retry > attempt);

        conn.transport_ready(retry);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.attempts(), 0);
    }

    #[test]
    fn reconnect_stops_at_cap() {
        let base = Instant::now();
        let mut conn = connected(base);
        conn.transport_closed(conn.current_attempt(), "reset", base);

        let mut opens = 0;
        let mut now = base;
        for _ in 0..200 {
            now += Duration::from_millis(500);
            for action in conn.tick(now) {
                if let ConnectionAction::Open { attempt, .. } = action {
                    opens += 1;
                    conn.transport_closed(attempt, "refused", now);
                }
            }
        }

        assert_eq!(opens, DEFAULT_MAX_RECONNECT_ATTEMPTS);
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[test]
    fn reconnect_attempt_timeout_counts_as_failure() {
        let base = Instant::now();
        let mut conn = connected(base);
        conn.transport_closed(conn.current_attempt(), "reset", base);

        let actions = conn.tick(base + t(3));
        assert!(opened(&actions).is_some());

        let actions = conn.tick(base + t(8));
        assert!(actions.iter().any(|a| matches!(a, ConnectionAction::Close { .. })));
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert_eq!(conn.attempts(), 2);
    }

    #[test]
    fn disconnect_cancels_scheduled_retry() {
        let base = Instant::now();
        let mut conn = connected(base);
        conn.transport_closed(conn.current_attempt(), "reset", base);

        conn.disconnect();
        assert_eq!(conn.attempts(), DEFAULT_MAX_RECONNECT_ATTEMPTS);
        assert!(conn.tick(base + t(30)).is_empty());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let base = Instant::now();
        let mut conn = connected(base);

        let first = conn.disconnect();
        assert!(first.iter().any(|a| matches!(a, ConnectionAction::Close { .. })));
        assert!(conn.disconnect().is_empty());
    }

    #[test]
    fn disconnect_during_connect_resolves_caller() {
        let base = Instant::now();
        let mut conn: Connection = Connection::new(ConnectionConfig::default());
        conn.connect(MatchId::new("M1"), base).unwrap();

        let actions = conn.disconnect();
        assert!(
            actions
                .iter()
                .any(|a| matches!(a, ConnectionAction::ConnectResolved(Err(_))))
        );
    }

    #[test]
    fn connect_while_active_is_rejected() {
        let base = Instant::now();
        let mut conn = connected(base);

        let err = conn.connect(MatchId::new("M2"), base).unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidState { .. }));
    }

    #[test]
    fn malformed_frames_are_dropped_without_state_change() {
        let base = Instant::now();
        let mut conn = connected(base);
        let attempt = conn.current_attempt();

        let actions = conn.handle_message(attempt, "not json");
        assert!(matches!(actions.as_slice(), [ConnectionAction::Report(
            ConnectionError::MalformedUpdate { .. }
        )]));
        assert_eq!(conn.state(), ConnectionState::Connected);

        let actions =
            conn.handle_message(attempt, r#"{"type":"TURNO_CAMBIO","matchId":"M1","payload":"Ana"}"#);
        assert!(matches!(actions.as_slice(), [ConnectionAction::Deliver(_)]));
    }

    #[test]
    fn frames_from_old_transport_are_dropped() {
        let base = Instant::now();
        let mut conn = connected(base);
        let old = conn.current_attempt();
        conn.disconnect();

        let frame = r#"{"type":"TURNO_CAMBIO","matchId":"M1","payload":"Ana"}"#;
        assert!(conn.handle_message(old, frame).is_empty());
    }
}

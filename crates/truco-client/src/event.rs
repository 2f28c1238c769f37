//! Session events and actions.

use std::{sync::Arc, time::Instant};

use truco_core::{
    ConnectionState, HandView, MatchId, MatchSnapshot, connection::AttemptId,
};

use crate::{
    dispatcher::{ActionKind, ActionTicket},
    error::{AuthorityError, ClientError},
};

/// Events the caller feeds into a [`crate::MatchSession`].
///
/// The caller is responsible for:
/// - Executing the I/O requested by [`SessionAction`]s and reporting outcomes
/// - Forwarding push frames tagged with the attempt that produced them
/// - Driving time forward via ticks
///
/// Generic over `I` (Instant type) to support both production and virtual
/// time.
#[derive(Debug, Clone)]
pub enum SessionEvent<I = Instant> {
    /// Start following a match as `player`. Replaces any current subscription.
    Subscribe {
        /// Match to follow.
        match_id: MatchId,
        /// Local player name.
        player: String,
        /// Current time from the environment.
        now: I,
    },

    /// Stop following the current match.
    Unsubscribe,

    /// Push transport `attempt` is ready.
    TransportReady {
        /// Transport tag from [`SessionAction::OpenPush`].
        attempt: AttemptId,
    },

    /// Push transport `attempt` failed to open or closed.
    TransportClosed {
        /// Transport tag from [`SessionAction::OpenPush`].
        attempt: AttemptId,
        /// Close reason.
        reason: String,
        /// Current time from the environment.
        now: I,
    },

    /// Text frame received on push transport `attempt`.
    FrameReceived {
        /// Transport tag from [`SessionAction::OpenPush`].
        attempt: AttemptId,
        /// Raw frame.
        text: String,
    },

    /// Outcome of a [`SessionAction::FetchSnapshot`].
    SnapshotFetched {
        /// Match that was requested.
        match_id: MatchId,
        /// Authority answer.
        result: Result<MatchSnapshot, AuthorityError>,
    },

    /// Outcome of a [`SessionAction::FetchHand`].
    HandFetched {
        /// Match that was requested.
        match_id: MatchId,
        /// Player that was requested.
        player: String,
        /// Authority answer.
        result: Result<HandView, AuthorityError>,
    },

    /// The local player wants to act.
    Submit {
        /// What to do.
        action: ActionKind,
    },

    /// Outcome of a [`SessionAction::Submit`].
    SubmitCompleted {
        /// Ticket from the submit action.
        ticket: ActionTicket,
        /// Authority acknowledgement or failure.
        result: Result<String, AuthorityError>,
    },

    /// Consumer asked for an immediate refresh.
    Refresh,

    /// Time tick for timeouts, reconnect scheduling and polling.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions the session asks the caller to perform or publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a push subscription and report back tagged with `attempt`.
    OpenPush {
        /// Match to subscribe to.
        match_id: MatchId,
        /// Transport tag.
        attempt: AttemptId,
    },

    /// Close the push subscription tagged `attempt`.
    ClosePush {
        /// Transport tag.
        attempt: AttemptId,
    },

    /// Fetch a full snapshot and report [`SessionEvent::SnapshotFetched`].
    FetchSnapshot {
        /// Match to fetch.
        match_id: MatchId,
    },

    /// Fetch the local hand and report [`SessionEvent::HandFetched`].
    FetchHand {
        /// Match to fetch.
        match_id: MatchId,
        /// Local player.
        player: String,
    },

    /// Send an admitted action and report [`SessionEvent::SubmitCompleted`].
    Submit {
        /// Completion ticket.
        ticket: ActionTicket,
        /// Target match.
        match_id: MatchId,
        /// Acting player.
        player: String,
        /// What to do.
        action: ActionKind,
    },

    /// The canonical snapshot changed.
    PublishSnapshot(Arc<MatchSnapshot>),

    /// The local hand changed.
    PublishHand(Arc<HandView>),

    /// Connection state changed.
    ConnectionChanged(ConnectionState),

    /// Outcome of the subscription's initial push connect.
    Subscribed(Result<(), ClientError>),

    /// Outcome of an action, for whoever submitted it.
    ActionCompleted {
        /// Ticket from the submit action.
        ticket: ActionTicket,
        /// Acknowledgement text or typed failure.
        result: Result<String, ClientError>,
    },

    /// A snapshot refresh finished.
    RefreshSettled(Result<(), ClientError>),

    /// The subscription ended; published state is stale.
    Cleared,

    /// Non-fatal failure for logging or indicators.
    Report(ClientError),
}

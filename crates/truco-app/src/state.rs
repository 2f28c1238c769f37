//! Observable session state.
//!
//! [`MatchView`] is the "View Model" consumers render from. The runtime
//! replaces its fields as the session publishes; snapshots and hands are
//! shared, so cloning a view is cheap.

use std::sync::Arc;

use truco_client::ClientError;
use truco_core::{ConnectionState, HandView, MatchId, MatchSnapshot};

/// What a consumer can currently see of the followed match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchView {
    /// Followed match, if any.
    pub match_id: Option<MatchId>,
    /// Push connection state.
    pub connection: ConnectionState,
    /// Fallback polling is running.
    pub polling: bool,
    /// Latest canonical snapshot.
    pub snapshot: Option<Arc<MatchSnapshot>>,
    /// Latest view of the local hand.
    pub hand: Option<Arc<HandView>>,
    /// Most recent non-fatal failure.
    pub last_error: Option<ClientError>,
}

impl MatchView {
    /// Nothing followed.
    pub fn idle() -> Self {
        Self {
            match_id: None,
            connection: ConnectionState::Disconnected,
            polling: false,
            snapshot: None,
            hand: None,
            last_error: None,
        }
    }

    /// Player whose turn it is, per the latest snapshot.
    pub fn turn(&self) -> Option<&str> {
        self.snapshot.as_ref().and_then(|s| s.turn.as_deref())
    }
}

impl Default for MatchView {
    fn default() -> Self {
        Self::idle()
    }
}

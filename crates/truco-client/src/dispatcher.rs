//! Action dispatcher.
//!
//! Gatekeeper for user actions: at most one in-flight action per match, and
//! turn-scoped actions only for the player holding the turn. Rejections happen
//! locally, before any request is built.

use std::{collections::HashMap, fmt};

use truco_core::{BidKind, MatchId};

use crate::error::ClientError;

/// Identifies one submitted action until its completion is reported.
pub type ActionTicket = u64;

/// User actions the authority accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Lay the card at `index` in the player's hand.
    PlayCard {
        /// Position in the hand, zero-based.
        index: usize,
    },
    /// Call a bid.
    CallBid(BidKind),
    /// Accept the pending bid.
    Accept,
    /// Decline the pending bid. Ends the hand.
    Decline,
    /// Go to the deck. Ends the hand.
    Fold,
}

impl ActionKind {
    /// Only the player holding the turn may perform this action.
    pub fn is_turn_scoped(self) -> bool {
        matches!(self, Self::PlayCard { .. } | Self::CallBid(_))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayCard { index } => write!(f, "play card {index}"),
            Self::CallBid(bid) => write!(f, "call {bid}"),
            Self::Accept => f.write_str("accept"),
            Self::Decline => f.write_str("decline"),
            Self::Fold => f.write_str("fold"),
        }
    }
}

/// An action awaiting the authority's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    /// Completion ticket.
    pub ticket: ActionTicket,
    /// Match the action targets.
    pub match_id: MatchId,
    /// Acting player.
    pub player: String,
    /// What was requested.
    pub kind: ActionKind,
}

/// Single-flight and turn gate for user actions.
#[derive(Debug, Default)]
pub struct Dispatcher {
    pending: HashMap<MatchId, PendingAction>,
    next_ticket: ActionTicket,
}

impl Dispatcher {
    /// Create a dispatcher with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an action is in flight for `match_id`.
    pub fn is_busy(&self, match_id: &MatchId) -> bool {
        self.pending.contains_key(match_id)
    }

    /// Admit an action.
    ///
    /// `holds_turn` is the caller's view of whether `player` holds the turn;
    /// it only matters for turn-scoped kinds.
    ///
    /// # Errors
    ///
    /// - `ClientError::ActionBusy` if an action is in flight for the match
    /// - `ClientError::NotYourTurn` for a turn-scoped action out of turn
    pub fn begin(
        &mut self,
        match_id: MatchId,
        player: &str,
        kind: ActionKind,
        holds_turn: bool,
    ) -> Result<PendingAction, ClientError> {
        if self.is_busy(&match_id) {
            return Err(ClientError::ActionBusy);
        }
        if kind.is_turn_scoped() && !holds_turn {
            return Err(ClientError::NotYourTurn { player: player.to_string() });
        }

        self.next_ticket += 1;
        let pending = PendingAction {
            ticket: self.next_ticket,
            match_id: match_id.clone(),
            player: player.to_string(),
            kind,
        };
        self.pending.insert(match_id, pending.clone());

        tracing::debug!(ticket = pending.ticket, %kind, %player, "action admitted");
        Ok(pending)
    }

    /// Release the action behind `ticket`. `None` if it is unknown.
    pub fn complete(&mut self, ticket: ActionTicket) -> Option<PendingAction> {
        let match_id =
            self.pending.iter().find(|(_, p)| p.ticket == ticket).map(|(id, _)| id.clone())?;
        self.pending.remove(&match_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn second_action_is_busy_until_first_completes() {
        let mut dispatcher = Dispatcher::new();
        let m1 = MatchId::new("M1");

        let first = dispatcher.begin(m1.clone(), "Ana", ActionKind::Accept, false).unwrap();
        assert_eq!(
            dispatcher.begin(m1.clone(), "Ana", ActionKind::Fold, false),
            Err(ClientError::ActionBusy)
        );

        dispatcher.complete(first.ticket).unwrap();
        assert!(dispatcher.begin(m1, "Ana", ActionKind::Fold, false).is_ok());
    }

    #[test]
    fn turn_scoped_actions_need_the_turn() {
        let mut dispatcher = Dispatcher::new();
        let m1 = MatchId::new("M1");

        let err = dispatcher
            .begin(m1.clone(), "Ana", ActionKind::PlayCard { index: 0 }, false)
            .unwrap_err();
        assert_eq!(err, ClientError::NotYourTurn { player: "Ana".into() });

        let err =
            dispatcher.begin(m1.clone(), "Ana", ActionKind::CallBid(BidKind::Envido), false);
        assert!(matches!(err, Err(ClientError::NotYourTurn { .. })));
        assert!(!dispatcher.is_busy(&m1));
    }

    #[test]
    fn responses_are_not_turn_gated() {
        let mut dispatcher = Dispatcher::new();
        for (i, kind) in [ActionKind::Accept, ActionKind::Decline, ActionKind::Fold]
            .into_iter()
            .enumerate()
        {
            let match_id = MatchId::new(format!("M{i}"));
            assert!(dispatcher.begin(match_id, "Ana", kind, false).is_ok());
        }
    }

    #[test]
    fn matches_are_independent() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.begin(MatchId::new("M1"), "Ana", ActionKind::Accept, false).unwrap();
        assert!(dispatcher.begin(MatchId::new("M2"), "Ana", ActionKind::Accept, false).is_ok());
    }

    #[test]
    fn unknown_ticket_completes_nothing() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.complete(42).is_none());
    }
}

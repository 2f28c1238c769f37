//! State synchronizer.
//!
//! Folds inbound updates into the canonical [`MatchSnapshot`] for the tracked
//! match. A full snapshot replaces everything; incremental updates are
//! projected onto the last snapshot. Every accepted update produces a brand
//! new `Arc`, so readers holding the previous one never observe a torn state.
//!
//! With no baseline yet, incrementals are queued (bounded) and a refresh is
//! requested. When the fetched baseline lands the queue is replayed onto it.
//! Projections are idempotent, so replaying an update the baseline already
//! reflects changes nothing. A pushed full snapshot supersedes the queue.

use std::{collections::VecDeque, sync::Arc};

use truco_core::{
    BidKind, HandView, InboundUpdate, MatchId, MatchSnapshot, Play, RoundState, UpdateKind,
};

/// Default bound on updates queued while waiting for a baseline.
pub const DEFAULT_MAX_PENDING_UPDATES: usize = 64;

/// Stake a truco call raises the hand to.
const TRUCO_CALLED_VALUE: u32 = 2;

/// Stake an envido call puts on the table.
const ENVIDO_CALLED_VALUE: u32 = 2;

/// Actions returned by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// A new snapshot replaced the previous one.
    Publish(Arc<MatchSnapshot>),

    /// No baseline yet: fetch a full snapshot.
    RequestRefresh,

    /// An accepted push update may have changed the local hand.
    RefreshHand,
}

/// Snapshot/hand pair for one tracked match.
#[derive(Debug)]
pub struct Synchronizer {
    match_id: Option<MatchId>,
    snapshot: Option<Arc<MatchSnapshot>>,
    hand: Option<Arc<HandView>>,
    pending: VecDeque<InboundUpdate>,
    max_pending: usize,
    refresh_requested: bool,
}

impl Synchronizer {
    /// Create an idle synchronizer.
    pub fn new(max_pending: usize) -> Self {
        Self {
            match_id: None,
            snapshot: None,
            hand: None,
            pending: VecDeque::new(),
            max_pending,
            refresh_requested: false,
        }
    }

    /// Start tracking `match_id`, forgetting everything about the previous one.
    pub fn track(&mut self, match_id: MatchId) {
        self.clear();
        self.match_id = Some(match_id);
    }

    /// Stop tracking. Later updates are discarded until [`Self::track`].
    pub fn clear(&mut self) {
        self.match_id = None;
        self.snapshot = None;
        self.hand = None;
        self.pending.clear();
        self.refresh_requested = false;
    }

    /// Match being tracked.
    pub fn match_id(&self) -> Option<&MatchId> {
        self.match_id.as_ref()
    }

    /// Last reconciled snapshot.
    pub fn current_snapshot(&self) -> Option<Arc<MatchSnapshot>> {
        self.snapshot.clone()
    }

    /// Last fetched hand.
    pub fn current_hand(&self) -> Option<Arc<HandView>> {
        self.hand.clone()
    }

    /// Updates waiting for a baseline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether `player` holds the turn.
    ///
    /// The hand's own flag wins when a hand for that player is known; the
    /// snapshot's turn field is the fallback. Unknown means no.
    pub fn is_turn_of(&self, player: &str) -> bool {
        if let Some(hand) = self.hand.as_deref()
            && hand.player.eq_ignore_ascii_case(player)
        {
            return hand.is_my_turn;
        }
        self.snapshot.as_deref().is_some_and(|snapshot| snapshot.is_turn_of(player))
    }

    /// Fold a push update into the tracked match.
    ///
    /// Never fails: updates for another match are discarded, unknown kinds are
    /// accepted as no-ops, and incrementals without a baseline are queued.
    pub fn reconcile(&mut self, update: InboundUpdate) -> Vec<SyncAction> {
        if self.match_id.as_ref() != Some(&update.match_id) {
            tracing::debug!(
                update_match = %update.match_id,
                tracked = ?self.match_id,
                kind = update.kind.name(),
                "discarding update for another match"
            );
            return Vec::new();
        }

        if let UpdateKind::FullSnapshot(snapshot) = update.kind {
            // Pushed after everything queued, so it already reflects the queue.
            self.pending.clear();
            let mut actions = self.install(*snapshot);
            actions.push(SyncAction::RefreshHand);
            return actions;
        }

        if let UpdateKind::Unknown { tag } = &update.kind {
            tracing::debug!(%tag, "ignoring unknown update kind");
            return Vec::new();
        }

        let Some(current) = self.snapshot.clone() else {
            return self.enqueue(update);
        };

        let next = project(&current, &update.kind);
        let snapshot = Arc::new(next);
        self.snapshot = Some(Arc::clone(&snapshot));
        vec![SyncAction::Publish(snapshot), SyncAction::RefreshHand]
    }

    /// Install a snapshot fetched from the authority.
    ///
    /// Same replacement rule as a pushed full snapshot. A snapshot for another
    /// match is discarded.
    pub fn apply_snapshot(&mut self, snapshot: MatchSnapshot) -> Vec<SyncAction> {
        if self.match_id.as_ref() != Some(&snapshot.id) {
            tracing::debug!(snapshot_match = %snapshot.id, "discarding snapshot for another match");
            return Vec::new();
        }
        self.install(snapshot)
    }

    /// Install a hand fetched from the authority.
    ///
    /// Returns the new shared hand, or `None` when no match is tracked.
    pub fn apply_hand(&mut self, hand: HandView) -> Option<Arc<HandView>> {
        self.match_id.as_ref()?;

        if let Some(snapshot) = self.snapshot.as_deref()
            && !hand.agrees_with(snapshot)
        {
            tracing::debug!(player = %hand.player, "hand and snapshot disagree until next refresh");
        }

        let hand = Arc::new(hand);
        self.hand = Some(Arc::clone(&hand));
        Some(hand)
    }

    fn install(&mut self, snapshot: MatchSnapshot) -> Vec<SyncAction> {
        self.refresh_requested = false;

        let mut next = snapshot;
        let queued = self.pending.len();
        for update in self.pending.drain(..) {
            next = project(&next, &update.kind);
        }
        if queued > 0 {
            tracing::debug!(queued, "replayed queued updates onto baseline");
        }

        let snapshot = Arc::new(next);
        self.snapshot = Some(Arc::clone(&snapshot));
        vec![SyncAction::Publish(snapshot)]
    }

    fn enqueue(&mut self, update: InboundUpdate) -> Vec<SyncAction> {
        if self.pending.len() >= self.max_pending {
            // The baseline supersedes whatever falls off the front.
            self.pending.pop_front();
            tracing::warn!(max = self.max_pending, "update queue full, dropping oldest");
        }
        tracing::debug!(kind = update.kind.name(), "queueing update until baseline arrives");
        self.pending.push_back(update);

        if self.refresh_requested {
            return Vec::new();
        }
        self.refresh_requested = true;
        vec![SyncAction::RequestRefresh]
    }
}

/// Project an incremental update onto `current`. Pure and idempotent.
fn project(current: &MatchSnapshot, kind: &UpdateKind) -> MatchSnapshot {
    let mut next = current.clone();

    match kind {
        UpdateKind::FullSnapshot(snapshot) => return (**snapshot).clone(),
        UpdateKind::PlayedCard { player, card } => {
            let already_played = next.played.iter().any(|play| {
                play.player.eq_ignore_ascii_case(player)
                    && play.card.same_face(card)
                    && play.trick == next.trick
                    && play.round == next.round
            });
            if !already_played {
                next.played.push(Play {
                    player: player.clone(),
                    card: card.clone(),
                    trick: next.trick,
                    round: next.round,
                });
            }
        },
        UpdateKind::BidCalled { bid, .. } => {
            next.round_state = RoundState::BidPending;
            match bid {
                BidKind::Truco => {
                    next.truco_called = true;
                    next.truco_value = next.truco_value.max(TRUCO_CALLED_VALUE);
                },
                BidKind::Envido => {
                    next.envido_called = true;
                    next.envido_value = next.envido_value.max(ENVIDO_CALLED_VALUE);
                },
            }
        },
        UpdateKind::TurnChanged { player } => next.turn = Some(player.clone()),
        UpdateKind::ResponseAccepted { .. } => next.round_state = RoundState::AwaitingPlay,
        UpdateKind::ResponseDeclined { .. } | UpdateKind::Folded { .. } => {
            next.round_state = RoundState::Finished;
        },
        UpdateKind::Unknown { .. } => {},
    }

    next
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use truco_core::{Card, Suit};

    use super::*;

    fn snapshot(id: &str, turn: &str) -> MatchSnapshot {
        MatchSnapshot {
            id: MatchId::new(id),
            teams: Vec::new(),
            round: 1,
            trick: 1,
            round_state: RoundState::AwaitingPlay,
            truco_called: false,
            envido_called: false,
            truco_value: 1,
            envido_value: 0,
            played: Vec::new(),
            turn: Some(turn.to_string()),
        }
    }

    fn update(id: &str, kind: UpdateKind) -> InboundUpdate {
        InboundUpdate { match_id: MatchId::new(id), kind }
    }

    fn tracking(id: &str) -> Synchronizer {
        let mut sync = Synchronizer::new(DEFAULT_MAX_PENDING_UPDATES);
        sync.track(MatchId::new(id));
        sync
    }

    #[test]
    fn full_snapshot_replaces_everything() {
        let mut sync = tracking("M1");
        sync.apply_snapshot(snapshot("M1", "Ana"));

        let replacement = snapshot("M1", "Beto");
        let actions = sync.reconcile(InboundUpdate::full_snapshot(replacement.clone()));

        assert_eq!(*sync.current_snapshot().unwrap(), replacement);
        assert!(matches!(actions.as_slice(), [SyncAction::Publish(_), SyncAction::RefreshHand]));
    }

    #[test]
    fn played_card_appends_without_touching_turn() {
        let mut sync = tracking("M1");
        sync.apply_snapshot(snapshot("M1", "Ana"));

        let card = Card::new(Suit::Espada, 1);
        sync.reconcile(update("M1", UpdateKind::PlayedCard {
            player: "Ana".into(),
            card: card.clone(),
        }));

        let current = sync.current_snapshot().unwrap();
        assert_eq!(current.played.len(), 1);
        assert_eq!(current.played[0].card, card);
        assert_eq!(current.turn.as_deref(), Some("Ana"));
    }

    #[test]
    fn played_card_projection_is_idempotent() {
        let mut sync = tracking("M1");
        sync.apply_snapshot(snapshot("M1", "Ana"));

        let played = update("M1", UpdateKind::PlayedCard {
            player: "Ana".into(),
            card: Card::new(Suit::Oro, 7),
        });
        sync.reconcile(played.clone());
        sync.reconcile(played);

        assert_eq!(sync.current_snapshot().unwrap().played.len(), 1);
    }

    #[test]
    fn turn_change_replaces_only_turn() {
        let mut sync = tracking("M1");
        let mut base = snapshot("M1", "Ana");
        base.played.push(Play {
            player: "Ana".into(),
            card: Card::new(Suit::Copa, 3),
            trick: 1,
            round: 1,
        });
        sync.apply_snapshot(base.clone());

        sync.reconcile(update("M1", UpdateKind::TurnChanged { player: "Beto".into() }));

        let current = sync.current_snapshot().unwrap();
        assert_eq!(current.turn.as_deref(), Some("Beto"));
        assert_eq!(current.played, base.played);
        assert_eq!(current.round_state, base.round_state);
    }

    #[test]
    fn bid_and_responses_move_round_state() {
        let mut sync = tracking("M1");
        sync.apply_snapshot(snapshot("M1", "Ana"));

        sync.reconcile(update("M1", UpdateKind::BidCalled {
            bid: BidKind::Truco,
            player: "Ana".into(),
        }));
        let current = sync.current_snapshot().unwrap();
        assert_eq!(current.round_state, RoundState::BidPending);
        assert!(current.truco_called);
        assert_eq!(current.truco_value, 2);

        sync.reconcile(update("M1", UpdateKind::ResponseAccepted { player: "Beto".into() }));
        assert_eq!(sync.current_snapshot().unwrap().round_state, RoundState::AwaitingPlay);

        sync.reconcile(update("M1", UpdateKind::Folded { player: "Beto".into() }));
        assert_eq!(sync.current_snapshot().unwrap().round_state, RoundState::Finished);
    }

    #[test]
    fn other_match_update_is_discarded() {
        let mut sync = tracking("M1");
        sync.apply_snapshot(snapshot("M1", "Ana"));
        let before = sync.current_snapshot().unwrap();

        let actions = sync.reconcile(InboundUpdate::full_snapshot(snapshot("M2", "Beto")));

        assert!(actions.is_empty());
        assert!(Arc::ptr_eq(&before, &sync.current_snapshot().unwrap()));
    }

    #[test]
    fn unknown_kind_is_a_no_op() {
        let mut sync = tracking("M1");
        sync.apply_snapshot(snapshot("M1", "Ana"));
        let before = sync.current_snapshot().unwrap();

        let actions = sync.reconcile(update("M1", UpdateKind::Unknown { tag: "CHAT".into() }));

        assert!(actions.is_empty());
        assert!(Arc::ptr_eq(&before, &sync.current_snapshot().unwrap()));
    }

    #[test]
    fn incrementals_without_baseline_queue_and_request_one_refresh() {
        let mut sync = tracking("M1");

        let first = sync.reconcile(update("M1", UpdateKind::TurnChanged { player: "Beto".into() }));
        let second = sync.reconcile(update("M1", UpdateKind::PlayedCard {
            player: "Ana".into(),
            card: Card::new(Suit::Basto, 4),
        }));

        assert_eq!(first, vec![SyncAction::RequestRefresh]);
        assert!(second.is_empty());
        assert_eq!(sync.pending_len(), 2);
        assert!(sync.current_snapshot().is_none());

        sync.apply_snapshot(snapshot("M1", "Ana"));
        let current = sync.current_snapshot().unwrap();
        assert_eq!(current.turn.as_deref(), Some("Beto"));
        assert_eq!(current.played.len(), 1);
        assert_eq!(sync.pending_len(), 0);
    }

    #[test]
    fn pushed_snapshot_supersedes_queue() {
        let mut sync = tracking("M1");
        sync.reconcile(update("M1", UpdateKind::TurnChanged { player: "Beto".into() }));

        let pushed = snapshot("M1", "Ana");
        sync.reconcile(InboundUpdate::full_snapshot(pushed.clone()));

        assert_eq!(*sync.current_snapshot().unwrap(), pushed);
        assert_eq!(sync.pending_len(), 0);
    }

    #[test]
    fn queue_is_bounded() {
        let mut sync = Synchronizer::new(2);
        sync.track(MatchId::new("M1"));

        for name in ["A", "B", "C"] {
            sync.reconcile(update("M1", UpdateKind::TurnChanged { player: name.into() }));
        }
        assert_eq!(sync.pending_len(), 2);
    }

    #[test]
    fn hand_flag_wins_over_snapshot_turn() {
        let mut sync = tracking("M1");
        sync.apply_snapshot(snapshot("M1", "Ana"));
        assert!(sync.is_turn_of("ana"));

        sync.apply_hand(HandView {
            player: "Ana".into(),
            cards: Vec::new(),
            turn: Some("Beto".into()),
            is_my_turn: false,
            round_state: RoundState::AwaitingPlay,
            played: Vec::new(),
            team1_score: 0,
            team2_score: 0,
        });
        assert!(!sync.is_turn_of("Ana"));
        // Beto has no hand here, so the snapshot decides.
        assert!(!sync.is_turn_of("Beto"));
    }

    #[test]
    fn unknown_turn_is_not_anyones() {
        let sync = tracking("M1");
        assert!(!sync.is_turn_of("Ana"));
    }
}

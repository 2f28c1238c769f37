//! Simulated match authority.
//!
//! Plays a reduced truco: fixed deal, strict turn order, one bid at a time.
//! Every accepted action updates the stored snapshot and pushes the same
//! incremental frames the real authority sends.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use truco_client::{ActionKind, Authority, AuthorityError};
use truco_core::{
    BidKind, Card, CreateMatchRequest, HandView, MatchId, MatchSnapshot, Play, RoundState, Suit,
    Team, TeamSetup,
};

use crate::{frames, sim_transport::SimTransport};

/// Cards dealt to each player.
const HAND_SIZE: usize = 3;

/// Stake of a called bid.
const CALLED_VALUE: u32 = 2;

/// Requests served so far, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Snapshot fetches.
    pub snapshots: usize,
    /// Hand fetches.
    pub hands: usize,
    /// Action submissions, rejected ones included.
    pub submissions: usize,
    /// Match creations.
    pub creations: usize,
}

#[derive(Debug)]
struct SimMatch {
    snapshot: MatchSnapshot,
    /// Turn order, alternating teams.
    seating: Vec<String>,
    /// Hands keyed by lowercase player name.
    hands: HashMap<String, Vec<Card>>,
    /// Team index keyed by lowercase player name.
    team_of: HashMap<String, usize>,
    /// Player whose bid is pending.
    bidder: Option<String>,
}

impl SimMatch {
    fn deal(id: MatchId, teams: &[TeamSetup]) -> Self {
        let mut seating = Vec::new();
        let longest = teams.iter().map(|team| team.players.len()).max().unwrap_or(0);
        for seat in 0..longest {
            for team in teams {
                if let Some(player) = team.players.get(seat) {
                    seating.push(player.clone());
                }
            }
        }

        let mut deck = deck();
        let mut hands = HashMap::new();
        for player in &seating {
            let take = HAND_SIZE.min(deck.len());
            hands.insert(player.to_lowercase(), deck.drain(..take).collect());
        }

        let team_of = teams
            .iter()
            .enumerate()
            .flat_map(|(index, team)| team.players.iter().map(move |p| (p.to_lowercase(), index)))
            .collect();

        let snapshot = MatchSnapshot {
            id,
            teams: teams
                .iter()
                .map(|team| Team { id: None, name: team.name.clone(), score: 0 })
                .collect(),
            round: 1,
            trick: 1,
            round_state: RoundState::AwaitingPlay,
            truco_called: false,
            envido_called: false,
            truco_value: 1,
            envido_value: 0,
            played: Vec::new(),
            turn: seating.first().cloned(),
        };

        Self { snapshot, seating, hands, team_of, bidder: None }
    }

    /// Canonical spelling of `player`, if seated.
    fn seated(&self, player: &str) -> Option<String> {
        self.seating.iter().find(|p| p.eq_ignore_ascii_case(player)).cloned()
    }

    fn next_after(&self, player: &str) -> Option<String> {
        let at = self.seating.iter().position(|p| p.eq_ignore_ascii_case(player))?;
        self.seating.get((at + 1) % self.seating.len()).cloned()
    }

    fn require_turn(&self, player: &str) -> Result<(), AuthorityError> {
        if self.snapshot.is_turn_of(player) {
            Ok(())
        } else {
            Err(rejected(400, "No es tu turno"))
        }
    }

    fn hand_view(&self, player: &str) -> HandView {
        HandView {
            player: player.to_string(),
            cards: self.hands.get(&player.to_lowercase()).cloned().unwrap_or_default(),
            turn: self.snapshot.turn.clone(),
            is_my_turn: self.snapshot.is_turn_of(player),
            round_state: self.snapshot.round_state,
            played: self.snapshot.played.clone(),
            team1_score: self.snapshot.team_score(0),
            team2_score: self.snapshot.team_score(1),
        }
    }

    fn award(&mut self, player: &str, points: u32, to_opponents: bool) {
        let Some(&team) = self.team_of.get(&player.to_lowercase()) else {
            return;
        };
        let team = if to_opponents { (team + 1) % self.snapshot.teams.len().max(1) } else { team };
        if let Some(team) = self.snapshot.teams.get_mut(team) {
            team.score += points;
        }
    }

    /// Apply `action` by `player`. Returns the acknowledgement and the frames
    /// to push.
    fn apply(
        &mut self,
        player: &str,
        action: ActionKind,
    ) -> Result<(String, Vec<String>), AuthorityError> {
        let id = self.snapshot.id.clone();
        let player = self.seated(player).ok_or_else(|| rejected(404, "Jugador no encontrado"))?;
        if self.snapshot.round_state == RoundState::Finished {
            return Err(rejected(409, "La ronda terminó"));
        }

        match action {
            ActionKind::PlayCard { index } => {
                self.require_turn(&player)?;
                if self.snapshot.round_state != RoundState::AwaitingPlay {
                    return Err(rejected(409, "Hay un canto pendiente"));
                }
                let hand = self.hands.entry(player.to_lowercase()).or_default();
                if index >= hand.len() {
                    return Err(rejected(400, "Carta inválida"));
                }
                let card = hand.remove(index);
                self.snapshot.played.push(Play {
                    player: player.clone(),
                    card: card.clone(),
                    trick: self.snapshot.trick,
                    round: self.snapshot.round,
                });
                if self.snapshot.played.len() % self.seating.len() == 0 {
                    self.snapshot.trick += 1;
                }
                let next = self.next_after(&player).unwrap_or_else(|| player.clone());
                self.snapshot.turn = Some(next.clone());
                Ok(("Carta jugada".to_string(), vec![
                    frames::played_card(&id, &player, &card),
                    frames::turn_changed(&id, &next),
                ]))
            },
            ActionKind::CallBid(bid) => {
                self.require_turn(&player)?;
                if self.snapshot.round_state != RoundState::AwaitingPlay {
                    return Err(rejected(409, "Ya hay un canto pendiente"));
                }
                match bid {
                    BidKind::Truco => {
                        self.snapshot.truco_called = true;
                        self.snapshot.truco_value = self.snapshot.truco_value.max(CALLED_VALUE);
                    },
                    BidKind::Envido => {
                        self.snapshot.envido_called = true;
                        self.snapshot.envido_value = self.snapshot.envido_value.max(CALLED_VALUE);
                    },
                }
                self.snapshot.round_state = RoundState::BidPending;
                self.bidder = Some(player.clone());
                let next = self.next_after(&player).unwrap_or_else(|| player.clone());
                self.snapshot.turn = Some(next.clone());
                Ok((format!("{} cantado", bid_label(bid)), vec![
                    frames::bid_called(&id, bid, &player),
                    frames::turn_changed(&id, &next),
                ]))
            },
            ActionKind::Accept | ActionKind::Decline => {
                let bidder = self.pending_bidder(&player)?;
                if action == ActionKind::Accept {
                    self.snapshot.round_state = RoundState::AwaitingPlay;
                    self.snapshot.turn = Some(bidder.clone());
                    Ok(("Quiero".to_string(), vec![
                        frames::accepted(&id, &player),
                        frames::turn_changed(&id, &bidder),
                    ]))
                } else {
                    self.snapshot.round_state = RoundState::Finished;
                    self.award(&bidder, 1, false);
                    Ok(("No quiero".to_string(), vec![frames::declined(&id, &player)]))
                }
            },
            ActionKind::Fold => {
                self.snapshot.round_state = RoundState::Finished;
                self.bidder = None;
                let stake = self.snapshot.truco_value.max(1);
                self.award(&player, stake, true);
                Ok(("Al mazo".to_string(), vec![frames::folded(&id, &player)]))
            },
        }
    }

    fn pending_bidder(&mut self, responder: &str) -> Result<String, AuthorityError> {
        if self.snapshot.round_state != RoundState::BidPending {
            return Err(rejected(409, "No hay canto pendiente"));
        }
        let bidder = self.bidder.clone().ok_or_else(|| rejected(409, "No hay canto pendiente"))?;
        if bidder.eq_ignore_ascii_case(responder) {
            return Err(rejected(400, "No podés responder tu propio canto"));
        }
        self.bidder = None;
        Ok(bidder)
    }
}

fn rejected(status: u16, message: &str) -> AuthorityError {
    AuthorityError::Rejected { status, message: message.to_string() }
}

fn bid_label(bid: BidKind) -> &'static str {
    match bid {
        BidKind::Truco => "Truco",
        BidKind::Envido => "Envido",
    }
}

/// Spanish deck in a fixed order.
fn deck() -> Vec<Card> {
    const VALUES: [u8; 10] = [1, 2, 3, 4, 5, 6, 7, 10, 11, 12];
    let suits = [Suit::Espada, Suit::Basto, Suit::Oro, Suit::Copa];
    VALUES
        .iter()
        .flat_map(|&value| suits.iter().map(move |&suit| Card::new(suit, value)))
        .collect()
}

#[derive(Debug, Default)]
struct World {
    matches: HashMap<MatchId, SimMatch>,
    next_id: u64,
    calls: CallCounts,
    unavailable: bool,
}

/// In-memory authority.
///
/// Clones share the same matches. Attach a [`SimTransport`] to have accepted
/// actions pushed to subscribers.
#[derive(Debug, Clone, Default)]
pub struct SimAuthority {
    world: Arc<Mutex<World>>,
    transport: Option<SimTransport>,
    latency: Duration,
}

impl SimAuthority {
    /// Authority without push and without latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push accepted actions through `transport`.
    #[must_use]
    pub fn with_transport(mut self, transport: SimTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Delay every answer by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seat `teams` in a new match `match_id`, replacing any match with that
    /// id. The first player of the first team opens.
    pub fn add_match(&self, match_id: impl Into<MatchId>, teams: Vec<TeamSetup>) -> MatchId {
        let id = match_id.into();
        self.world().matches.insert(id.clone(), SimMatch::deal(id.clone(), &teams));
        id
    }

    /// Current snapshot of `match_id`.
    pub fn snapshot(&self, match_id: &MatchId) -> Option<MatchSnapshot> {
        self.world().matches.get(match_id).map(|m| m.snapshot.clone())
    }

    /// Cards `player` still holds.
    pub fn hand_of(&self, match_id: &MatchId, player: &str) -> Option<Vec<Card>> {
        self.world().matches.get(match_id)?.hands.get(&player.to_lowercase()).cloned()
    }

    /// Hand `turn` to `player` without pushing anything.
    pub fn set_turn(&self, match_id: &MatchId, player: &str) {
        if let Some(m) = self.world().matches.get_mut(match_id) {
            m.snapshot.turn = Some(player.to_string());
        }
    }

    /// Fail every request as unreachable (`true`) or serve again (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.world().unavailable = unavailable;
    }

    /// Requests served so far.
    pub fn calls(&self) -> CallCounts {
        self.world().calls
    }

    /// Push the current snapshot of `match_id` as a full update.
    pub fn publish_snapshot(&self, match_id: &MatchId) {
        if let Some(snapshot) = self.snapshot(match_id) {
            self.push(match_id, vec![frames::full_snapshot(&snapshot)]);
        }
    }

    fn push(&self, match_id: &MatchId, frames: Vec<String>) {
        let Some(transport) = &self.transport else {
            return;
        };
        for frame in frames {
            transport.broadcast(match_id, frame);
        }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn serve<T>(
        &self,
        count: impl FnOnce(&mut CallCounts),
        answer: impl FnOnce(&mut World) -> Result<T, AuthorityError>,
    ) -> Result<T, AuthorityError> {
        let mut world = self.world();
        count(&mut world.calls);
        if world.unavailable {
            return Err(AuthorityError::Unavailable { reason: "connection refused".to_string() });
        }
        answer(&mut world)
    }
}

fn find<'a>(world: &'a mut World, match_id: &MatchId) -> Result<&'a mut SimMatch, AuthorityError> {
    world.matches.get_mut(match_id).ok_or_else(|| rejected(404, "Partida no encontrada"))
}

impl Authority for SimAuthority {
    async fn fetch_snapshot(&self, match_id: MatchId) -> Result<MatchSnapshot, AuthorityError> {
        self.delay().await;
        self.serve(
            |calls| calls.snapshots += 1,
            |world| Ok(find(world, &match_id)?.snapshot.clone()),
        )
    }

    async fn fetch_hand(
        &self,
        match_id: MatchId,
        player: String,
    ) -> Result<HandView, AuthorityError> {
        self.delay().await;
        self.serve(|calls| calls.hands += 1, |world| {
            let game = find(world, &match_id)?;
            let seated =
                game.seated(&player).ok_or_else(|| rejected(404, "Jugador no encontrado"))?;
            Ok(game.hand_view(&seated))
        })
    }

    async fn submit(
        &self,
        match_id: MatchId,
        player: String,
        action: ActionKind,
    ) -> Result<String, AuthorityError> {
        self.delay().await;
        let (ack, frames) = self.serve(
            |calls| calls.submissions += 1,
            |world| find(world, &match_id)?.apply(&player, action),
        )?;
        tracing::debug!(%match_id, %player, %action, "sim authority accepted action");
        self.push(&match_id, frames);
        Ok(ack)
    }

    async fn create_match(&self, request: CreateMatchRequest) -> Result<MatchId, AuthorityError> {
        self.delay().await;
        request
            .validate()
            .map_err(|reason| AuthorityError::Rejected { status: 400, message: reason })?;
        let teams = if request.random_teams {
            // Deterministic "draw": alternate seats.
            let (north, south): (Vec<_>, Vec<_>) =
                request.players.iter().enumerate().partition(|(i, _)| i % 2 == 0);
            vec![
                TeamSetup {
                    name: "Equipo 1".to_string(),
                    players: north.into_iter().map(|(_, p)| p.clone()).collect(),
                },
                TeamSetup {
                    name: "Equipo 2".to_string(),
                    players: south.into_iter().map(|(_, p)| p.clone()).collect(),
                },
            ]
        } else {
            request.teams.clone()
        };

        self.serve(|calls| calls.creations += 1, |world| {
            world.next_id += 1;
            let id = request
                .match_id
                .clone()
                .unwrap_or_else(|| MatchId::new(format!("sim-{}", world.next_id)));
            world.matches.insert(id.clone(), SimMatch::deal(id.clone(), &teams));
            Ok(id)
        })
    }
}

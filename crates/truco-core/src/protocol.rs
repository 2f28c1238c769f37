//! Wire types shared with the remote authority.
//!
//! Field names follow the authority's JSON contract (camelCase Spanish keys
//! such as `turnoActual` or `cartasJugadas`); the Rust side uses English names.
//! Push frames arrive as `{type, payload, matchId}` text messages and are
//! turned into [`InboundUpdate`] values by [`InboundUpdate::parse`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Opaque identifier naming a match. Scopes every other entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MatchId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Card suit of the Spanish deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Suit {
    /// Espada.
    Espada,
    /// Basto.
    Basto,
    /// Oro.
    Oro,
    /// Copa.
    Copa,
}

/// A single card.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Authority-side identifier, absent for cards built in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Suit.
    #[serde(rename = "palo")]
    pub suit: Suit,
    /// Face value (1-12, no 8 or 9 in truco).
    #[serde(rename = "valor")]
    pub value: u8,
}

impl Card {
    /// Card without an authority identifier.
    pub fn new(suit: Suit, value: u8) -> Self {
        Self { id: None, suit, value }
    }

    /// Same suit and value, ignoring the authority identifier.
    pub fn same_face(&self, other: &Card) -> bool {
        self.suit == other.suit && self.value == other.value
    }
}

/// A card laid on the table by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play {
    /// Name of the acting player.
    #[serde(rename = "jugadorNombre")]
    pub player: String,
    /// Card played.
    #[serde(rename = "carta")]
    pub card: Card,
    /// Trick (vuelta) the card belongs to.
    #[serde(rename = "numeroVuelta", default)]
    pub trick: u32,
    /// Round (ronda) the card belongs to.
    #[serde(rename = "numeroRonda", default)]
    pub round: u32,
}

/// Team as reported inside a match snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Authority-side identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Team name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Accumulated score.
    #[serde(rename = "puntaje", default)]
    pub score: u32,
}

/// Phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundState {
    /// Waiting for the player in turn to lay a card.
    #[serde(rename = "ESPERANDO_JUGADA", alias = "EN_CURSO")]
    AwaitingPlay,
    /// A bid was called and has not been answered yet.
    #[serde(rename = "TRUCO_CANTADO", alias = "ENVIDO_CANTADO")]
    BidPending,
    /// A bid was accepted and its resolution is pending on the authority.
    #[serde(rename = "RESPUESTA_PENDIENTE")]
    ResponsePending,
    /// The round is over.
    #[serde(rename = "TERMINADA", alias = "FINALIZADA")]
    Finished,
}

/// Bid kinds a player may call on their turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidKind {
    /// Truco: raises the stake of the hand.
    Truco,
    /// Envido: side bet on the best two-card combination.
    Envido,
}

impl BidKind {
    /// Path segment used by the authority (`/cantar/{segment}`).
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Truco => "truco",
            Self::Envido => "envido",
        }
    }
}

impl fmt::Display for BidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Canonical reconciled view of a match.
///
/// Held behind an `Arc` by the synchronizer and replaced wholesale on every
/// accepted update, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Match this snapshot belongs to.
    pub id: MatchId,
    /// Teams with their scores.
    #[serde(rename = "equipos", default)]
    pub teams: Vec<Team>,
    /// Round counter.
    #[serde(rename = "ronda", default)]
    pub round: u32,
    /// Trick counter inside the round.
    #[serde(rename = "vuelta", default)]
    pub trick: u32,
    /// Phase of the round.
    #[serde(rename = "estadoRonda")]
    pub round_state: RoundState,
    /// Truco has been called this round.
    #[serde(rename = "trucoCantado", default)]
    pub truco_called: bool,
    /// Envido has been called this round.
    #[serde(rename = "envidoCantado", default)]
    pub envido_called: bool,
    /// Current truco stake.
    #[serde(rename = "valorTruco", default)]
    pub truco_value: u32,
    /// Current envido stake.
    #[serde(rename = "valorEnvido", default)]
    pub envido_value: u32,
    /// Cards on the table for the current trick.
    #[serde(rename = "cartasJugadas", default)]
    pub played: Vec<Play>,
    /// Player whose turn it is.
    #[serde(rename = "turnoActual", default)]
    pub turn: Option<String>,
}

impl MatchSnapshot {
    /// Whether `player` holds the turn. Names compare case-insensitively, as
    /// the authority does.
    pub fn is_turn_of(&self, player: &str) -> bool {
        self.turn.as_deref().is_some_and(|turn| turn.eq_ignore_ascii_case(player))
    }

    /// Score of the team at `index`, zero when the team is unknown.
    pub fn team_score(&self, index: usize) -> u32 {
        self.teams.get(index).map_or(0, |team| team.score)
    }
}

/// The local player's private projection of a match.
///
/// Derived, never authoritative: only a hand request to the authority can
/// rebuild it because other players' cards are withheld from push messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandView {
    /// Player owning this hand.
    #[serde(rename = "jugador")]
    pub player: String,
    /// Cards still in hand.
    #[serde(rename = "cartas", default)]
    pub cards: Vec<Card>,
    /// Player whose turn it is.
    #[serde(rename = "turnoActual", default)]
    pub turn: Option<String>,
    /// Whether it is this player's turn.
    #[serde(rename = "esMiTurno", default)]
    pub is_my_turn: bool,
    /// Phase of the round.
    #[serde(rename = "estadoRonda")]
    pub round_state: RoundState,
    /// Cards on the table for the current trick.
    #[serde(rename = "cartasJugadas", default)]
    pub played: Vec<Play>,
    /// Score of the first team.
    #[serde(rename = "puntosEquipo1", default)]
    pub team1_score: u32,
    /// Score of the second team.
    #[serde(rename = "puntosEquipo2", default)]
    pub team2_score: u32,
}

impl HandView {
    /// Turn indicator and round state agree with `snapshot`.
    pub fn agrees_with(&self, snapshot: &MatchSnapshot) -> bool {
        let same_turn = match (&self.turn, &snapshot.turn) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        };
        same_turn && self.round_state == snapshot.round_state
    }
}

/// Team composition for an explicitly arranged match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSetup {
    /// Team name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Players in seating order.
    #[serde(rename = "jugadores")]
    pub players: Vec<String>,
}

/// Body of a match creation request.
///
/// Either lists the teams explicitly or hands the authority a flat player list
/// to split at random.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMatchRequest {
    /// Identifier to use instead of an authority-assigned one.
    #[serde(rename = "matchId", default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
    /// Let the authority split `players` into two teams.
    #[serde(rename = "equiposAleatorios")]
    pub random_teams: bool,
    /// Players to split, when `random_teams` is set.
    #[serde(rename = "jugadores", default, skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<String>,
    /// Explicit teams, when `random_teams` is not set.
    #[serde(rename = "equipos", default, skip_serializing_if = "Vec::is_empty")]
    pub teams: Vec<TeamSetup>,
}

impl CreateMatchRequest {
    /// Match with explicitly arranged teams.
    pub fn with_teams(teams: Vec<TeamSetup>) -> Self {
        Self { match_id: None, random_teams: false, players: Vec::new(), teams }
    }

    /// Match whose teams the authority draws from `players`.
    pub fn random(players: Vec<String>) -> Self {
        Self { match_id: None, random_teams: true, players, teams: Vec::new() }
    }

    /// Request a specific match identifier.
    #[must_use]
    pub fn with_match_id(mut self, match_id: MatchId) -> Self {
        self.match_id = Some(match_id);
        self
    }

    /// Check the request before it leaves the process.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when random teams are requested
    /// with an odd or empty player list, or when explicit teams are missing or
    /// empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.random_teams {
            if self.players.is_empty() {
                return Err("random teams need at least two players".to_string());
            }
            if self.players.len() % 2 != 0 {
                return Err(format!(
                    "random teams need an even number of players, got {}",
                    self.players.len()
                ));
            }
            return Ok(());
        }

        if self.teams.len() < 2 {
            return Err(format!("a match needs two teams, got {}", self.teams.len()));
        }
        if let Some(team) = self.teams.iter().find(|team| team.players.is_empty()) {
            return Err(format!("team {} has no players", team.name));
        }
        Ok(())
    }
}

/// Decoded body of an inbound push frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// Complete replacement of the match view.
    FullSnapshot(Box<MatchSnapshot>),
    /// A player laid a card on the table.
    PlayedCard {
        /// Acting player.
        player: String,
        /// Card played.
        card: Card,
    },
    /// A player called a bid.
    BidCalled {
        /// Kind of bid.
        bid: BidKind,
        /// Calling player.
        player: String,
    },
    /// Turn moved to another player.
    TurnChanged {
        /// Player now in turn.
        player: String,
    },
    /// The pending bid was accepted.
    ResponseAccepted {
        /// Responding player.
        player: String,
    },
    /// The pending bid was declined.
    ResponseDeclined {
        /// Responding player.
        player: String,
    },
    /// A player folded (went to the deck).
    Folded {
        /// Folding player.
        player: String,
    },
    /// A frame type this client does not know. Accepted as a no-op.
    Unknown {
        /// Raw `type` tag.
        tag: String,
    },
}

impl UpdateKind {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FullSnapshot(_) => "full-snapshot",
            Self::PlayedCard { .. } => "played-card",
            Self::BidCalled { .. } => "bid-called",
            Self::TurnChanged { .. } => "turn-changed",
            Self::ResponseAccepted { .. } => "response-accepted",
            Self::ResponseDeclined { .. } => "response-declined",
            Self::Folded { .. } => "folded",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// A parsed push frame scoped to a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    /// Match the frame refers to.
    pub match_id: MatchId,
    /// Decoded body.
    pub kind: UpdateKind,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "matchId", alias = "partidaId")]
    match_id: MatchId,
}

#[derive(Deserialize)]
struct PlayedCardPayload {
    #[serde(rename = "jugador", alias = "jugadorNombre")]
    player: String,
    #[serde(rename = "carta")]
    card: Card,
}

impl InboundUpdate {
    /// Full-snapshot update for `snapshot`'s match.
    pub fn full_snapshot(snapshot: MatchSnapshot) -> Self {
        Self { match_id: snapshot.id.clone(), kind: UpdateKind::FullSnapshot(Box::new(snapshot)) }
    }

    /// Decode a push text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Json` if the text is not a JSON frame object
    /// - `ProtocolError::Malformed` if the payload does not match its type tag
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let kind = decode_kind(&raw.tag, raw.payload)?;
        Ok(Self { match_id: raw.match_id, kind })
    }
}

fn decode_kind(tag: &str, payload: Value) -> Result<UpdateKind, ProtocolError> {
    let malformed = |err: serde_json::Error| ProtocolError::Malformed {
        tag: tag.to_string(),
        reason: err.to_string(),
    };

    let kind = match tag {
        "PARTIDA_UPDATE" => {
            let snapshot: MatchSnapshot = serde_json::from_value(payload).map_err(malformed)?;
            UpdateKind::FullSnapshot(Box::new(snapshot))
        },
        "CARTA_JUGADA" => {
            let played: PlayedCardPayload = serde_json::from_value(payload).map_err(malformed)?;
            UpdateKind::PlayedCard { player: played.player, card: played.card }
        },
        "TRUCO_CANTADO" => UpdateKind::BidCalled {
            bid: BidKind::Truco,
            player: player_name(tag, payload)?,
        },
        "ENVIDO_CANTADO" => UpdateKind::BidCalled {
            bid: BidKind::Envido,
            player: player_name(tag, payload)?,
        },
        "TURNO_CAMBIO" => UpdateKind::TurnChanged { player: player_name(tag, payload)? },
        "QUISO" => UpdateKind::ResponseAccepted { player: player_name(tag, payload)? },
        "NO_QUISO" => UpdateKind::ResponseDeclined { player: player_name(tag, payload)? },
        "AL_MAZO" => UpdateKind::Folded { player: player_name(tag, payload)? },
        other => UpdateKind::Unknown { tag: other.to_string() },
    };

    Ok(kind)
}

fn player_name(tag: &str, payload: Value) -> Result<String, ProtocolError> {
    match payload {
        Value::String(name) if !name.is_empty() => Ok(name),
        other => Err(ProtocolError::Malformed {
            tag: tag.to_string(),
            reason: format!("expected player name, got {other}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "id": "M1",
        "equipos": [{"nombre": "Norte", "puntaje": 3}, {"nombre": "Sur", "puntaje": 5}],
        "ronda": 2,
        "vuelta": 1,
        "estadoRonda": "ESPERANDO_JUGADA",
        "trucoCantado": false,
        "envidoCantado": false,
        "valorTruco": 1,
        "valorEnvido": 0,
        "cartasJugadas": [],
        "turnoActual": "Ana"
    }"#;

    #[test]
    fn parses_full_snapshot_frame() {
        let text = format!(r#"{{"type":"PARTIDA_UPDATE","matchId":"M1","payload":{SNAPSHOT}}}"#);
        let update = InboundUpdate::parse(&text).unwrap();

        assert_eq!(update.match_id, MatchId::new("M1"));
        let UpdateKind::FullSnapshot(snapshot) = update.kind else {
            panic!("expected full snapshot");
        };
        assert_eq!(snapshot.turn.as_deref(), Some("Ana"));
        assert_eq!(snapshot.team_score(1), 5);
        assert_eq!(snapshot.round_state, RoundState::AwaitingPlay);
    }

    #[test]
    fn parses_played_card_frame_with_authority_keys() {
        let text = r#"{"type":"CARTA_JUGADA","partidaId":"M1",
            "payload":{"jugador":"Ana","carta":{"id":7,"palo":"ESPADA","valor":1}}}"#;
        let update = InboundUpdate::parse(text).unwrap();

        assert_eq!(update.kind, UpdateKind::PlayedCard {
            player: "Ana".into(),
            card: Card { id: Some(7), suit: Suit::Espada, value: 1 },
        });
    }

    #[test]
    fn bid_tags_map_to_bid_kinds() {
        let truco = InboundUpdate::parse(r#"{"type":"TRUCO_CANTADO","matchId":"M1","payload":"Ana"}"#)
            .unwrap();
        let envido =
            InboundUpdate::parse(r#"{"type":"ENVIDO_CANTADO","matchId":"M1","payload":"Beto"}"#)
                .unwrap();

        assert_eq!(truco.kind, UpdateKind::BidCalled { bid: BidKind::Truco, player: "Ana".into() });
        assert_eq!(envido.kind, UpdateKind::BidCalled {
            bid: BidKind::Envido,
            player: "Beto".into()
        });
    }

    #[test]
    fn unknown_tag_is_accepted() {
        let update =
            InboundUpdate::parse(r#"{"type":"CHAT","matchId":"M1","payload":{"x":1}}"#).unwrap();
        assert_eq!(update.kind, UpdateKind::Unknown { tag: "CHAT".into() });
    }

    #[test]
    fn payload_mismatch_is_malformed() {
        let err = InboundUpdate::parse(r#"{"type":"TURNO_CAMBIO","matchId":"M1","payload":42}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { ref tag, .. } if tag == "TURNO_CAMBIO"));

        let err = InboundUpdate::parse(r#"{"type":"CARTA_JUGADA","matchId":"M1","payload":"Ana"}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn missing_match_id_is_rejected() {
        let err = InboundUpdate::parse(r#"{"type":"QUISO","payload":"Ana"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn hand_agreement_ignores_name_case() {
        let snapshot: MatchSnapshot = serde_json::from_str(SNAPSHOT).unwrap();
        let hand: HandView = serde_json::from_str(
            r#"{"jugador":"ana","cartas":[],"turnoActual":"ANA","esMiTurno":true,
                "estadoRonda":"ESPERANDO_JUGADA","cartasJugadas":[],
                "puntosEquipo1":3,"puntosEquipo2":5}"#,
        )
        .unwrap();

        assert!(hand.agrees_with(&snapshot));
        assert!(snapshot.is_turn_of("ANA"));
    }

    #[test]
    fn odd_random_roster_is_rejected() {
        let request = CreateMatchRequest::random(vec!["Ana".into(), "Beto".into(), "Caro".into()]);
        assert!(request.validate().is_err());

        let request = CreateMatchRequest::random(vec!["Ana".into(), "Beto".into()]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn explicit_teams_serialize_with_authority_keys() {
        let request = CreateMatchRequest::with_teams(vec![
            TeamSetup { name: "Norte".into(), players: vec!["Ana".into()] },
            TeamSetup { name: "Sur".into(), players: vec!["Beto".into()] },
        ]);
        assert!(request.validate().is_ok());

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["equiposAleatorios"], false);
        assert_eq!(json["equipos"][1]["jugadores"][0], "Beto");
        assert!(json.get("jugadores").is_none());
    }

    #[test]
    fn envido_state_reads_as_bid_pending() {
        let state: RoundState = serde_json::from_str(r#""ENVIDO_CANTADO""#).unwrap();
        assert_eq!(state, RoundState::BidPending);

        let state: RoundState = serde_json::from_str(r#""EN_CURSO""#).unwrap();
        assert_eq!(state, RoundState::AwaitingPlay);
    }
}

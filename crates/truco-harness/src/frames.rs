//! Push frame builders.
//!
//! Frames are JSON objects `{"type", "matchId", "payload"}` exactly as the
//! authority sends them over its WebSocket.

use serde_json::{Value, json};
use truco_core::{BidKind, Card, MatchId, MatchSnapshot};

fn frame(tag: &str, match_id: &MatchId, payload: Value) -> String {
    json!({ "type": tag, "matchId": match_id, "payload": payload }).to_string()
}

/// `PARTIDA_UPDATE` carrying `snapshot`.
pub fn full_snapshot(snapshot: &MatchSnapshot) -> String {
    let payload = serde_json::to_value(snapshot).unwrap_or(Value::Null);
    frame("PARTIDA_UPDATE", &snapshot.id, payload)
}

/// `CARTA_JUGADA` for `player` laying `card`.
pub fn played_card(match_id: &MatchId, player: &str, card: &Card) -> String {
    let card = serde_json::to_value(card).unwrap_or(Value::Null);
    frame("CARTA_JUGADA", match_id, json!({ "jugador": player, "carta": card }))
}

/// `TRUCO_CANTADO` or `ENVIDO_CANTADO` called by `player`.
pub fn bid_called(match_id: &MatchId, bid: BidKind, player: &str) -> String {
    let tag = match bid {
        BidKind::Truco => "TRUCO_CANTADO",
        BidKind::Envido => "ENVIDO_CANTADO",
    };
    frame(tag, match_id, json!(player))
}

/// `TURNO_CAMBIO` to `player`.
pub fn turn_changed(match_id: &MatchId, player: &str) -> String {
    frame("TURNO_CAMBIO", match_id, json!(player))
}

/// `QUISO` by `player`.
pub fn accepted(match_id: &MatchId, player: &str) -> String {
    frame("QUISO", match_id, json!(player))
}

/// `NO_QUISO` by `player`.
pub fn declined(match_id: &MatchId, player: &str) -> String {
    frame("NO_QUISO", match_id, json!(player))
}

/// `AL_MAZO` by `player`.
pub fn folded(match_id: &MatchId, player: &str) -> String {
    frame("AL_MAZO", match_id, json!(player))
}

/// A frame with an arbitrary `tag`, for unknown-kind handling.
pub fn custom(match_id: &MatchId, tag: &str, payload: Value) -> String {
    frame(tag, match_id, payload)
}

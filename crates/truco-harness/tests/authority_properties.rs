//! Property-based tests for the simulated authority.
//!
//! Whatever sequence of actions players attempt, cards are only ever moved
//! from a hand to the table, and the turn always names a seated player.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use truco_client::{ActionKind, Authority};
use truco_core::{BidKind, MatchId, TeamSetup};
use truco_harness::SimAuthority;

const PLAYERS: [&str; 4] = ["Ana", "Beto", "Caro", "Dani"];

fn action_strategy() -> impl Strategy<Value = ActionKind> {
    prop_oneof![
        4 => (0usize..4).prop_map(|index| ActionKind::PlayCard { index }),
        1 => Just(ActionKind::CallBid(BidKind::Truco)),
        1 => Just(ActionKind::CallBid(BidKind::Envido)),
        1 => Just(ActionKind::Accept),
        1 => Just(ActionKind::Decline),
        1 => Just(ActionKind::Fold),
    ]
}

fn cards_in_play(authority: &SimAuthority, id: &MatchId) -> usize {
    let held: usize =
        PLAYERS.iter().map(|p| authority.hand_of(id, p).map_or(0, |hand| hand.len())).sum();
    held + authority.snapshot(id).unwrap().played.len()
}

proptest! {
    #[test]
    fn prop_cards_are_conserved(
        moves in prop::collection::vec((0usize..4, action_strategy()), 0..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let authority = SimAuthority::new();
        let id = authority.add_match("M1", vec![
            TeamSetup { name: "Norte".into(), players: vec!["Ana".into(), "Caro".into()] },
            TeamSetup { name: "Sur".into(), players: vec!["Beto".into(), "Dani".into()] },
        ]);
        let dealt = cards_in_play(&authority, &id);

        for (seat, action) in moves {
            let player = PLAYERS[seat].to_string();
            let _ = runtime.block_on(authority.submit(id.clone(), player, action));

            prop_assert_eq!(cards_in_play(&authority, &id), dealt);
            let snapshot = authority.snapshot(&id).unwrap();
            let turn = snapshot.turn.unwrap();
            prop_assert!(PLAYERS.iter().any(|p| p.eq_ignore_ascii_case(&turn)));
        }
    }
}

//! Property-based tests for the connection state machine.
//!
//! Drives the machine with arbitrary interleavings of transport events and
//! clock advances and checks the retry budget and disconnect guarantees.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use truco_core::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, MatchId,
    connection::DEFAULT_MAX_RECONNECT_ATTEMPTS,
};

#[derive(Debug, Clone)]
enum Step {
    Advance(u64),
    Ready,
    Close,
    StaleReady,
    Disconnect,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (100u64..4_000).prop_map(Step::Advance),
        2 => Just(Step::Ready),
        3 => Just(Step::Close),
        1 => Just(Step::StaleReady),
        1 => Just(Step::Disconnect),
    ]
}

fn count_opens(actions: &[ConnectionAction]) -> u32 {
    actions.iter().filter(|a| matches!(a, ConnectionAction::Open { .. })).count() as u32
}

proptest! {
    #[test]
    fn prop_attempts_never_exceed_cap(steps in prop::collection::vec(step_strategy(), 0..80)) {
        let base = Instant::now();
        let mut now = base;
        let mut conn: Connection = Connection::new(ConnectionConfig::default());
        conn.connect(MatchId::new("M1"), now).map_err(|e| TestCaseError::fail(e.to_string()))?;

        // Opens since the last successful connect, excluding the initial one.
        let mut opens_since_ready = 0u32;

        for step in steps {
            let actions = match step {
                Step::Advance(ms) => {
                    now += Duration::from_millis(ms);
                    conn.tick(now)
                },
                Step::Ready => conn.transport_ready(conn.current_attempt()),
                Step::Close => conn.transport_closed(conn.current_attempt(), "closed", now),
                Step::StaleReady => conn.transport_ready(conn.current_attempt().saturating_sub(1)),
                Step::Disconnect => conn.disconnect(),
            };

            if conn.state() == ConnectionState::Connected {
                opens_since_ready = 0;
            } else {
                opens_since_ready += count_opens(&actions);
            }

            prop_assert!(conn.attempts() <= DEFAULT_MAX_RECONNECT_ATTEMPTS);
            prop_assert!(opens_since_ready <= DEFAULT_MAX_RECONNECT_ATTEMPTS + 1);
        }
    }

    #[test]
    fn prop_disconnected_machine_stays_silent(
        delays in prop::collection::vec(100u64..10_000, 1..30),
    ) {
        let base = Instant::now();
        let mut now = base;
        let mut conn: Connection = Connection::new(ConnectionConfig::default());
        let actions = conn.connect(MatchId::new("M1"), now)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(count_opens(&actions), 1);

        let attempt = conn.current_attempt();
        conn.transport_ready(attempt);
        conn.transport_closed(attempt, "reset", now);
        conn.disconnect();

        for ms in delays {
            now += Duration::from_millis(ms);
            prop_assert!(conn.tick(now).is_empty());
            prop_assert_eq!(conn.state(), ConnectionState::Disconnected);
        }
    }
}

//! Error types for the sync core.
//!
//! Strongly-typed errors for the two pure layers: frame decoding
//! ([`ProtocolError`]) and the connection state machine ([`ConnectionError`]).
//! Neither is ever surfaced to consumers directly; the client crate maps them
//! into its own taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors decoding an inbound push frame. Always non-fatal: the frame is
/// logged and dropped.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Text is not a JSON frame object with `type` and `matchId`.
    #[error("malformed update: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload does not match the frame's type tag.
    #[error("malformed {tag} update: {reason}")]
    Malformed {
        /// Frame type tag.
        tag: String,
        /// What was wrong with the payload.
        reason: String,
    },
}

/// Errors produced by the connection state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred.
        state: ConnectionState,
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// Transport did not become ready within the connect timeout.
    #[error("connection timeout after {elapsed:?}")]
    ConnectionTimeout {
        /// How long we waited.
        elapsed: Duration,
    },

    /// Transport closed by the peer or the network.
    #[error("transport closed: {reason}")]
    TransportClosed {
        /// Close reason reported by the transport.
        reason: String,
    },

    /// Inbound frame could not be decoded. The frame was dropped.
    #[error("malformed update dropped: {reason}")]
    MalformedUpdate {
        /// Decoding failure.
        reason: String,
    },

    /// Reconnection cap reached; push delivery is abandoned.
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

impl ConnectionError {
    /// Returns true if this error is transient and the state machine will
    /// retry on its own.
    ///
    /// Only a dropped transport is retried automatically; a timed-out initial
    /// connect and an exhausted retry budget leave the decision to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportClosed { .. })
    }
}

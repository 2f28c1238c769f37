//! Client errors.
//!
//! [`ClientError`] is the taxonomy consumers see. Every variant renders a
//! distinct message so a caller can decide whether to retry, wait for their
//! turn or give up. [`AuthorityError`] is what the remote authority seam
//! reports; the session maps it into `RemoteRejected`, `AuthorityUnavailable`
//! or `RefreshFailed` depending on what failed and which request it was.
//! [`TransportError`] covers the push transport and only ever reaches the
//! connection state machine as a close reason.

use std::time::Duration;

use thiserror::Error;
use truco_core::{ConnectionError, ProtocolError};

/// Errors surfaced to consumers of a match session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Another action for this match is still in flight. No request was sent.
    #[error("another action is already in flight for this match")]
    ActionBusy,

    /// The player does not hold the turn. No request was sent.
    #[error("it is not {player}'s turn")]
    NotYourTurn {
        /// Player that attempted the action.
        player: String,
    },

    /// The authority refused the request.
    #[error("authority rejected the request: {message}")]
    RemoteRejected {
        /// HTTP status. `None` when a success response did not decode.
        status: Option<u16>,
        /// Authority message, verbatim.
        message: String,
    },

    /// The authority could not be reached. The request may not have arrived.
    #[error("authority unreachable: {reason}")]
    AuthorityUnavailable {
        /// Network failure.
        reason: String,
    },

    /// A state refresh failed. Polling keeps going.
    #[error("state refresh failed: {reason}")]
    RefreshFailed {
        /// What went wrong.
        reason: String,
    },

    /// The push channel did not become ready in time.
    #[error("push channel connect timed out after {elapsed:?}")]
    ConnectionTimeout {
        /// How long we waited.
        elapsed: Duration,
    },

    /// The push channel closed. Reconnection is scheduled.
    #[error("push channel closed: {reason}")]
    TransportClosed {
        /// Close reason.
        reason: String,
    },

    /// Push delivery abandoned after the reconnect cap. Polling takes over.
    #[error("push channel gave up after {attempts} reconnect attempts")]
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// An inbound update could not be decoded and was dropped.
    #[error("malformed update dropped: {reason}")]
    MalformedUpdate {
        /// Decoding failure.
        reason: String,
    },

    /// No match is being followed.
    #[error("no match subscription is active")]
    NotSubscribed,

    /// Request failed local validation. No request was sent.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Validation failure.
        reason: String,
    },

    /// The session was asked to do something its state does not allow.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What was attempted.
        reason: String,
    },

    /// The session runtime stopped before answering.
    #[error("session runtime stopped")]
    Stopped,
}

impl ClientError {
    /// Returns true if retrying the same call later may succeed without the
    /// caller changing anything.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ActionBusy
                | Self::RefreshFailed { .. }
                | Self::TransportClosed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::AuthorityUnavailable { .. }
        )
    }

    /// Map an authority failure on a refresh.
    pub fn refresh_failed(error: &AuthorityError) -> Self {
        Self::RefreshFailed { reason: error.to_string() }
    }
}

impl From<ConnectionError> for ClientError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::ConnectionTimeout { elapsed } => Self::ConnectionTimeout { elapsed },
            ConnectionError::TransportClosed { reason } => Self::TransportClosed { reason },
            ConnectionError::ReconnectExhausted { attempts } => {
                Self::ReconnectExhausted { attempts }
            },
            ConnectionError::MalformedUpdate { reason } => Self::MalformedUpdate { reason },
            err @ ConnectionError::InvalidState { .. } => {
                Self::InvalidState { reason: err.to_string() }
            },
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::MalformedUpdate { reason: err.to_string() }
    }
}

impl From<AuthorityError> for ClientError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::Rejected { status, message } => {
                Self::RemoteRejected { status: Some(status), message }
            },
            AuthorityError::Unavailable { reason } => Self::AuthorityUnavailable { reason },
            AuthorityError::Decode { reason } => {
                Self::RemoteRejected { status: None, message: reason }
            },
        }
    }
}

/// Failures reported by the remote authority seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// The authority answered with an error status.
    #[error("authority returned {status}: {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Response body, verbatim.
        message: String,
    },

    /// The authority could not be reached.
    #[error("authority unavailable: {reason}")]
    Unavailable {
        /// Network failure.
        reason: String,
    },

    /// The authority answered with a body that does not decode.
    #[error("authority response did not decode: {reason}")]
    Decode {
        /// Decoding failure.
        reason: String,
    },
}

impl AuthorityError {
    /// Returns true if the authority never saw or never answered the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Failures opening or running a push transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be established.
    #[error("connection failed: {0}")]
    Connection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_renders_a_distinct_message() {
        let errors = [
            ClientError::ActionBusy,
            ClientError::NotYourTurn { player: "Ana".into() },
            ClientError::RemoteRejected { status: Some(400), message: "bad".into() },
            ClientError::AuthorityUnavailable { reason: "bad".into() },
            ClientError::RefreshFailed { reason: "bad".into() },
            ClientError::ConnectionTimeout { elapsed: Duration::from_secs(5) },
            ClientError::TransportClosed { reason: "bad".into() },
            ClientError::ReconnectExhausted { attempts: 5 },
            ClientError::MalformedUpdate { reason: "bad".into() },
            ClientError::NotSubscribed,
            ClientError::InvalidRequest { reason: "bad".into() },
            ClientError::InvalidState { reason: "bad".into() },
            ClientError::Stopped,
        ];

        let messages: std::collections::HashSet<String> =
            errors.iter().map(ToString::to_string).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn authority_rejection_keeps_status_and_message() {
        let err = ClientError::from(AuthorityError::Rejected {
            status: 409,
            message: "No es tu turno".into(),
        });
        assert_eq!(err, ClientError::RemoteRejected {
            status: Some(409),
            message: "No es tu turno".into()
        });
        assert!(!err.is_transient());
    }

    #[test]
    fn unreachable_authority_is_not_a_rejection() {
        let err = ClientError::from(AuthorityError::Unavailable { reason: "refused".into() });
        assert_eq!(err, ClientError::AuthorityUnavailable { reason: "refused".into() });
        assert!(err.is_transient());

        let err = ClientError::from(AuthorityError::Decode { reason: "eof".into() });
        assert!(matches!(err, ClientError::RemoteRejected { status: None, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn connection_errors_map_one_to_one() {
        assert_eq!(
            ClientError::from(ConnectionError::ReconnectExhausted { attempts: 5 }),
            ClientError::ReconnectExhausted { attempts: 5 }
        );
        assert!(
            ClientError::from(ConnectionError::TransportClosed { reason: "reset".into() })
                .is_transient()
        );
    }
}

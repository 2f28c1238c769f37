//! Client
//!
//! Action-based session state machine for following a live truco match:
//! keeps a canonical match snapshot in sync over a push channel, falls back to
//! polling while the channel is down, and gates user actions.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and Action-Based patterns as
//! [`truco_core`]. It receives events ([`SessionEvent`]), processes them
//! through pure state machine logic, and returns actions ([`SessionAction`])
//! for the caller to execute against an [`Authority`] and a
//! [`PushTransport`].
//!
//! # Components
//!
//! - [`MatchSession`]: per-match orchestration of the components below
//! - [`Synchronizer`]: folds updates into the canonical snapshot
//! - [`Poller`]: fallback refresh schedule while push is down
//! - [`Dispatcher`]: single-flight and turn gate for user actions
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::HttpAuthority`]: REST client for the authority
//! - [`transport::WsTransport`]: WebSocket push subscriptions

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod authority;
mod dispatcher;
mod error;
mod event;
mod poller;
mod session;
mod sync;

#[cfg(feature = "transport")]
pub mod transport;

pub use authority::{Authority, PushChannel, PushTransport};
pub use dispatcher::{ActionKind, ActionTicket, Dispatcher, PendingAction};
pub use error::{AuthorityError, ClientError, TransportError};
pub use event::{SessionAction, SessionEvent};
pub use poller::{DEFAULT_POLL_INTERVAL, Poller};
pub use session::{DEFAULT_TICK_INTERVAL, MatchSession, SyncConfig};
pub use sync::{DEFAULT_MAX_PENDING_UPDATES, SyncAction, Synchronizer};
pub use truco_core::{
    BidKind, ConnectionState, CreateMatchRequest, HandView, MatchId, MatchSnapshot,
    env::Environment,
};

//! Core
//!
//! Sans-IO building blocks for following a live truco match: the wire types
//! exchanged with the remote authority and the push channel state machine.
//!
//! # Architecture
//!
//! Nothing in this crate performs I/O or reads the clock. State machines take
//! the current instant as an argument and return actions describing the I/O
//! the caller must perform. The same logic therefore runs under the tokio
//! runtime in production and under paused or virtual time in tests.
//!
//! # Components
//!
//! - [`connection::Connection`]: push channel lifecycle with bounded reconnect
//! - [`protocol`]: snapshots, hand views and inbound push frames
//! - [`env::Environment`]: time abstraction for drivers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod protocol;

pub use connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
pub use error::{ConnectionError, ProtocolError};
pub use protocol::{
    BidKind, Card, CreateMatchRequest, HandView, InboundUpdate, MatchId, MatchSnapshot, Play,
    RoundState, Suit, Team, TeamSetup, UpdateKind,
};

//! Deterministic simulation harness for truco session testing.
//!
//! In-memory implementations of the [`truco_client::Authority`] and
//! [`truco_client::PushTransport`] seams. Both are cheap to clone and share
//! their state, so a test keeps one copy for steering and assertions while the
//! runtime under test owns another.
//!
//! # Components
//!
//! - [`SimAuthority`]: plays a simplified match (turn order, hands, bids) and
//!   pushes the resulting frames through an attached [`SimTransport`]
//! - [`SimTransport`]: push hub with knobs for refused, hanging and dropped
//!   connections
//! - [`frames`]: builders for the authority's push frame format

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod frames;
pub mod sim_authority;
pub mod sim_transport;

pub use sim_authority::{CallCounts, SimAuthority};
pub use sim_transport::SimTransport;

//! Application layer for following a truco match
//!
//! Runs a [`truco_client::MatchSession`] on a tokio task, executing its
//! actions against an [`Authority`] and a [`PushTransport`], and exposes the
//! result to consumers through a cloneable [`SessionHandle`].
//!
//! # Components
//!
//! - [`Runtime`]: event loop owning the session, the live push channel and
//!   in-flight authority calls
//! - [`SessionHandle`]: async consumer API (subscribe, act, refresh, create)
//! - [`MatchView`]: observable state published after every change
//! - [`SystemEnv`]: tokio clock for production use
//!
//! Several runtimes can run side by side, one per followed match.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod handle;
mod runtime;
mod state;
mod system_env;

pub use handle::SessionHandle;
pub use runtime::Runtime;
pub use state::MatchView;
pub use system_env::SystemEnv;
pub use truco_client::{Authority, ClientError, PushTransport, SyncConfig};

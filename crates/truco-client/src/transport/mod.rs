//! Production transports.
//!
//! [`HttpAuthority`] talks to the authority's REST API with `reqwest`;
//! [`WsTransport`] opens WebSocket subscriptions with `tokio-tungstenite`.
//! Both are thin: they move bytes and map failures, while all protocol logic
//! stays in the Sans-IO [`crate::MatchSession`].

mod http;
mod ws;

pub use http::HttpAuthority;
pub use ws::WsTransport;

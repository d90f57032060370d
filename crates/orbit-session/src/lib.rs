//! Shared session plumbing for Orbit.
//!
//! - [`SessionConfig`]: timeouts, capacity, and discovery settings
//! - [`ConnectionState`]: the client's connection lifecycle
//! - [`PendingLogins`]: accepted connections awaiting a `JoinRequest`
//! - [`ServerHooks`]: admission veto and discovery data from the host app
//!
//! # How it fits in the stack
//!
//! ```text
//! orbit (ServerSession / ClientSession)  ← drives the pump
//!     ↕
//! orbit-session (this crate)  ← config, pending logins, hooks
//!     ↕
//! orbit-roster / orbit-protocol / orbit-transport
//! ```

mod config;
mod error;
mod hooks;
mod pending;
mod state;

pub use config::{SessionConfig, MAX_PLAYERS_LIMIT};
pub use error::SessionError;
pub use hooks::{DefaultHooks, JoinVerdict, ServerHooks};
pub use pending::{PendingLogin, PendingLogins};
pub use state::ConnectionState;

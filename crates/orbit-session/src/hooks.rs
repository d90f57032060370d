//! Hooks the hosting application implements to take part in admission
//! and discovery.
//!
//! The server calls these synchronously from its pump, so they should
//! return quickly. The default implementations admit everyone and
//! advertise no custom data.

use orbit_protocol::{Bytes, JoinFailureReason};
use orbit_roster::PlayerNumber;

/// Outcome of [`ServerHooks::review_join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinVerdict {
    /// Admit the player. `extra_data` rides along in the `JoinResponse`.
    Allow { extra_data: Bytes },
    /// Refuse the player. Without a reason, `Unknown` is sent.
    Block { reason: Option<JoinFailureReason> },
}

impl JoinVerdict {
    /// Admit with no extra data.
    pub fn allow() -> Self {
        Self::Allow {
            extra_data: Bytes::new(),
        }
    }

    /// Admit, sending `extra_data` back with the acceptance.
    pub fn allow_with(extra_data: impl Into<Bytes>) -> Self {
        Self::Allow {
            extra_data: extra_data.into(),
        }
    }

    /// Refuse with reason `Unknown`.
    pub fn block() -> Self {
        Self::Block { reason: None }
    }

    /// Refuse with a specific reason.
    pub fn block_with(reason: JoinFailureReason) -> Self {
        Self::Block {
            reason: Some(reason),
        }
    }
}

/// Application callbacks used by a server session.
///
/// # Example
///
/// ```rust
/// use orbit_protocol::{Bytes, JoinFailureReason};
/// use orbit_roster::PlayerNumber;
/// use orbit_session::{JoinVerdict, ServerHooks};
///
/// /// Keeps slot 0 free for the host's own avatar.
/// struct ReserveFirstSlot;
///
/// impl ServerHooks for ReserveFirstSlot {
///     fn review_join(&mut self, number: PlayerNumber, _name: &str, _data: &Bytes) -> JoinVerdict {
///         if number.index() == 0 {
///             JoinVerdict::block_with(JoinFailureReason::GameFull)
///         } else {
///             JoinVerdict::allow()
///         }
///     }
/// }
/// ```
pub trait ServerHooks: Send + 'static {
    /// Inspects a join that passed every built-in check. `number` is the
    /// slot the player would get and `name` is already de-duplicated.
    fn review_join(&mut self, number: PlayerNumber, name: &str, data: &Bytes) -> JoinVerdict {
        let _ = (number, name, data);
        JoinVerdict::allow()
    }

    /// Custom bytes for a `GameInfoResponse`, produced per request.
    fn game_info(&mut self) -> Bytes {
        Bytes::new()
    }
}

/// Admits everyone and advertises nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ServerHooks for DefaultHooks {}

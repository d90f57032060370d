//! Unified error type for Orbit.

use orbit_session::SessionError;
use orbit_transport::TransportError;

/// Top-level error wrapping every crate-specific error.
///
/// Only local operations return it, such as
/// [`ClientSession::join`](crate::ClientSession::join) or a send whose
/// frame is over [`MAX_FRAME_LEN`](orbit_transport::MAX_FRAME_LEN). The
/// pump never does: network failures become events instead.
#[derive(Debug, thiserror::Error)]
pub enum OrbitError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_roster::PlayerNumber;

    #[test]
    fn test_from_transport_error() {
        let err: OrbitError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, OrbitError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_session_error() {
        let err: OrbitError = SessionError::NotConnected.into();
        assert!(matches!(err, OrbitError::Session(_)));
        assert_eq!(err.to_string(), "not connected");
    }

    #[test]
    fn test_from_unknown_player_names_the_slot() {
        let err: OrbitError = SessionError::UnknownPlayer(PlayerNumber(3)).into();
        assert!(matches!(err, OrbitError::Session(_)));
        assert!(err.to_string().contains("#3"));
    }
}

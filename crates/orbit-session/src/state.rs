use std::fmt;

/// Connection state of a client session.
///
/// ```text
///   Unconnected ──(join)──→ Connecting ──(accepted)──→ Connected
///        ↑                      │                          │
///        └──(rejected, failure)─┘                          │
///        └────────────(leave, kicked, timeout)─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Unconnected,
    /// A `JoinRequest` is out and no response has arrived yet.
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(text)
    }
}

/// Running message counters for a session.
///
/// `unhandled` counts well-formed messages that were ignored: wrong role,
/// wrong state, or an unknown sender. `malformed` counts messages that
/// failed to decode or failed validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub handled: u64,
    pub unhandled: u64,
    pub malformed: u64,
}

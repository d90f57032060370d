use orbit_transport::{Connection, TransportError, MAX_FRAME_LEN};

/// Refuses a frame no transport will carry, before anything is queued.
pub(crate) fn check_frame_len(frame: &[u8]) -> Result<(), TransportError> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(frame.len()));
    }
    Ok(())
}

/// Queues one encoded message on `conn`.
///
/// A failed send is only logged; the broken connection is picked up by
/// the next `try_recv` and handled there.
pub(crate) fn send_frame<C: Connection>(conn: &mut C, frame: &[u8]) {
    if let Err(e) = conn.send(frame) {
        tracing::debug!(conn = %conn.id(), error = %e, "send failed");
    }
}

/// A slot count as it travels on the wire.
pub(crate) fn wire_count(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

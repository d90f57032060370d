//! Connections that were accepted but have not finished the join
//! handshake.
//!
//! A pending login lives until its first message arrives or the login
//! timeout passes. Expiry is checked against an `Instant` supplied by the
//! caller so tests can move time forward without sleeping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use orbit_transport::{Connection, ConnectionId};

/// One connection waiting for its `JoinRequest`.
#[derive(Debug)]
pub struct PendingLogin<C> {
    pub conn: C,
    pub accepted_at: Instant,
}

/// Tracks pending logins by connection id.
#[derive(Debug)]
pub struct PendingLogins<C> {
    logins: HashMap<ConnectionId, PendingLogin<C>>,
}

impl<C> Default for PendingLogins<C> {
    fn default() -> Self {
        Self {
            logins: HashMap::new(),
        }
    }
}

impl<C: Connection> PendingLogins<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, conn: C, now: Instant) {
        self.logins.insert(
            conn.id(),
            PendingLogin {
                conn,
                accepted_at: now,
            },
        );
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<PendingLogin<C>> {
        self.logins.remove(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut PendingLogin<C>> {
        self.logins.get_mut(&id)
    }

    /// Snapshot of the current ids, for iterating while mutating.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.logins.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.logins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logins.is_empty()
    }

    /// Removes and returns every login older than `timeout` at `now`.
    pub fn expire_stale(&mut self, now: Instant, timeout: Duration) -> Vec<PendingLogin<C>> {
        let stale: Vec<ConnectionId> = self
            .logins
            .iter()
            .filter(|(_, login)| now.saturating_duration_since(login.accepted_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        stale
            .into_iter()
            .filter_map(|id| self.logins.remove(&id))
            .collect()
    }

    /// Removes every pending login.
    pub fn drain(&mut self) -> Vec<PendingLogin<C>> {
        self.logins.drain().map(|(_, login)| login).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_transport::memory::MemoryConnection;

    fn conn() -> MemoryConnection {
        let (client, _server) = MemoryConnection::pair(
            "10.0.0.2:5000".parse().unwrap(),
            "10.0.0.1:7000".parse().unwrap(),
        );
        client
    }

    #[test]
    fn test_insert_and_remove() {
        let mut pending = PendingLogins::new();
        let c = conn();
        let id = c.id();
        pending.insert(c, Instant::now());
        assert_eq!(pending.len(), 1);
        assert!(pending.remove(id).is_some());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_expire_stale_removes_only_old_logins() {
        let start = Instant::now();
        let mut pending = PendingLogins::new();
        let old = conn();
        let old_id = old.id();
        pending.insert(old, start);
        let fresh = conn();
        let fresh_id = fresh.id();
        pending.insert(fresh, start + Duration::from_secs(4));

        let expired = pending.expire_stale(start + Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].conn.id(), old_id);
        assert!(pending.get_mut(fresh_id).is_some());
    }

    #[test]
    fn test_expire_stale_before_timeout_keeps_all() {
        let start = Instant::now();
        let mut pending = PendingLogins::new();
        pending.insert(conn(), start);
        let expired = pending.expire_stale(start + Duration::from_millis(10), Duration::from_secs(5));
        assert!(expired.is_empty());
        assert_eq!(pending.len(), 1);
    }
}

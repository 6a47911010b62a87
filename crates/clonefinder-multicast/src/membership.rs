//! Group membership table for observed clones.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Liveness table mapping each observed peer endpoint to the time it was
/// last heard from, in milliseconds since the listener started.
///
/// The table is exclusively owned by the listen loop; the announce loop
/// never reads or writes it. Timestamps are passed in by the caller so the
/// table itself stays clock-free.
#[derive(Debug)]
pub struct Membership {
    peers: HashMap<SocketAddr, u64>,
    offline_timeout_ms: u64,
}

impl Membership {
    /// Create an empty table with the given eviction timeout.
    pub fn new(offline_timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            offline_timeout_ms: offline_timeout.as_millis() as u64,
        }
    }

    /// Record a heartbeat from `peer` at `now_ms`.
    ///
    /// Returns true when the peer was not already in the table, i.e. this
    /// heartbeat is a join. A peer that was evicted earlier and shows up
    /// again counts as a fresh join.
    pub fn observe(&mut self, peer: SocketAddr, now_ms: u64) -> bool {
        self.peers.insert(peer, now_ms).is_none()
    }

    /// Evict every peer whose last heartbeat is at least the offline timeout
    /// in the past, returning the evicted endpoints.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<SocketAddr> {
        let timeout = self.offline_timeout_ms;
        let mut evicted = Vec::new();

        self.peers.retain(|peer, last_seen| {
            if now_ms.saturating_sub(*last_seen) >= timeout {
                evicted.push(*peer);
                false
            } else {
                true
            }
        });

        evicted
    }

    /// Whether `peer` is currently considered alive.
    pub fn contains(&self, peer: &SocketAddr) -> bool {
        self.peers.contains_key(peer)
    }

    /// When `peer` was last heard from, if it is in the table.
    pub fn last_seen(&self, peer: &SocketAddr) -> Option<u64> {
        self.peers.get(peer).copied()
    }

    /// Number of live peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Membership {
        Membership::new(Duration::from_millis(1000))
    }

    fn peer(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_heartbeat_is_a_join() {
        let mut table = table();
        let e = peer("10.0.0.5:4000");

        assert!(table.observe(e, 5));
        assert!(table.contains(&e));
        assert_eq!(table.last_seen(&e), Some(5));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_refresh_is_not_a_join() {
        let mut table = table();
        let e = peer("10.0.0.5:4000");

        assert!(table.observe(e, 5));
        assert!(!table.observe(e, 900));
        assert_eq!(table.last_seen(&e), Some(900));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_sweep_evicts_at_exactly_the_timeout() {
        let mut table = table();
        let e = peer("10.0.0.5:4000");
        table.observe(e, 100);

        // 999 ms of silence: still alive.
        assert!(table.sweep(1099).is_empty());
        assert!(table.contains(&e));

        // 1000 ms of silence: evicted.
        assert_eq!(table.sweep(1100), vec![e]);
        assert!(!table.contains(&e));
        assert!(table.is_empty());
    }

    #[test]
    fn test_sweep_removes_all_stale_entries_in_one_pass() {
        let mut table = table();
        let a = peer("10.0.0.1:1111");
        let b = peer("10.0.0.2:2222");
        let c = peer("10.0.0.3:3333");
        table.observe(a, 0);
        table.observe(b, 10);
        table.observe(c, 2000);

        let mut evicted = table.sweep(2500);
        evicted.sort();
        assert_eq!(evicted, vec![a, b]);
        assert!(table.contains(&c));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rejoin_after_eviction_is_a_fresh_join() {
        let mut table = table();
        let e = peer("10.0.0.5:4000");

        assert!(table.observe(e, 0));
        assert_eq!(table.sweep(1000), vec![e]);
        assert!(table.observe(e, 1500));
    }

    #[test]
    fn test_same_address_different_port_is_a_different_peer() {
        let mut table = table();

        assert!(table.observe(peer("10.0.0.5:4000"), 0));
        assert!(table.observe(peer("10.0.0.5:4001"), 0));
        assert_eq!(table.len(), 2);
    }

    // The worked example from the protocol description: one peer joins,
    // refreshes, then goes silent; a second peer's heartbeat both joins and
    // triggers the sweep that evicts the first.
    #[test]
    fn test_join_refresh_evict_scenario() {
        let mut table = table();
        let first = peer("10.0.0.5:4000");
        let second = peer("10.0.0.6:5000");

        assert!(table.observe(first, 5));
        assert!(!table.observe(first, 900));

        assert!(table.observe(second, 1950));
        assert_eq!(table.sweep(1950), vec![first]);

        assert!(!table.contains(&first));
        assert_eq!(table.last_seen(&second), Some(1950));
        assert_eq!(table.len(), 1);
    }
}

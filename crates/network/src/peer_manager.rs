//! Known addresses, bans and connection admission.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

/// How many known addresses the table retains.
const MAX_KNOWN_ADDRESSES: usize = 5_000;

/// Tracks candidate peers and bans across connections.
pub struct PeerManager {
    /// Candidate endpoints with the time they were last advertised.
    known: HashMap<SocketAddr, Instant>,
    /// Banned hosts and when the ban lifts.
    bans: HashMap<IpAddr, Instant>,
    ban_duration: Duration,
}

impl PeerManager {
    /// Creates a manager with the configured ban duration.
    pub fn new(ban_duration: Duration) -> Self {
        Self {
            known: HashMap::new(),
            bans: HashMap::new(),
            ban_duration,
        }
    }

    /// Records an advertised address.
    pub fn add_address(&mut self, address: SocketAddr) {
        if self.known.len() >= MAX_KNOWN_ADDRESSES && !self.known.contains_key(&address) {
            return;
        }
        self.known.insert(address, Instant::now());
    }

    /// Recently seen addresses, excluding `except`, newest first.
    pub fn recent_addresses(&self, limit: usize, except: Option<SocketAddr>) -> Vec<SocketAddr> {
        let mut entries: Vec<(&SocketAddr, &Instant)> = self
            .known
            .iter()
            .filter(|(addr, _)| Some(**addr) != except && !self.is_banned(addr.ip()))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(a.1));
        entries.into_iter().take(limit).map(|(a, _)| *a).collect()
    }

    /// Candidates worth dialing: known, not banned.
    pub fn connect_candidates(&self, limit: usize) -> Vec<SocketAddr> {
        self.recent_addresses(limit, None)
    }

    /// Bans a host for the configured duration.
    pub fn ban(&mut self, ip: IpAddr) {
        self.bans.insert(ip, Instant::now() + self.ban_duration);
    }

    /// Whether a host is currently banned.
    pub fn is_banned(&self, ip: IpAddr) -> bool {
        self.bans
            .get(&ip)
            .map(|until| Instant::now() < *until)
            .unwrap_or(false)
    }

    /// Drops expired bans.
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.bans.retain(|_, until| *until > now);
    }

    /// Number of known addresses.
    pub fn known_count(&self) -> usize {
        self.known.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_blocks_and_expires() {
        let mut manager = PeerManager::new(Duration::from_millis(0));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        manager.ban(ip);
        // Zero-duration ban expires immediately.
        std::thread::sleep(Duration::from_millis(2));
        assert!(!manager.is_banned(ip));

        let mut manager = PeerManager::new(Duration::from_secs(60));
        manager.ban(ip);
        assert!(manager.is_banned(ip));
    }

    #[test]
    fn recent_addresses_excludes_requester_and_banned() {
        let mut manager = PeerManager::new(Duration::from_secs(60));
        let a: SocketAddr = "10.0.0.1:10333".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:10333".parse().unwrap();
        let c: SocketAddr = "10.0.0.3:10333".parse().unwrap();
        manager.add_address(a);
        manager.add_address(b);
        manager.add_address(c);
        manager.ban(c.ip());
        let list = manager.recent_addresses(10, Some(a));
        assert!(list.contains(&b));
        assert!(!list.contains(&a));
        assert!(!list.contains(&c));
    }
}

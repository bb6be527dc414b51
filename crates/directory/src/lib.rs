//! Peer directory: a read-only view of reachable peer endpoints.
//!
//! The discovery mechanism (UDP broadcast, tracker heartbeats — outside
//! this subsystem) feeds endpoints in; planners and orchestrators read
//! them out. Any number of callers may read concurrently.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Duration;
use tracing::debug;

use swarmshare_protocol::{PeerEndpoint, PeerId};

/// Read access to the live peer list.
///
/// Implementations must be safe for concurrent readers. Consumers treat
/// the returned endpoints as read-only snapshots.
pub trait PeerDirectory: Send + Sync {
    /// Currently reachable peers, excluding the local peer.
    fn list_available_peers(&self) -> Vec<PeerEndpoint>;

    /// Looks up a peer by id, online or not.
    fn find(&self, id: &PeerId) -> Option<PeerEndpoint>;
}

/// Directory backed by a shared map, fed by the discovery mechanism.
#[derive(Default)]
pub struct SharedDirectory {
    peers: RwLock<HashMap<PeerId, PeerEndpoint>>,
}

impl SharedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes an endpoint.
    ///
    /// When a record for the id already exists, the endpoint with the
    /// most recent `last_seen` wins, so a late announcement from a stale
    /// address can never shadow a fresher one.
    pub fn upsert(&self, endpoint: PeerEndpoint) {
        let mut peers = self.peers.write().unwrap();
        match peers.get(&endpoint.id) {
            Some(existing) if existing.last_seen > endpoint.last_seen => {
                debug!(id = %endpoint.id, "ignoring stale endpoint announcement");
            }
            _ => {
                peers.insert(endpoint.id.clone(), endpoint);
            }
        }
    }

    /// Flips a peer offline, keeping its record for later recovery.
    pub fn mark_offline(&self, id: &PeerId) {
        let mut peers = self.peers.write().unwrap();
        if let Some(peer) = peers.get_mut(id) {
            peer.online = false;
        }
    }

    /// Removes a peer entirely (discovery said goodbye).
    pub fn remove(&self, id: &PeerId) {
        self.peers.write().unwrap().remove(id);
    }

    /// Flips offline every peer not seen within `max_age`.
    ///
    /// Returns how many peers went offline.
    pub fn prune_stale(&self, max_age: Duration) -> usize {
        let mut peers = self.peers.write().unwrap();
        let mut pruned = 0;
        for peer in peers.values_mut() {
            if peer.online && peer.is_stale(max_age) {
                peer.online = false;
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(pruned, "stale peers flipped offline");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().unwrap().is_empty()
    }
}

impl PeerDirectory for SharedDirectory {
    fn list_available_peers(&self) -> Vec<PeerEndpoint> {
        let mut available: Vec<PeerEndpoint> = self
            .peers
            .read()
            .unwrap()
            .values()
            .filter(|p| p.online)
            .cloned()
            .collect();
        // Stable listing order for deterministic planning.
        available.sort_by(|a, b| a.id.cmp(&b.id));
        available
    }

    fn find(&self, id: &PeerId) -> Option<PeerEndpoint> {
        self.peers.read().unwrap().get(id).cloned()
    }
}

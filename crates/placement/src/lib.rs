//! Distribution planning: decides which peer owns each chunk of a file.
//!
//! The planner is deterministic round robin over the local peer plus the
//! live remote peers, in the order the directory lists them. The local
//! peer always heads the rotation so at least one chunk stays local
//! without a network hop.

use std::collections::BTreeMap;

use swarmshare_protocol::constants::{DEFAULT_DISTRIBUTION_THRESHOLD, DEFAULT_MIN_PEERS};
use swarmshare_protocol::{PeerEndpoint, PeerId};

/// Errors produced by the planner.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("insufficient peers for distribution: {available} available, {required} required")]
    InsufficientPeers { available: usize, required: u32 },
}

/// Planner configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// File size at and above which distribution is mandatory.
    pub distribution_threshold: u64,
    /// Minimum live remote peers required for a distributed upload.
    pub min_peers: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            distribution_threshold: DEFAULT_DISTRIBUTION_THRESHOLD,
            min_peers: DEFAULT_MIN_PEERS,
        }
    }
}

/// Decides chunk ownership for distributed files.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// `true` iff a file of `size` bytes must be distributed.
    pub fn should_distribute(&self, size: u64) -> bool {
        size >= self.config.distribution_threshold
    }

    /// `true` iff enough remote peers are currently live for distribution.
    pub fn can_distribute(&self, available: &[PeerEndpoint]) -> bool {
        self.live_count(available) >= self.config.min_peers as usize
    }

    /// Plans ownership for `chunk_count` chunks over the local peer and
    /// the live peers in `available`, in the given order.
    ///
    /// Fails with [`PlanError::InsufficientPeers`] when too few remote
    /// peers are live — the upload must be refused, never silently
    /// downgraded to single-copy storage.
    pub fn plan(
        &self,
        chunk_count: u32,
        local: &PeerId,
        available: &[PeerEndpoint],
    ) -> Result<BTreeMap<u32, PeerId>, PlanError> {
        if !self.can_distribute(available) {
            return Err(PlanError::InsufficientPeers {
                available: self.live_count(available),
                required: self.config.min_peers,
            });
        }

        let mut rotation = vec![local.clone()];
        rotation.extend(
            available
                .iter()
                .filter(|p| p.online)
                .map(|p| p.id.clone()),
        );

        Ok((0..chunk_count)
            .map(|i| (i, rotation[i as usize % rotation.len()].clone()))
            .collect())
    }

    /// Degenerate placement for files below the distribution threshold:
    /// every chunk stays with the local peer.
    ///
    /// Keeps the placement invariant (every index covered exactly once)
    /// uniform across distributed and local descriptors.
    pub fn plan_local(&self, chunk_count: u32, local: &PeerId) -> BTreeMap<u32, PeerId> {
        (0..chunk_count).map(|i| (i, local.clone())).collect()
    }

    fn live_count(&self, available: &[PeerEndpoint]) -> usize {
        available.iter().filter(|p| p.online).count()
    }
}

/// Inverts a placement map into per-peer chunk index lists.
pub fn placement_summary(placement: &BTreeMap<u32, PeerId>) -> BTreeMap<PeerId, Vec<u32>> {
    let mut summary: BTreeMap<PeerId, Vec<u32>> = BTreeMap::new();
    for (index, peer) in placement {
        summary.entry(peer.clone()).or_default().push(*index);
    }
    summary
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn endpoint(id: &str, online: bool) -> PeerEndpoint {
        PeerEndpoint {
            id: PeerId::new(id),
            name: id.to_uppercase(),
            addr: "127.0.0.1:9400".parse().unwrap(),
            online,
            last_seen: Utc::now(),
        }
    }

    fn planner() -> Planner {
        Planner::new(PlannerConfig {
            distribution_threshold: 1024,
            min_peers: 2,
        })
    }

    #[test]
    fn should_distribute_at_threshold() {
        let p = planner();
        assert!(!p.should_distribute(1023));
        assert!(p.should_distribute(1024));
        assert!(p.should_distribute(1025));
    }

    #[test]
    fn can_distribute_counts_only_live_peers() {
        let p = planner();
        assert!(!p.can_distribute(&[]));
        assert!(!p.can_distribute(&[endpoint("b", true)]));
        assert!(!p.can_distribute(&[endpoint("b", true), endpoint("c", false)]));
        assert!(p.can_distribute(&[endpoint("b", true), endpoint("c", true)]));
    }

    #[test]
    fn plan_refuses_insufficient_peers() {
        let p = planner();
        let local = PeerId::new("a");
        let err = p.plan(10, &local, &[endpoint("b", true)]).unwrap_err();
        match err {
            PlanError::InsufficientPeers {
                available,
                required,
            } => {
                assert_eq!(available, 1);
                assert_eq!(required, 2);
            }
        }
    }

    #[test]
    fn plan_is_deterministic() {
        let p = planner();
        let local = PeerId::new("a");
        let peers = vec![endpoint("b", true), endpoint("c", true)];
        let first = p.plan(10, &local, &peers).unwrap();
        let second = p.plan(10, &local, &peers).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn plan_round_robin_ten_chunks_three_peers() {
        // chunkSize=1 MiB, file=10 MiB, peers = {A(local), B, C}:
        // 0→A,1→B,2→C,3→A,4→B,5→C,6→A,7→B,8→C,9→A.
        let p = planner();
        let local = PeerId::new("a");
        let peers = vec![endpoint("b", true), endpoint("c", true)];
        let map = p.plan(10, &local, &peers).unwrap();

        let expected = ["a", "b", "c", "a", "b", "c", "a", "b", "c", "a"];
        for (i, peer) in expected.iter().enumerate() {
            assert_eq!(map[&(i as u32)], PeerId::new(*peer), "chunk {i}");
        }

        let summary = placement_summary(&map);
        assert_eq!(summary[&PeerId::new("a")], vec![0, 3, 6, 9]);
        assert_eq!(summary[&PeerId::new("b")], vec![1, 4, 7]);
        assert_eq!(summary[&PeerId::new("c")], vec![2, 5, 8]);
    }

    #[test]
    fn plan_skips_offline_peers_in_rotation() {
        let p = planner();
        let local = PeerId::new("a");
        let peers = vec![
            endpoint("b", true),
            endpoint("dead", false),
            endpoint("c", true),
        ];
        let map = p.plan(6, &local, &peers).unwrap();
        assert!(map.values().all(|id| id.as_str() != "dead"));
        assert_eq!(map[&1], PeerId::new("b"));
        assert_eq!(map[&2], PeerId::new("c"));
    }

    #[test]
    fn plan_spread_is_even_within_one() {
        let p = planner();
        let local = PeerId::new("a");
        for (chunks, peer_count) in [(10u32, 3usize), (7, 4), (23, 5), (4, 6)] {
            let peers: Vec<PeerEndpoint> = (0..peer_count - 1)
                .map(|i| endpoint(&format!("p{i}"), true))
                .collect();
            let map = p.plan(chunks, &local, &peers).unwrap();
            let summary = placement_summary(&map);
            let counts: Vec<usize> = summary.values().map(|v| v.len()).collect();
            let max = counts.iter().max().unwrap();
            let min = counts.iter().min().unwrap();
            assert!(
                max - min <= 1,
                "uneven spread for {chunks} chunks over {peer_count} peers: {counts:?}"
            );
        }
    }

    #[test]
    fn plan_local_covers_all_indices() {
        let p = planner();
        let local = PeerId::new("a");
        let map = p.plan_local(5, &local);
        assert_eq!(map.len(), 5);
        assert!(map.values().all(|id| *id == local));
    }

    #[test]
    fn plan_covers_every_index_exactly_once() {
        let p = planner();
        let local = PeerId::new("a");
        let peers = vec![endpoint("b", true), endpoint("c", true)];
        let map = p.plan(17, &local, &peers).unwrap();
        assert_eq!(map.len(), 17);
        for i in 0..17u32 {
            assert!(map.contains_key(&i));
        }
    }
}

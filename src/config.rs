//! Node configuration.
//!
//! Partition placement is injected data rather than control flow so the
//! static tables can later be replaced by coordinator-driven assignment
//! without touching the engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::model::PartitionId;
use crate::routing::Routing;

/// Interval between heartbeats to the coordinator.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Backoff between coordinator reconnect attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Interval between anti-entropy reconciliation cycles.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Connect/send time limit for a push-on-commit replication attempt.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Connect/read time limit for a reconciliation snapshot fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One partition this node holds, with the replica slots backing it on disk.
/// Only the first listed slot's file is loaded for serving; the rest are
/// dormant copies.
#[derive(Debug, Clone)]
pub struct PlacementEntry {
    pub partition: PartitionId,
    pub replicas: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: u32,
    /// Coordinator address as `host:port`.
    pub coordinator: String,
    pub bind_ip: String,
    pub bind_port: u16,
    pub data_dir: PathBuf,
    /// Replica peer address as `host:port`; `None` disables replication.
    pub peer: Option<String>,
    pub routing: Routing,
    pub placement: Vec<PlacementEntry>,
}

impl NodeConfig {
    /// Configuration with the cluster's default routing, placement, and peer
    /// derivation for the given node id.
    pub fn new(
        node_id: u32,
        coordinator: String,
        bind_ip: String,
        bind_port: u16,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            node_id,
            coordinator,
            bind_ip,
            bind_port,
            data_dir,
            peer: default_peer(node_id),
            routing: Routing::Modulo,
            placement: default_placement(node_id),
        }
    }
}

/// Static partition placement by node id. Node 1 serves the first replica
/// slots of partitions 1 and 3; every other node mirrors the remaining slots.
pub fn default_placement(node_id: u32) -> Vec<PlacementEntry> {
    let table: &[(PartitionId, &[u32])] = if node_id == 1 {
        &[(1, &[1, 2]), (2, &[3]), (3, &[1])]
    } else {
        &[(1, &[3]), (2, &[1, 2]), (3, &[2, 3])]
    };
    table
        .iter()
        .map(|(partition, replicas)| PlacementEntry {
            partition: *partition,
            replicas: replicas.to_vec(),
        })
        .collect()
}

/// The replica peer for push-sync and reconciliation: nodes 1 and 2 pair up
/// on their well-known ports.
pub fn default_peer(node_id: u32) -> Option<String> {
    if node_id == 1 {
        Some("localhost:6001".to_string())
    } else {
        Some("localhost:6000".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_covers_all_partitions_for_both_shapes() {
        for node_id in [1, 2, 7] {
            let placement = default_placement(node_id);
            let mut partitions: Vec<_> = placement.iter().map(|p| p.partition).collect();
            partitions.sort_unstable();
            assert_eq!(partitions, vec![1, 2, 3]);
            assert!(placement.iter().all(|p| !p.replicas.is_empty()));
        }
    }

    #[test]
    fn peers_are_mutual() {
        assert_eq!(default_peer(1).as_deref(), Some("localhost:6001"));
        assert_eq!(default_peer(2).as_deref(), Some("localhost:6000"));
        assert_eq!(default_peer(3).as_deref(), Some("localhost:6000"));
    }
}

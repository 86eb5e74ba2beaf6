//! Deterministic account-to-partition routing.
//!
//! Every node in a cluster must compute the same partition for the same
//! account id; the strategy is a cluster-wide constant, not a per-node choice.

use crate::model::{AccountId, PartitionId};

/// Number of partitions in the cluster. Fixed; there is no rebalancer.
pub const PARTITION_COUNT: u32 = 3;

/// Partition routing strategy.
///
/// `Modulo` is the cluster default. `Digest` hashes the decimal form of the
/// account id; it distributes ids more evenly but is incompatible with
/// `Modulo`. Mixing strategies across nodes splits ownership silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Routing {
    #[default]
    Modulo,
    Digest,
}

impl Routing {
    pub fn route(self, account: AccountId) -> PartitionId {
        match self {
            Routing::Modulo => (account % PARTITION_COUNT) + 1,
            Routing::Digest => {
                let digest = blake3::hash(account.to_string().as_bytes());
                let mut word = [0u8; 8];
                word.copy_from_slice(&digest.as_bytes()[..8]);
                (u64::from_le_bytes(word) % u64::from(PARTITION_COUNT)) as PartitionId + 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulo_routes_by_remainder() {
        assert_eq!(Routing::Modulo.route(99), 1);
        assert_eq!(Routing::Modulo.route(100), 2);
        assert_eq!(Routing::Modulo.route(103), 2);
        assert_eq!(Routing::Modulo.route(200), 3);
    }

    #[test]
    fn modulo_covers_all_partitions() {
        let hit: std::collections::HashSet<_> =
            (0..100).map(|id| Routing::Modulo.route(id)).collect();
        assert_eq!(hit.len(), PARTITION_COUNT as usize);
    }

    #[test]
    fn digest_is_deterministic_and_in_range() {
        for id in [0, 1, 7, 100, 103, 999_999] {
            let first = Routing::Digest.route(id);
            assert_eq!(first, Routing::Digest.route(id));
            assert!((1..=PARTITION_COUNT).contains(&first));
        }
    }

    #[test]
    fn digest_covers_all_partitions() {
        let hit: std::collections::HashSet<_> =
            (0..100).map(|id| Routing::Digest.route(id)).collect();
        assert_eq!(hit.len(), PARTITION_COUNT as usize);
    }
}

//! Replica convergence: push-on-commit sync and the periodic anti-entropy
//! reconciliation loop.
//!
//! Both paths are best-effort. A push that cannot reach the peer is dropped;
//! a reconciliation cycle that fails for one partition moves on to the next.
//! Neither ever blocks or fails the write path, and neither holds a partition
//! lock across network I/O.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{FETCH_TIMEOUT, PUSH_TIMEOUT, RECONCILE_INTERVAL};
use crate::model::{Account, AccountId, PartitionId};
use crate::node::WorkerNode;
use crate::store::PartitionData;

/// How a remote snapshot is folded into local partition data.
///
/// The shipped policy only fills gaps; a version-stamped last-writer-wins
/// policy can be slotted in here without touching the loop's scheduling.
pub trait MergeStrategy: Send + Sync {
    /// Merges `remote` into `local`, returning how many accounts changed.
    fn merge(&self, local: &mut PartitionData, remote: HashMap<AccountId, Account>) -> usize;
}

/// Adds accounts present remotely but absent locally. Existing local accounts
/// are never touched, even when the remote copy diverges.
pub struct AddMissing;

impl MergeStrategy for AddMissing {
    fn merge(&self, local: &mut PartitionData, remote: HashMap<AccountId, Account>) -> usize {
        let mut added = 0;
        for (id, account) in remote {
            if !local.accounts.contains_key(&id) {
                local.accounts.insert(id, account);
                added += 1;
            }
        }
        added
    }
}

/// Ships a partition's account snapshot to the peer after a committed write.
/// Fire-and-forget: failures are logged and dropped, never retried.
pub async fn push_snapshot(peer: String, partition: PartitionId, payload: String) {
    let message = format!("SINCRONIZAR|{partition}|{payload}\n");
    let attempt = async {
        let mut stream = TcpStream::connect(&peer).await?;
        stream.write_all(message.as_bytes()).await?;
        stream.flush().await
    };
    match timeout(PUSH_TIMEOUT, attempt).await {
        Ok(Ok(())) => debug!(partition, peer = %peer, "snapshot pushed"),
        Ok(Err(err)) => warn!(partition, peer = %peer, error = %err, "snapshot push failed"),
        Err(_) => warn!(partition, peer = %peer, "snapshot push timed out"),
    }
}

/// Anti-entropy loop: every cycle, pull each held partition's snapshot from
/// the peer and merge in what is missing locally. Runs for the node's
/// lifetime; per-partition failures never stop the loop.
pub async fn run_reconciler(node: Arc<WorkerNode>, strategy: impl MergeStrategy) {
    loop {
        sleep(RECONCILE_INTERVAL).await;
        reconcile_once(&node, &strategy).await;
    }
}

/// One reconciliation pass over all held partitions.
pub async fn reconcile_once(node: &WorkerNode, strategy: &dyn MergeStrategy) {
    let Some(peer) = node.config().peer.clone() else {
        return;
    };
    for partition in node.partitions() {
        let remote = match fetch_remote_accounts(&peer, partition.id).await {
            Some(remote) => remote,
            None => continue,
        };

        let mut data = partition.lock().await;
        let added = strategy.merge(&mut data, remote);
        if added == 0 {
            continue;
        }
        info!(partition = partition.id, added, "reconciled missing accounts from peer");
        if let Err(err) = partition.persist(&data).await {
            warn!(partition = partition.id, error = %err, "reconciled state not persisted");
        }
    }
}

/// Requests `OBTENER_PARTICION` from the peer. Any connect, read, or parse
/// failure (including an `ERROR|...` reply) yields `None`.
async fn fetch_remote_accounts(
    peer: &str,
    partition: PartitionId,
) -> Option<HashMap<AccountId, Account>> {
    let attempt = async {
        let mut stream = TcpStream::connect(peer).await?;
        stream
            .write_all(format!("OBTENER_PARTICION|{partition}\n").as_bytes())
            .await?;
        let mut reply = String::new();
        BufReader::new(stream).read_line(&mut reply).await?;
        Ok::<_, std::io::Error>(reply)
    };

    let reply = match timeout(FETCH_TIMEOUT, attempt).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            debug!(partition, peer, error = %err, "snapshot fetch failed");
            return None;
        }
        Err(_) => {
            debug!(partition, peer, "snapshot fetch timed out");
            return None;
        }
    };

    let reply = reply.trim();
    if reply.is_empty() || reply.starts_with("ERROR") {
        debug!(partition, peer, reply, "peer has no snapshot to offer");
        return None;
    }
    match serde_json::from_str(reply) {
        Ok(accounts) => Some(accounts),
        Err(err) => {
            warn!(partition, peer, error = %err, "unparseable snapshot from peer");
            None
        }
    }
}

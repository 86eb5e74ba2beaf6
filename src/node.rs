//! The worker node: partition ownership, the request listener, and dispatch.
//!
//! Every inbound connection carries exactly one request line and receives one
//! reply line. Connections are handled concurrently on their own tasks; all
//! shared state lives in the per-partition locks, so requests against
//! different partitions never contend.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::Amount;
use crate::config::NodeConfig;
use crate::engine;
use crate::model::{AccountId, PartitionId, TIMESTAMP_FORMAT};
use crate::proto::{ErrorKind, Reply, Request};
use crate::replica;
use crate::store::Partition;

pub struct WorkerNode {
    config: NodeConfig,
    /// Immutable after startup; ordered so audits and reconciliation walk
    /// partitions deterministically.
    partitions: BTreeMap<PartitionId, Arc<Partition>>,
}

impl WorkerNode {
    /// Creates the data directory and loads every partition named by the
    /// placement table. Only the first replica slot per partition id becomes
    /// the serving copy; bad or missing files degrade to empty partitions.
    pub async fn open(config: NodeConfig) -> io::Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let mut partitions = BTreeMap::new();
        for entry in &config.placement {
            let Some(slot) = entry.replicas.first() else {
                continue;
            };
            if partitions.contains_key(&entry.partition) {
                continue;
            }
            let path = config
                .data_dir
                .join(format!("particion_{}_rep{}.dat", entry.partition, slot));
            let partition = Partition::open(entry.partition, path).await;
            info!(partition = entry.partition, path = %partition.path().display(), "partition loaded");
            partitions.insert(entry.partition, Arc::new(partition));
        }

        Ok(Arc::new(Self { config, partitions }))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Arc<Partition>> {
        self.partitions.get(&id)
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Arc<Partition>> {
        self.partitions.values()
    }

    pub fn partition_ids(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.partitions.keys().copied()
    }

    /// Accept loop. Runs until the listener fails permanently; individual
    /// accept errors are logged and skipped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let node = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(err) = node.handle_connection(stream).await {
                            debug!(peer = %peer, error = %err, "connection closed with error");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "failed to accept connection"),
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> io::Result<()> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let reply = self.dispatch(line).await;
        let mut stream = reader.into_inner();
        stream.write_all(format!("{reply}\n").as_bytes()).await?;
        Ok(())
    }

    /// Executes one request and always produces a reply; no failure of a
    /// single request escapes this layer.
    pub async fn dispatch(&self, line: &str) -> Reply {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "rejected request line");
                return Reply::Error(ErrorKind::InvalidCommand);
            }
        };

        match request {
            Request::Query { account } => self.query(account).await,
            Request::Transfer {
                source,
                dest,
                amount,
            } => self.transfer(source, dest, amount).await,
            Request::Audit => Reply::Audit(self.audit_total().await),
            Request::AuditLock | Request::AuditUnlock => Reply::Ok,
            Request::FetchPartition { partition } => self.fetch_partition(partition).await,
            Request::ReplacePartition { partition, payload }
            | Request::SyncPartition { partition, payload } => {
                self.replace_partition(partition, &payload).await
            }
        }
    }

    async fn query(&self, account: AccountId) -> Reply {
        let Some(partition) = self.partition(self.config.routing.route(account)) else {
            return Reply::Error(ErrorKind::PartitionNotLocal);
        };
        let data = partition.lock().await;
        match data.balance_of(account) {
            Some(balance) => Reply::Balance(balance),
            None => Reply::Error(ErrorKind::UnknownAccount),
        }
    }

    async fn transfer(&self, source: AccountId, dest: AccountId, amount: Amount) -> Reply {
        let Some(partition) = self.partition(self.config.routing.route(source)) else {
            return Reply::Error(ErrorKind::PartitionNotLocal);
        };

        let snapshot = {
            let mut data = partition.lock().await;
            let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
            if let Err(err) = engine::transfer(&mut data, source, dest, amount, timestamp) {
                info!(source, dest, amount = %amount, reason = %err, "transfer rejected");
                return Reply::Error(err.into());
            }
            // A failed save is logged but never rolls back the commit.
            if let Err(err) = partition.persist(&data).await {
                warn!(partition = partition.id, error = %err, "commit not persisted");
            }
            match serde_json::to_string(&data.accounts) {
                Ok(payload) => Some(payload),
                Err(err) => {
                    warn!(partition = partition.id, error = %err, "snapshot serialization failed");
                    None
                }
            }
        };

        // Replication is fire-and-forget and must never delay the reply.
        if let (Some(peer), Some(payload)) = (self.config.peer.clone(), snapshot) {
            let partition_id = partition.id;
            tokio::spawn(replica::push_snapshot(peer, partition_id, payload));
        }
        Reply::Ok
    }

    async fn audit_total(&self) -> Amount {
        let mut total = Amount::default();
        for partition in self.partitions.values() {
            total += partition.lock().await.balance_total();
        }
        total
    }

    async fn fetch_partition(&self, id: PartitionId) -> Reply {
        let Some(partition) = self.partition(id) else {
            return Reply::Error(ErrorKind::PartitionNotFound);
        };
        let data = partition.lock().await;
        match serde_json::to_string(&data.accounts) {
            Ok(payload) => Reply::Snapshot(payload),
            Err(err) => Reply::Error(ErrorKind::Other(err.to_string())),
        }
    }

    /// Wholesale replacement of a partition's account map, then persist.
    /// Serves both `ACTUALIZAR_PARTICION` and push-sync `SINCRONIZAR`.
    async fn replace_partition(&self, id: PartitionId, payload: &str) -> Reply {
        let Some(partition) = self.partition(id) else {
            return Reply::Error(ErrorKind::PartitionNotFound);
        };
        let accounts = match serde_json::from_str(payload) {
            Ok(accounts) => accounts,
            Err(err) => return Reply::Error(ErrorKind::Other(err.to_string())),
        };

        let mut data = partition.lock().await;
        data.accounts = accounts;
        info!(partition = id, accounts = data.accounts.len(), "partition accounts replaced");
        if let Err(err) = partition.persist(&data).await {
            warn!(partition = id, error = %err, "replacement not persisted");
        }
        Reply::Ok
    }
}

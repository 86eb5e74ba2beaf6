//! Partition store: the in-memory maps of one partition plus their
//! crash-safe backing file.
//!
//! The file holds one pipe-delimited record per line:
//!
//! ```text
//! CLIENTE|<id>|<name>|<email>|<phone>
//! CUENTA|<id>|<client_id>|<balance>|<kind>
//! TRANSACCION|<id>|<src>|<dst>|<amount>|<timestamp>|<status>
//! ```
//!
//! Unknown record tags and extra trailing fields are ignored so older nodes
//! can read files written by newer ones. Saves go through a temp file and an
//! atomic rename; a crash mid-save leaves the previous file intact.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::Amount;
use crate::model::{
    Account, AccountId, Client, ClientId, PartitionId, TransactionRecord, TxId, TxStatus,
};

/// The maps of one partition. All mutation happens while the caller holds the
/// owning [`Partition`]'s lock; this type itself does no locking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionData {
    pub clients: HashMap<ClientId, Client>,
    pub accounts: HashMap<AccountId, Account>,
    pub transactions: HashMap<TxId, TransactionRecord>,
}

impl PartitionData {
    pub fn balance_of(&self, account: AccountId) -> Option<Amount> {
        self.accounts.get(&account).map(|a| a.balance)
    }

    pub fn balance_total(&self) -> Amount {
        self.accounts
            .values()
            .fold(Amount::default(), |sum, account| sum + account.balance)
    }

    /// Parses a partition file. Never fails: unreadable or malformed rows are
    /// skipped with a warning and everything parseable is kept.
    pub fn decode(bytes: &[u8]) -> Self {
        let mut data = PartitionData::default();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        for (row, result) in reader.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    warn!(row, error = %err, "skipping unreadable record");
                    continue;
                }
            };
            let parsed = match record.get(0) {
                Some("CLIENTE") => decode_client(&record)
                    .map(|c| data.clients.insert(c.id, c))
                    .is_some(),
                Some("CUENTA") => decode_account(&record)
                    .map(|a| data.accounts.insert(a.id, a))
                    .is_some(),
                Some("TRANSACCION") => decode_transaction(&record)
                    .map(|t| data.transactions.insert(t.id, t))
                    .is_some(),
                // Unknown tags belong to newer record kinds; not an error.
                _ => true,
            };
            if !parsed {
                warn!(row, kind = record.get(0), "skipping malformed record");
            }
        }
        data
    }

    /// Serializes all records in a stable order.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .flexible(true)
            .from_writer(&mut buf);

        let mut client_ids: Vec<_> = self.clients.keys().copied().collect();
        client_ids.sort_unstable();
        for id in client_ids {
            let client = &self.clients[&id];
            writer
                .write_record([
                    "CLIENTE".to_string(),
                    client.id.to_string(),
                    client.name.clone(),
                    client.email.clone(),
                    client.phone.clone(),
                ])
                .map_err(io::Error::other)?;
        }

        let mut account_ids: Vec<_> = self.accounts.keys().copied().collect();
        account_ids.sort_unstable();
        for id in account_ids {
            let account = &self.accounts[&id];
            writer
                .write_record([
                    "CUENTA".to_string(),
                    account.id.to_string(),
                    account.client_id.to_string(),
                    account.balance.fixed2(),
                    account.kind.clone(),
                ])
                .map_err(io::Error::other)?;
        }

        let mut tx_ids: Vec<_> = self.transactions.keys().copied().collect();
        tx_ids.sort_unstable();
        for id in tx_ids {
            let tx = &self.transactions[&id];
            writer
                .write_record([
                    "TRANSACCION".to_string(),
                    tx.id.to_string(),
                    tx.source.to_string(),
                    tx.dest.to_string(),
                    tx.amount.fixed2(),
                    tx.timestamp.clone(),
                    tx.status.as_wire().to_string(),
                ])
                .map_err(io::Error::other)?;
        }

        writer.flush()?;
        drop(writer);
        Ok(buf)
    }
}

fn decode_client(record: &csv::StringRecord) -> Option<Client> {
    Some(Client {
        id: record.get(1)?.parse().ok()?,
        name: record.get(2)?.to_string(),
        email: record.get(3)?.to_string(),
        phone: record.get(4)?.to_string(),
    })
}

fn decode_account(record: &csv::StringRecord) -> Option<Account> {
    Some(Account {
        id: record.get(1)?.parse().ok()?,
        client_id: record.get(2)?.parse().ok()?,
        balance: Amount::from_float(record.get(3)?.parse().ok()?),
        kind: record.get(4)?.to_string(),
    })
}

fn decode_transaction(record: &csv::StringRecord) -> Option<TransactionRecord> {
    Some(TransactionRecord {
        id: record.get(1)?.parse().ok()?,
        source: record.get(2)?.parse().ok()?,
        dest: record.get(3)?.parse().ok()?,
        amount: Amount::from_float(record.get(4)?.parse().ok()?),
        timestamp: record.get(5)?.to_string(),
        status: TxStatus::from_wire(record.get(6)?).ok()?,
    })
}

/// One locally held partition: its maps behind a lock, and its backing file.
#[derive(Debug)]
pub struct Partition {
    pub id: PartitionId,
    path: PathBuf,
    data: Mutex<PartitionData>,
}

impl Partition {
    /// Loads a partition from its backing file, creating an empty file when
    /// none exists. Read or parse failures degrade to an empty or partial
    /// store; startup never fails on bad data.
    pub async fn open(id: PartitionId, path: PathBuf) -> Self {
        let mut create = false;
        let data = match fs::read(&path).await {
            Ok(bytes) => PartitionData::decode(&bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                create = true;
                PartitionData::default()
            }
            Err(err) => {
                warn!(partition = id, path = %path.display(), error = %err, "failed to read partition file");
                PartitionData::default()
            }
        };

        let partition = Self {
            id,
            path,
            data: Mutex::new(data),
        };
        if create {
            let guard = partition.data.lock().await;
            if let Err(err) = partition.persist(&guard).await {
                warn!(partition = id, error = %err, "failed to create partition file");
            }
        }
        partition
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn lock(&self) -> MutexGuard<'_, PartitionData> {
        self.data.lock().await
    }

    /// Writes the full state to a temp file and renames it over the backing
    /// file. The caller must be holding this partition's lock; persist trusts
    /// that critical section rather than taking the lock again.
    pub async fn persist(&self, data: &PartitionData) -> io::Result<()> {
        let bytes = data.encode()?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: AccountId, client_id: ClientId, balance: f64, kind: &str) -> Account {
        Account {
            id,
            client_id,
            balance: Amount::from_float(balance),
            kind: kind.to_string(),
        }
    }

    fn sample_data() -> PartitionData {
        let mut data = PartitionData::default();
        data.clients.insert(
            1,
            Client {
                id: 1,
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: "555-0100".to_string(),
            },
        );
        data.accounts.insert(100, account(100, 1, 500.0, "CORRIENTE"));
        data.accounts.insert(103, account(103, 1, 0.25, "AHORRO"));
        data.transactions.insert(
            1,
            TransactionRecord {
                id: 1,
                source: 100,
                dest: 103,
                amount: Amount::from_float(150.0),
                timestamp: "2026-08-08 12:00:00".to_string(),
                status: TxStatus::Confirmed,
            },
        );
        data
    }

    #[test]
    fn encode_decode_roundtrip() {
        let data = sample_data();
        let bytes = data.encode().unwrap();
        assert_eq!(PartitionData::decode(&bytes), data);
    }

    #[test]
    fn encode_is_stable_and_readable() {
        let bytes = sample_data().encode().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "CLIENTE|1|Ada Lovelace|ada@example.com|555-0100");
        assert_eq!(lines[1], "CUENTA|100|1|500.00|CORRIENTE");
        assert_eq!(lines[2], "CUENTA|103|1|0.25|AHORRO");
        assert_eq!(
            lines[3],
            "TRANSACCION|1|100|103|150.00|2026-08-08 12:00:00|CONFIRMADA"
        );
    }

    #[test]
    fn decode_skips_malformed_rows() {
        let text = "CUENTA|not-a-number|1|500.00|CORRIENTE\nCUENTA|100|1|500.00|CORRIENTE\nTRANSACCION|1|100\n";
        let data = PartitionData::decode(text.as_bytes());
        assert_eq!(data.accounts.len(), 1);
        assert!(data.accounts.contains_key(&100));
        assert!(data.transactions.is_empty());
    }

    #[test]
    fn decode_ignores_unknown_tags_and_extra_fields() {
        let text = "AUDITORIA|1|algo\nCUENTA|100|1|500.00|CORRIENTE|campo-nuevo\n";
        let data = PartitionData::decode(text.as_bytes());
        assert_eq!(data.accounts.len(), 1);
        assert_eq!(data.balance_of(100), Some(Amount::from_float(500.0)));
    }

    #[test]
    fn decode_empty_input() {
        assert_eq!(PartitionData::decode(b""), PartitionData::default());
    }

    #[test]
    fn balance_total_sums_accounts() {
        let data = sample_data();
        assert_eq!(data.balance_total(), Amount::from_float(500.25));
    }

    #[tokio::test]
    async fn open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("particion_1_rep1.dat");
        let partition = Partition::open(1, path.clone()).await;
        assert!(path.exists());
        assert_eq!(*partition.lock().await, PartitionData::default());
    }

    #[tokio::test]
    async fn persist_then_open_reproduces_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("particion_2_rep1.dat");

        let partition = Partition::open(2, path.clone()).await;
        {
            let mut guard = partition.lock().await;
            *guard = sample_data();
            partition.persist(&guard).await.unwrap();
        }

        let reopened = Partition::open(2, path.clone()).await;
        assert_eq!(*reopened.lock().await, sample_data());
        assert!(!path.with_extension("tmp").exists());
    }
}

//! Core domain types for the partition engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;

/// Client identifier.
pub type ClientId = u32;

/// Account identifier.
pub type AccountId = u32;

/// Partition identifier.
pub type PartitionId = u32;

/// Transaction identifier, a partition-local sequence.
pub type TxId = u32;

/// Timestamp format used for transaction records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A bank client. Immutable after load; no client-mutation command exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A balance-holding account. Mutated only by the transfer engine under the
/// owning partition's lock.
///
/// The serde field names are the wire names of the partition snapshot payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    #[serde(rename = "id_cliente")]
    pub client_id: ClientId,
    #[serde(rename = "saldo")]
    pub balance: Amount,
    #[serde(rename = "tipo")]
    pub kind: String,
}

/// An entry in a partition's append-only transaction log.
///
/// Ids are assigned as the current log length plus one; they are local to one
/// partition and not unique across partitions or nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: TxId,
    pub source: AccountId,
    pub dest: AccountId,
    pub amount: Amount,
    pub timestamp: String,
    pub status: TxStatus,
}

/// Lifecycle state of a logged transaction. Transfers commit atomically under
/// the partition lock, so the only persisted state is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxStatus {
    #[default]
    Confirmed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown transaction status '{0}'")]
pub struct UnknownStatus(String);

impl TxStatus {
    pub fn as_wire(self) -> &'static str {
        match self {
            TxStatus::Confirmed => "CONFIRMADA",
        }
    }

    pub fn from_wire(token: &str) -> Result<Self, UnknownStatus> {
        match token {
            "CONFIRMADA" => Ok(TxStatus::Confirmed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

//! Transfer engine.
//!
//! Executes a balance transfer against one partition's maps. The caller must
//! hold that partition's lock for the whole call; the engine itself does no
//! locking and no I/O, which keeps it directly testable on bare
//! [`PartitionData`].
//!
//! Known limitation, preserved from the original design: the destination
//! account is looked up in the SOURCE partition's map. A destination whose id
//! routes elsewhere is reported as `CUENTA_NO_EXISTE` rather than resolved
//! through its own partition, and only the source partition's lock protects
//! the mutation.

use tracing::info;

use crate::Amount;
use crate::model::{AccountId, TransactionRecord, TxId, TxStatus};
use crate::store::PartitionData;

mod error;
pub use error::TransferError;

/// Moves `amount` from `source` to `dest` inside `data` and appends a
/// confirmed transaction record. On any error the partition is untouched.
///
/// The new record's id is the current log length plus one, a partition-local
/// sequence serialized by the partition lock.
pub fn transfer(
    data: &mut PartitionData,
    source: AccountId,
    dest: AccountId,
    amount: Amount,
    timestamp: String,
) -> Result<TransactionRecord, TransferError> {
    if !data.accounts.contains_key(&dest) {
        return Err(TransferError::UnknownAccount(dest));
    }
    let src = data
        .accounts
        .get_mut(&source)
        .ok_or(TransferError::UnknownAccount(source))?;
    if src.balance < amount {
        return Err(TransferError::InsufficientFunds {
            account: source,
            balance: src.balance,
            requested: amount,
        });
    }

    src.balance -= amount;
    if let Some(dst) = data.accounts.get_mut(&dest) {
        dst.balance += amount;
    }

    let id = data.transactions.len() as TxId + 1;
    let record = TransactionRecord {
        id,
        source,
        dest,
        amount,
        timestamp,
        status: TxStatus::Confirmed,
    };
    data.transactions.insert(id, record.clone());

    info!(tx = id, source, dest, amount = %amount, "transfer applied");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Account;

    fn data_with_accounts(accounts: &[(AccountId, f64)]) -> PartitionData {
        let mut data = PartitionData::default();
        for (id, balance) in accounts {
            data.accounts.insert(
                *id,
                Account {
                    id: *id,
                    client_id: 1,
                    balance: Amount::from_float(*balance),
                    kind: "CORRIENTE".to_string(),
                },
            );
        }
        data
    }

    fn ts() -> String {
        "2026-08-08 12:00:00".to_string()
    }

    #[test]
    fn transfer_moves_balance_and_appends_record() {
        let mut data = data_with_accounts(&[(100, 500.0), (103, 0.0)]);

        let record = transfer(&mut data, 100, 103, Amount::from_float(150.0), ts()).unwrap();

        assert_eq!(data.balance_of(100), Some(Amount::from_float(350.0)));
        assert_eq!(data.balance_of(103), Some(Amount::from_float(150.0)));
        assert_eq!(record.id, 1);
        assert_eq!(record.status, TxStatus::Confirmed);
        assert_eq!(data.transactions.len(), 1);
    }

    #[test]
    fn transfer_conserves_total_balance() {
        let mut data = data_with_accounts(&[(100, 500.0), (103, 42.5)]);
        let before = data.balance_total();

        transfer(&mut data, 100, 103, Amount::from_float(123.45), ts()).unwrap();

        assert_eq!(data.balance_total(), before);
    }

    #[test]
    fn insufficient_funds_leaves_partition_untouched() {
        let mut data = data_with_accounts(&[(100, 100.0), (103, 0.0)]);

        let result = transfer(&mut data, 100, 103, Amount::from_float(100.01), ts());

        assert_eq!(
            result,
            Err(TransferError::InsufficientFunds {
                account: 100,
                balance: Amount::from_float(100.0),
                requested: Amount::from_float(100.01),
            })
        );
        assert_eq!(data.balance_of(100), Some(Amount::from_float(100.0)));
        assert_eq!(data.balance_of(103), Some(Amount::from_float(0.0)));
        assert!(data.transactions.is_empty());
    }

    #[test]
    fn exact_balance_transfer_succeeds() {
        let mut data = data_with_accounts(&[(100, 100.0), (103, 0.0)]);

        transfer(&mut data, 100, 103, Amount::from_float(100.0), ts()).unwrap();

        assert_eq!(data.balance_of(100), Some(Amount::from_float(0.0)));
        assert_eq!(data.balance_of(103), Some(Amount::from_float(100.0)));
    }

    #[test]
    fn unknown_source_fails() {
        let mut data = data_with_accounts(&[(103, 0.0)]);

        let result = transfer(&mut data, 100, 103, Amount::from_float(1.0), ts());

        assert_eq!(result, Err(TransferError::UnknownAccount(100)));
        assert!(data.transactions.is_empty());
    }

    #[test]
    fn unknown_dest_fails_without_debit() {
        let mut data = data_with_accounts(&[(100, 500.0)]);

        let result = transfer(&mut data, 100, 103, Amount::from_float(1.0), ts());

        assert_eq!(result, Err(TransferError::UnknownAccount(103)));
        assert_eq!(data.balance_of(100), Some(Amount::from_float(500.0)));
    }

    #[test]
    fn self_transfer_is_a_net_noop_but_logged() {
        let mut data = data_with_accounts(&[(100, 500.0)]);

        transfer(&mut data, 100, 100, Amount::from_float(50.0), ts()).unwrap();

        assert_eq!(data.balance_of(100), Some(Amount::from_float(500.0)));
        assert_eq!(data.transactions.len(), 1);
    }

    #[test]
    fn transaction_ids_are_a_local_sequence() {
        let mut data = data_with_accounts(&[(100, 500.0), (103, 0.0)]);

        for expected in 1..=3 {
            let record =
                transfer(&mut data, 100, 103, Amount::from_float(10.0), ts()).unwrap();
            assert_eq!(record.id, expected);
        }
    }
}

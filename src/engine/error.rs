//! Error types for transfer processing.

use thiserror::Error;

use crate::Amount;
use crate::model::AccountId;

/// Error from a transfer attempt. Every variant maps onto one wire error
/// code; none of them mutate the partition.
#[derive(Debug, Error, PartialEq)]
pub enum TransferError {
    #[error("account {0} does not exist in the source partition")]
    UnknownAccount(AccountId),

    #[error("insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Amount,
        requested: Amount,
    },
}

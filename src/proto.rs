//! Wire grammar: pipe-delimited request lines and their replies.
//!
//! One request per connection: the node reads a single line, answers a single
//! line, and closes. Parsing never panics; anything the grammar does not
//! accept becomes an `ERROR|COMANDO_INVALIDO` reply at the dispatch layer.

use std::fmt;

use thiserror::Error;

use crate::Amount;
use crate::engine::TransferError;
use crate::model::{AccountId, PartitionId};

/// A parsed request line.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `CONSULTAR|<account>`: read a balance.
    Query { account: AccountId },
    /// `TRANSFERIR|<src>|<dst>|<amount>`: run a transfer.
    Transfer {
        source: AccountId,
        dest: AccountId,
        amount: Amount,
    },
    /// `ARQUEO`: sum balances across all locally held partitions.
    Audit,
    /// `BLOQUEAR_ARQUEO`: no-op hook for external audit tooling.
    AuditLock,
    /// `DESBLOQUEAR_ARQUEO`: no-op hook for external audit tooling.
    AuditUnlock,
    /// `OBTENER_PARTICION|<id>`: fetch a partition's account snapshot.
    FetchPartition { partition: PartitionId },
    /// `ACTUALIZAR_PARTICION|<id>|<json>`: replace a partition's accounts.
    ReplacePartition {
        partition: PartitionId,
        payload: String,
    },
    /// `SINCRONIZAR|<id>|<json>`: push-sync form of the replace operation.
    SyncPartition {
        partition: PartitionId,
        payload: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognized command '{0}'")]
    UnknownVerb(String),
    #[error("{0} is missing arguments")]
    MissingArgument(&'static str),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        // The snapshot payload may itself contain pipes inside JSON strings,
        // so payload-carrying verbs split off at most two fields.
        let mut parts = line.trim().splitn(3, '|');
        let verb = parts.next().unwrap_or_default();
        match verb {
            "CONSULTAR" => Ok(Request::Query {
                account: parse_id(next_field(&mut parts, "CONSULTAR")?)?,
            }),
            "TRANSFERIR" => {
                let source = parse_id(next_field(&mut parts, "TRANSFERIR")?)?;
                let mut tail = next_field(&mut parts, "TRANSFERIR")?.splitn(2, '|');
                let dest = parse_id(tail.next().unwrap_or_default())?;
                let amount = parse_amount(
                    tail.next()
                        .ok_or(ParseError::MissingArgument("TRANSFERIR"))?,
                )?;
                Ok(Request::Transfer {
                    source,
                    dest,
                    amount,
                })
            }
            "ARQUEO" => Ok(Request::Audit),
            "BLOQUEAR_ARQUEO" => Ok(Request::AuditLock),
            "DESBLOQUEAR_ARQUEO" => Ok(Request::AuditUnlock),
            "OBTENER_PARTICION" => Ok(Request::FetchPartition {
                partition: parse_id(next_field(&mut parts, "OBTENER_PARTICION")?)?,
            }),
            "ACTUALIZAR_PARTICION" => {
                let (partition, payload) = parse_payload(&mut parts, "ACTUALIZAR_PARTICION")?;
                Ok(Request::ReplacePartition { partition, payload })
            }
            "SINCRONIZAR" => {
                let (partition, payload) = parse_payload(&mut parts, "SINCRONIZAR")?;
                Ok(Request::SyncPartition { partition, payload })
            }
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

fn next_field<'a>(
    parts: &mut std::str::SplitN<'a, char>,
    verb: &'static str,
) -> Result<&'a str, ParseError> {
    parts.next().ok_or(ParseError::MissingArgument(verb))
}

fn parse_payload(
    parts: &mut std::str::SplitN<'_, char>,
    verb: &'static str,
) -> Result<(PartitionId, String), ParseError> {
    let partition = parse_id(next_field(parts, verb)?)?;
    let payload = next_field(parts, verb)?.to_string();
    Ok((partition, payload))
}

fn parse_id(field: &str) -> Result<u32, ParseError> {
    field
        .parse()
        .map_err(|_| ParseError::InvalidNumber(field.to_string()))
}

fn parse_amount(field: &str) -> Result<Amount, ParseError> {
    field
        .parse::<f64>()
        .map(Amount::from_float)
        .map_err(|_| ParseError::InvalidNumber(field.to_string()))
}

/// Error codes a client can branch on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// `CUENTA_NO_EXISTE`
    UnknownAccount,
    /// `SALDO_INSUFICIENTE`
    InsufficientFunds,
    /// `PARTICION_NO_LOCAL`: the routed partition is not held by this node.
    PartitionNotLocal,
    /// `PARTICION_NO_EXISTE`: snapshot verbs name a partition not held here.
    PartitionNotFound,
    /// `COMANDO_INVALIDO`
    InvalidCommand,
    /// Free-form detail, e.g. a snapshot payload that failed to parse.
    Other(String),
}

impl From<TransferError> for ErrorKind {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::UnknownAccount(_) => ErrorKind::UnknownAccount,
            TransferError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnknownAccount => write!(f, "CUENTA_NO_EXISTE"),
            ErrorKind::InsufficientFunds => write!(f, "SALDO_INSUFICIENTE"),
            ErrorKind::PartitionNotLocal => write!(f, "PARTICION_NO_LOCAL"),
            ErrorKind::PartitionNotFound => write!(f, "PARTICION_NO_EXISTE"),
            ErrorKind::InvalidCommand => write!(f, "COMANDO_INVALIDO"),
            ErrorKind::Other(detail) => write!(f, "{detail}"),
        }
    }
}

/// A reply line, rendered through `Display`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `SALDO|<balance>`
    Balance(Amount),
    /// `OK`
    Ok,
    /// `ARQUEO|<total>` with exactly two decimal places.
    Audit(Amount),
    /// Raw serialized account map.
    Snapshot(String),
    /// `ERROR|<kind>`
    Error(ErrorKind),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Balance(amount) => write!(f, "SALDO|{amount}"),
            Reply::Ok => write!(f, "OK"),
            Reply::Audit(total) => write!(f, "ARQUEO|{}", total.fixed2()),
            Reply::Snapshot(payload) => write!(f, "{payload}"),
            Reply::Error(kind) => write!(f, "ERROR|{kind}"),
        }
    }
}

//! Database store module for the ledger API.
//!
//! ## Design decisions
//!
//! ### Optimistic concurrency
//! - Balance updates always carry a `WHERE id = $1 AND version = $2` guard.
//!   A zero-rows-affected result is surfaced as `StoreError::VersionConflict`
//!   rather than silently succeeding; the orchestrator decides whether to
//!   retry.
//!
//! ### Time source dependency
//! - Functions that stamp `created_at` accept a `TimeSource` rather than
//!   calling `Timestamp::now()` directly, so tests can pin the clock.
//!
//! ### Type safety
//! - Every id type implements `sqlx::Type` (see `payloads`), so queries bind
//!   and select them without touching the inner `Uuid`.

use jiff_sqlx::Timestamp as SqlxTs;
use payloads::BalanceId;

use crate::time::TimeSource;

pub mod balance;
pub mod ledger;
pub mod monitor;
pub mod transaction;

pub use balance::BalanceRow;
pub use ledger::LedgerRow;
pub use monitor::MonitorRow;
pub use transaction::TransactionRow;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("ledger not found")]
    LedgerNotFound,
    #[error("balance not found")]
    BalanceNotFound,
    #[error("transaction not found")]
    TransactionNotFound,
    #[error("balance monitor not found")]
    MonitorNotFound,
    #[error("reference already used: {reference}")]
    DuplicateReference { reference: String },
    #[error("optimistic concurrency conflict on balance {balance_id}")]
    VersionConflict { balance_id: BalanceId },
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Convert a `jiff::Timestamp` into the type sqlx can bind for a Postgres
/// `timestamptz` column.
pub(crate) fn ts(t: jiff::Timestamp) -> SqlxTs {
    jiff_sqlx::ToSqlx::to_sqlx(t)
}

pub(crate) fn now(time_source: &TimeSource) -> SqlxTs {
    ts(time_source.now())
}

pub use payloads::{BalanceRef, GENERAL_LEDGER_ID};

use crate::{BalanceId, BalanceRef, LedgerId, MonitorField, MonitorId, MonitorOperator};
use crate::{TransactionId, TransactionStatus};
use jiff::Timestamp;
#[cfg(feature = "use-sqlx")]
use jiff_sqlx::Timestamp as SqlxTs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct LedgerResponse {
    pub id: LedgerId,
    pub name: String,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
}

/// A balance and its six running counters, exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct BalanceResponse {
    pub id: BalanceId,
    pub ledger_id: LedgerId,
    pub indicator: Option<String>,
    pub currency: String,
    pub precision: i64,
    pub balance: i64,
    pub credit_balance: i64,
    pub debit_balance: i64,
    pub inflight_balance: i64,
    pub inflight_credit_balance: i64,
    pub inflight_debit_balance: i64,
    pub version: i64,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionLineResponse {
    pub balance: BalanceRef,
    pub amount: f64,
    pub precise_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub ledger_id: LedgerId,
    pub parent_transaction: Option<TransactionId>,
    pub source: BalanceRef,
    pub destination: BalanceRef,
    pub amount: f64,
    pub precise_amount: i64,
    pub precision: i64,
    pub currency: String,
    pub rate: f64,
    pub reference: String,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub inflight: bool,
    pub allow_overdraft: bool,
    pub inflight_expiry: Option<Timestamp>,
    pub scheduled_for: Option<Timestamp>,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub created_at: Timestamp,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorResponse {
    pub id: MonitorId,
    pub balance_id: BalanceId,
    pub field: MonitorField,
    pub operator: MonitorOperator,
    pub threshold: i64,
    pub description: Option<String>,
    pub call_back_url: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessMessage {
    pub message: String,
}

use crate::{BalanceId, BalanceRef, DistributionLeg, LedgerId, MonitorField, MonitorOperator};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

pub const REFERENCE_MAX_LEN: usize = 255;
pub const INDICATOR_MAX_LEN: usize = 255;

/// Validation result for a transaction client reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceValidation {
    Valid,
    Empty,
    TooLong,
}

impl ReferenceValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::Empty => Some("reference must not be empty"),
            Self::TooLong => Some("reference must be at most 255 characters"),
        }
    }
}

/// Validate a client-supplied transaction reference.
///
/// References are opaque to the ledger beyond uniqueness; they are not
/// parsed, only bounded in length.
pub fn validate_reference(reference: &str) -> ReferenceValidation {
    if reference.is_empty() {
        return ReferenceValidation::Empty;
    }
    if reference.len() > REFERENCE_MAX_LEN {
        return ReferenceValidation::TooLong;
    }
    ReferenceValidation::Valid
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateLedgerRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBalanceRequest {
    pub ledger_id: LedgerId,
    /// An `@indicator` alias this balance should resolve under within its
    /// ledger. Optional; balances may be addressed solely by id.
    pub indicator: Option<String>,
    pub currency: String,
    pub precision: i64,
}

/// The request shape accepted by `POST /api/transactions`.
///
/// Mirrors the orchestrator's `QueueTransaction` operation: a transaction is
/// always queued first and only applied once its turn comes up on the
/// destination/source shard queues.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueTransactionRequest {
    pub reference: String,
    pub source: BalanceRef,
    pub destination: BalanceRef,
    pub amount: f64,
    pub precision: i64,
    pub currency: String,
    /// Conversion rate applied to `amount` when source and destination
    /// currencies differ; `1.0` for same-currency transfers.
    #[serde(default = "default_rate")]
    pub rate: f64,
    pub description: Option<String>,
    /// If true, the transaction lands in `INFLIGHT` status and must be
    /// explicitly committed or voided rather than settling immediately.
    #[serde(default)]
    pub inflight: bool,
    /// Delay application until this time instead of as soon as the queue
    /// reaches it.
    pub scheduled_for: Option<Timestamp>,
    /// Per-leg overrides of the default even split, for multi-destination
    /// transactions.
    #[serde(default)]
    pub distributions: Vec<DistributionLeg>,
    /// Allow the source balance to go negative past its available credit.
    #[serde(default)]
    pub allow_overdraft: bool,
}

fn default_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InflightAction {
    Commit,
    Void,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateInflightRequest {
    pub status: InflightAction,
    /// Amount to settle on a commit; defaults to the full inflight amount
    /// when omitted. Ignored for `void`.
    pub amount: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefundTransactionRequest {
    pub reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMonitorRequest {
    pub balance_id: BalanceId,
    pub field: MonitorField,
    pub operator: MonitorOperator,
    pub threshold: i64,
    pub description: Option<String>,
    pub call_back_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateMonitorRequest {
    pub operator: Option<MonitorOperator>,
    pub threshold: Option<i64>,
    pub description: Option<String>,
    pub call_back_url: Option<String>,
}

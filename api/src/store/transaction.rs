use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTs;
use payloads::{BalanceRef, LedgerId, TransactionId, TransactionStatus};
use sqlx::{postgres::Postgres, FromRow, PgPool};

use super::StoreError;

/// Bridges a nullable Postgres timestamptz column to `Option<jiff::Timestamp>`
/// for `#[sqlx(try_from = ...)]`: `jiff_sqlx` only implements `From<Timestamp>
/// for jiff::Timestamp`, not the `Option` case, so `FromRow` can't derive the
/// conversion directly.
struct OptionalTimestamp(Option<SqlxTs>);

impl sqlx::Type<Postgres> for OptionalTimestamp {
    fn type_info() -> <Postgres as sqlx::Database>::TypeInfo {
        <Option<SqlxTs> as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Postgres> for OptionalTimestamp {
    fn decode(
        value: <Postgres as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(OptionalTimestamp(
            <Option<SqlxTs> as sqlx::Decode<Postgres>>::decode(value)?,
        ))
    }
}

impl TryFrom<OptionalTimestamp> for Option<Timestamp> {
    type Error = std::convert::Infallible;

    fn try_from(value: OptionalTimestamp) -> Result<Self, Self::Error> {
        Ok(value.0.map(Into::into))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
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
    #[sqlx(try_from = "OptionalTimestamp")]
    pub inflight_expiry: Option<Timestamp>,
    #[sqlx(try_from = "OptionalTimestamp")]
    pub scheduled_for: Option<Timestamp>,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
    pub hash: String,
}

impl From<TransactionRow> for payloads::responses::TransactionResponse {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            ledger_id: row.ledger_id,
            parent_transaction: row.parent_transaction,
            source: row.source,
            destination: row.destination,
            amount: row.amount,
            precise_amount: row.precise_amount,
            precision: row.precision,
            currency: row.currency,
            rate: row.rate,
            reference: row.reference,
            description: row.description,
            status: row.status,
            inflight: row.inflight,
            allow_overdraft: row.allow_overdraft,
            inflight_expiry: row.inflight_expiry,
            scheduled_for: row.scheduled_for,
            created_at: row.created_at,
            hash: row.hash,
        }
    }
}

const TRANSACTION_COLUMNS: &str = "id, ledger_id, parent_transaction,
    source, destination, amount, precise_amount, precision, currency, rate,
    reference, description, status, inflight, allow_overdraft,
    inflight_expiry, scheduled_for, created_at, hash";

/// Insert a new transaction row. Must be called at most once per
/// `transaction_id`; the caller is responsible for having already checked
/// reference uniqueness.
#[tracing::instrument(skip(row, pool))]
pub async fn record_transaction(
    row: &TransactionRow,
    pool: &PgPool,
) -> Result<(), StoreError> {
    let query = format!(
        "INSERT INTO transactions ({TRANSACTION_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                 $11, $12, $13, $14, $15, $16, $17, $18, $19)"
    );
    sqlx::query(&query)
        .bind(row.id)
        .bind(row.ledger_id)
        .bind(row.parent_transaction)
        .bind(&row.source)
        .bind(&row.destination)
        .bind(row.amount)
        .bind(row.precise_amount)
        .bind(row.precision)
        .bind(&row.currency)
        .bind(row.rate)
        .bind(&row.reference)
        .bind(&row.description)
        .bind(row.status)
        .bind(row.inflight)
        .bind(row.allow_overdraft)
        .bind(row.inflight_expiry.map(super::ts))
        .bind(row.scheduled_for.map(super::ts))
        .bind(super::ts(row.created_at))
        .bind(&row.hash)
        .execute(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateReference {
                    reference: row.reference.clone(),
                }
            }
            _ => StoreError::Database(e),
        })?;

    Ok(())
}

#[tracing::instrument(skip(pool))]
pub async fn get_transaction(
    id: &TransactionId,
    pool: &PgPool,
) -> Result<TransactionRow, StoreError> {
    let query =
        format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
    sqlx::query_as::<_, TransactionRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::TransactionNotFound)
}

/// True if any transaction row — regardless of status — already carries
/// `reference`. Rejected references are not reusable: existence is checked
/// irrespective of status.
#[tracing::instrument(skip(pool))]
pub async fn transaction_exists_by_ref(
    reference: &str,
    pool: &PgPool,
) -> Result<bool, StoreError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM transactions WHERE reference = $1)",
    )
    .bind(reference)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Sum of `precise_amount` over children of `parent_id` with status
/// APPLIED.
#[tracing::instrument(skip(pool))]
pub async fn get_total_committed(
    parent_id: &TransactionId,
    pool: &PgPool,
) -> Result<i64, StoreError> {
    let sum: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(precise_amount) FROM transactions
         WHERE parent_transaction = $1 AND status = $2",
    )
    .bind(parent_id)
    .bind(TransactionStatus::Applied)
    .fetch_one(pool)
    .await?;
    Ok(sum.unwrap_or(0))
}

#[tracing::instrument(skip(pool))]
pub async fn is_parent_void(
    parent_id: &TransactionId,
    pool: &PgPool,
) -> Result<bool, StoreError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM transactions
            WHERE parent_transaction = $1 AND status = $2
        )",
    )
    .bind(parent_id)
    .bind(TransactionStatus::Void)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Update only the status of a transaction row (the QUEUED/SCHEDULED ->
/// APPLIED transition; INFLIGHT rows keep their own status forever and are
/// closed out via child rows instead).
#[tracing::instrument(skip(pool))]
pub async fn update_status(
    id: &TransactionId,
    status: TransactionStatus,
    pool: &PgPool,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE transactions SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTs;
use payloads::{BalanceId, BalanceRef, LedgerId};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::StoreError;
use crate::engine::BalanceSnapshot;
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub struct BalanceRow {
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
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
}

impl From<BalanceRow> for payloads::responses::BalanceResponse {
    fn from(row: BalanceRow) -> Self {
        Self {
            id: row.id,
            ledger_id: row.ledger_id,
            indicator: row.indicator,
            currency: row.currency,
            precision: row.precision,
            balance: row.balance,
            credit_balance: row.credit_balance,
            debit_balance: row.debit_balance,
            inflight_balance: row.inflight_balance,
            inflight_credit_balance: row.inflight_credit_balance,
            inflight_debit_balance: row.inflight_debit_balance,
            version: row.version,
            created_at: row.created_at,
        }
    }
}

impl From<&BalanceRow> for BalanceSnapshot {
    fn from(row: &BalanceRow) -> Self {
        Self {
            id: row.id,
            currency: row.currency.clone(),
            precision: row.precision,
            balance: row.balance,
            credit_balance: row.credit_balance,
            debit_balance: row.debit_balance,
            inflight_balance: row.inflight_balance,
            inflight_credit_balance: row.inflight_credit_balance,
            inflight_debit_balance: row.inflight_debit_balance,
            version: row.version,
        }
    }
}

const BALANCE_COLUMNS: &str = "id, ledger_id, indicator, currency, precision,
    balance, credit_balance, debit_balance,
    inflight_balance, inflight_credit_balance, inflight_debit_balance,
    version, created_at";

#[tracing::instrument(skip(pool, time_source))]
pub async fn create_balance(
    ledger_id: &LedgerId,
    indicator: Option<&str>,
    currency: &str,
    precision: i64,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<BalanceRow, StoreError> {
    let query = format!(
        "INSERT INTO balances (
            id, ledger_id, indicator, currency, precision,
            balance, credit_balance, debit_balance,
            inflight_balance, inflight_credit_balance, inflight_debit_balance,
            version, created_at
        ) VALUES ($1, $2, $3, $4, $5, 0, 0, 0, 0, 0, 0, 1, $6)
        RETURNING {BALANCE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, BalanceRow>(&query)
        .bind(BalanceId::new())
        .bind(ledger_id)
        .bind(indicator)
        .bind(currency)
        .bind(precision)
        .bind(super::now(time_source))
        .fetch_one(pool)
        .await?;

    Ok(row)
}

#[tracing::instrument(skip(pool))]
pub async fn get_balance(
    id: &BalanceId,
    pool: &PgPool,
) -> Result<BalanceRow, StoreError> {
    let query = format!("SELECT {BALANCE_COLUMNS} FROM balances WHERE id = $1");
    sqlx::query_as::<_, BalanceRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::BalanceNotFound)
}

#[tracing::instrument(skip(pool))]
pub async fn get_balance_by_indicator(
    indicator: &str,
    currency: &str,
    pool: &PgPool,
) -> Result<Option<BalanceRow>, StoreError> {
    let query = format!(
        "SELECT {BALANCE_COLUMNS} FROM balances
         WHERE indicator = $1 AND currency = $2"
    );
    Ok(sqlx::query_as::<_, BalanceRow>(&query)
        .bind(indicator)
        .bind(currency)
        .fetch_optional(pool)
        .await?)
}

/// Resolve a `BalanceRef` to a concrete row, auto-creating an indicator
/// balance in the general ledger on first reference.
#[tracing::instrument(skip(pool, time_source))]
pub async fn resolve(
    balance_ref: &BalanceRef,
    currency: &str,
    precision: i64,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<BalanceRow, StoreError> {
    match balance_ref {
        BalanceRef::Id(id) => get_balance(id, pool).await,
        BalanceRef::Indicator(indicator) => {
            if let Some(row) =
                get_balance_by_indicator(indicator, currency, pool).await?
            {
                return Ok(row);
            }
            let general_ledger_id = payloads::general_ledger_id();
            create_balance(
                &general_ledger_id,
                Some(indicator),
                currency,
                precision,
                time_source,
                pool,
            )
            .await
        }
    }
}

/// Persist both sides of a balance update in a single ACID unit, guarded by
/// each row's `version`. A zero-rows-affected update is a hard error: the
/// whole transaction is rolled back and the caller should retry from a
/// fresh snapshot.
#[tracing::instrument(skip(tx, source, destination))]
pub async fn update_balances(
    source: &BalanceSnapshot,
    destination: &BalanceSnapshot,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    update_one(source, &mut *tx).await?;
    update_one(destination, &mut *tx).await?;
    Ok(())
}

async fn update_one(
    snapshot: &BalanceSnapshot,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE balances SET
            balance = $1,
            credit_balance = $2,
            debit_balance = $3,
            inflight_balance = $4,
            inflight_credit_balance = $5,
            inflight_debit_balance = $6,
            version = version + 1
         WHERE id = $7 AND version = $8",
    )
    .bind(snapshot.balance)
    .bind(snapshot.credit_balance)
    .bind(snapshot.debit_balance)
    .bind(snapshot.inflight_balance)
    .bind(snapshot.inflight_credit_balance)
    .bind(snapshot.inflight_debit_balance)
    .bind(snapshot.id)
    .bind(snapshot.version)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::VersionConflict {
            balance_id: snapshot.id,
        });
    }

    Ok(())
}

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTs;
use payloads::LedgerId;
use sqlx::{FromRow, PgPool};

use super::StoreError;
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub struct LedgerRow {
    pub id: LedgerId,
    pub name: String,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
}

impl From<LedgerRow> for payloads::responses::LedgerResponse {
    fn from(row: LedgerRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[tracing::instrument(skip(pool, time_source))]
pub async fn create_ledger(
    name: &str,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<LedgerRow, StoreError> {
    let row = sqlx::query_as::<_, LedgerRow>(
        "INSERT INTO ledgers (id, name, created_at)
         VALUES ($1, $2, $3)
         RETURNING id, name, created_at",
    )
    .bind(LedgerId::new())
    .bind(name)
    .bind(super::now(time_source))
    .fetch_one(pool)
    .await?;

    Ok(row)
}

#[tracing::instrument(skip(pool))]
pub async fn get_ledger(
    id: &LedgerId,
    pool: &PgPool,
) -> Result<LedgerRow, StoreError> {
    sqlx::query_as::<_, LedgerRow>(
        "SELECT id, name, created_at FROM ledgers WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::LedgerNotFound)
}

#[tracing::instrument(skip(pool))]
pub async fn get_all_ledgers(pool: &PgPool) -> Result<Vec<LedgerRow>, StoreError> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        "SELECT id, name, created_at FROM ledgers ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Ensure the distinguished general ledger (used for auto-created indicator
/// balances) exists, creating it on first use.
#[tracing::instrument(skip(pool, time_source))]
pub async fn ensure_general_ledger(
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<LedgerId, StoreError> {
    let general_id = payloads::general_ledger_id();

    let existing: Option<LedgerId> =
        sqlx::query_scalar("SELECT id FROM ledgers WHERE id = $1")
            .bind(general_id)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Ok(general_id);
    }

    sqlx::query(
        "INSERT INTO ledgers (id, name, created_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(general_id)
    .bind(payloads::GENERAL_LEDGER_ID)
    .bind(super::now(time_source))
    .execute(pool)
    .await?;

    Ok(general_id)
}

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTs;
use payloads::{BalanceId, MonitorField, MonitorId, MonitorOperator};
use sqlx::{FromRow, PgPool};

use super::StoreError;
use crate::time::TimeSource;

#[derive(Debug, Clone, FromRow)]
pub struct MonitorRow {
    pub id: MonitorId,
    pub balance_id: BalanceId,
    pub field: MonitorField,
    pub operator: MonitorOperator,
    pub threshold: i64,
    pub description: Option<String>,
    pub call_back_url: Option<String>,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
}

impl From<MonitorRow> for payloads::responses::MonitorResponse {
    fn from(row: MonitorRow) -> Self {
        Self {
            id: row.id,
            balance_id: row.balance_id,
            field: row.field,
            operator: row.operator,
            threshold: row.threshold,
            description: row.description,
            call_back_url: row.call_back_url,
            created_at: row.created_at,
        }
    }
}

const MONITOR_COLUMNS: &str =
    "id, balance_id, field, operator, threshold, description, call_back_url, created_at";

#[tracing::instrument(skip(pool, time_source))]
pub async fn create_monitor(
    balance_id: &BalanceId,
    field: MonitorField,
    operator: MonitorOperator,
    threshold: i64,
    description: Option<&str>,
    call_back_url: Option<&str>,
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<MonitorRow, StoreError> {
    let query = format!(
        "INSERT INTO balance_monitors (
            id, balance_id, field, operator, threshold, description, call_back_url, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {MONITOR_COLUMNS}"
    );
    let row = sqlx::query_as::<_, MonitorRow>(&query)
        .bind(MonitorId::new())
        .bind(balance_id)
        .bind(field)
        .bind(operator)
        .bind(threshold)
        .bind(description)
        .bind(call_back_url)
        .bind(super::now(time_source))
        .fetch_one(pool)
        .await?;

    Ok(row)
}

#[tracing::instrument(skip(pool))]
pub async fn get_monitor(
    id: &MonitorId,
    pool: &PgPool,
) -> Result<MonitorRow, StoreError> {
    let query =
        format!("SELECT {MONITOR_COLUMNS} FROM balance_monitors WHERE id = $1");
    sqlx::query_as::<_, MonitorRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::MonitorNotFound)
}

#[tracing::instrument(skip(pool))]
pub async fn list_monitors_for_balance(
    balance_id: &BalanceId,
    pool: &PgPool,
) -> Result<Vec<MonitorRow>, StoreError> {
    let query = format!(
        "SELECT {MONITOR_COLUMNS} FROM balance_monitors WHERE balance_id = $1"
    );
    let rows = sqlx::query_as::<_, MonitorRow>(&query)
        .bind(balance_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[tracing::instrument(skip(pool))]
pub async fn update_monitor(
    id: &MonitorId,
    operator: Option<MonitorOperator>,
    threshold: Option<i64>,
    description: Option<Option<&str>>,
    call_back_url: Option<&str>,
    pool: &PgPool,
) -> Result<MonitorRow, StoreError> {
    let existing = get_monitor(id, pool).await?;

    let operator = operator.unwrap_or(existing.operator);
    let threshold = threshold.unwrap_or(existing.threshold);
    let description = match description {
        Some(d) => d.map(str::to_string),
        None => existing.description.clone(),
    };
    let call_back_url = call_back_url
        .map(str::to_string)
        .or_else(|| existing.call_back_url.clone());

    let query = format!(
        "UPDATE balance_monitors SET
            operator = $1, threshold = $2, description = $3, call_back_url = $4
         WHERE id = $5
         RETURNING {MONITOR_COLUMNS}"
    );
    let row = sqlx::query_as::<_, MonitorRow>(&query)
        .bind(operator)
        .bind(threshold)
        .bind(description)
        .bind(call_back_url)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::MonitorNotFound)?;

    Ok(row)
}

#[tracing::instrument(skip(pool))]
pub async fn delete_monitor(
    id: &MonitorId,
    pool: &PgPool,
) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM balance_monitors WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::MonitorNotFound);
    }

    Ok(())
}

//! Balance monitor evaluation.
//!
//! Runs after every persisted balance update. Matches are pushed onto the
//! webhook queue rather than delivered inline, so a slow or unreachable
//! callback can never hold up the balance-mutating path that triggered it.

use jiff::Timestamp;
use payloads::MonitorField;
use sqlx::PgPool;

use crate::queue::{QueueError, QueueName, TaskQueue};
use crate::store::{monitor, BalanceRow};

fn field_value(balance: &BalanceRow, field: MonitorField) -> i64 {
    match field {
        MonitorField::Balance => balance.balance,
        MonitorField::CreditBalance => balance.credit_balance,
        MonitorField::DebitBalance => balance.debit_balance,
        MonitorField::InflightBalance => balance.inflight_balance,
        MonitorField::InflightCreditBalance => balance.inflight_credit_balance,
        MonitorField::InflightDebitBalance => balance.inflight_debit_balance,
    }
}

/// Evaluate every monitor registered against `balance`, enqueueing a
/// `balance.monitor` webhook task for each one whose condition now holds.
/// Best-effort: failures are logged by the caller (typically inside a
/// detached `tokio::spawn`) and never roll back the transaction that
/// triggered the update.
#[tracing::instrument(skip(balance, pool, queue))]
pub async fn evaluate(
    balance: &BalanceRow,
    pool: &PgPool,
    queue: &TaskQueue,
    now: Timestamp,
) -> Result<(), QueueError> {
    let monitors = match monitor::list_monitors_for_balance(&balance.id, pool).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "failed to load monitors for balance");
            return Ok(());
        }
    };

    for m in monitors {
        let actual = field_value(balance, m.field);
        if !m.operator.evaluate(actual, m.threshold) {
            continue;
        }

        let payload = serde_json::json!({
            "event": "balance.monitor",
            "monitor_id": m.id.to_string(),
            "balance_id": balance.id.to_string(),
            "field": m.field,
            "operator": m.operator,
            "threshold": m.threshold,
            "actual": actual,
            "call_back_url": m.call_back_url,
        });
        queue
            .push(
                QueueName::Webhook,
                &format!("monitor:{}:{actual}", m.id),
                payload,
                now,
            )
            .await?;
    }

    Ok(())
}

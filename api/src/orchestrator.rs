//! Transaction choreography: queueing, applying, committing, voiding and
//! refunding transactions against the balance engine.
//!
//! Every balance-mutating step acquires the distributed lock keyed on the
//! *source* balance id before touching either side, so concurrent workers on
//! the same source serialize while unrelated sources proceed in parallel.

use std::time::Duration;

use payloads::{
    requests::QueueTransactionRequest, LedgerId, TransactionId, TransactionStatus,
};
use sqlx::PgPool;

use crate::engine::{self, BalanceSnapshot, EngineError, EngineTransaction};
use crate::lock::{DistributedLock, LockError};
use crate::money;
use crate::queue::{QueueError, QueueName, Task, TaskQueue};
use crate::store::{balance, ledger, transaction, StoreError, TransactionRow};
use crate::time::TimeSource;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("reference already used: {reference}")]
    DuplicateReference { reference: String },
    #[error("ledger not found")]
    LedgerNotFound,
    #[error("balance not found")]
    BalanceNotFound,
    #[error("transaction not found")]
    TransactionNotFound,
    #[error("balance monitor not found")]
    MonitorNotFound,
    #[error("transaction {transaction_id} is not in the expected state for this operation")]
    InvalidState { transaction_id: TransactionId },
    #[error("commit amount out of range: {amount} not in [1, {remaining}]")]
    InvalidAmount { amount: i64, remaining: i64 },
    #[error("transaction {transaction_id} is already fully committed")]
    AlreadyCommitted { transaction_id: TransactionId },
    #[error("transaction {transaction_id} was already voided")]
    AlreadyVoided { transaction_id: TransactionId },
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("currency mismatch")]
    CurrencyMismatch,
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<EngineError> for LedgerError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InsufficientFunds => Self::InsufficientFunds,
            EngineError::SourceCurrencyMismatch
            | EngineError::DestinationCurrencyMismatch => Self::CurrencyMismatch,
        }
    }
}

/// Maps a not-found store error raised while loading a transaction into the
/// orchestrator's own `TransactionNotFound`, since `StoreError::*NotFound`
/// already distinguishes by entity elsewhere (balances, ledgers).
fn map_lookup(e: StoreError) -> LedgerError {
    match e {
        StoreError::TransactionNotFound => LedgerError::TransactionNotFound,
        StoreError::BalanceNotFound => LedgerError::BalanceNotFound,
        StoreError::LedgerNotFound => LedgerError::LedgerNotFound,
        StoreError::MonitorNotFound => LedgerError::MonitorNotFound,
        StoreError::DuplicateReference { reference } => {
            LedgerError::DuplicateReference { reference }
        }
        other => LedgerError::Store(other),
    }
}

const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30 * 60);
const LOCK_RETRIES: u32 = 5;
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const VERSION_CONFLICT_RETRY_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Clone)]
pub struct Orchestrator {
    pool: PgPool,
    lock: DistributedLock,
    queue: TaskQueue,
    time_source: TimeSource,
    max_retries: u32,
}

impl Orchestrator {
    pub fn new(
        pool: PgPool,
        lock: DistributedLock,
        queue: TaskQueue,
        time_source: TimeSource,
        max_retries: u32,
    ) -> Self {
        Self {
            pool,
            lock,
            queue,
            time_source,
            max_retries,
        }
    }

    /// `QueueTransaction`: validates, stamps, persists and enqueues a new
    /// transaction (and its distribution children, if any), returning the
    /// parent row synchronously. The actual balance mutation happens later,
    /// out-of-band, when a shard worker calls [`Self::record_transaction`].
    #[tracing::instrument(skip(self, req))]
    pub async fn queue_transaction(
        &self,
        ledger_id: LedgerId,
        req: QueueTransactionRequest,
    ) -> Result<TransactionRow, LedgerError> {
        self.queue_transaction_with_parent(ledger_id, None, req).await
    }

    /// Same as [`Self::queue_transaction`], but stamps `parent` onto the
    /// top-level row instead of leaving it `None` — used by
    /// [`Self::refund_transaction`] to link a refund back to the
    /// transaction it reverses.
    async fn queue_transaction_with_parent(
        &self,
        ledger_id: LedgerId,
        parent_override: Option<TransactionId>,
        req: QueueTransactionRequest,
    ) -> Result<TransactionRow, LedgerError> {
        if transaction::transaction_exists_by_ref(&req.reference, &self.pool)
            .await
            .map_err(map_lookup)?
        {
            return Err(LedgerError::DuplicateReference {
                reference: req.reference,
            });
        }

        let now = self.time_source.now();
        let status = if req.scheduled_for.is_some_and(|t| t > now) {
            TransactionStatus::Scheduled
        } else if req.inflight {
            TransactionStatus::Inflight
        } else {
            TransactionStatus::Queued
        };

        if req.distributions.is_empty() {
            let row = self
                .build_row(
                    &ledger_id,
                    parent_override,
                    &req,
                    &req.reference,
                    req.amount,
                    status,
                    now,
                )
                .await?;
            transaction::record_transaction(&row, &self.pool)
                .await
                .map_err(map_lookup)?;
            self.enqueue(&row).await?;
            return Ok(row);
        }

        // Distribution split: the parent row is a bookkeeping record only
        // (never itself engine-applied); each leg is an independent child
        // transaction queued against its own destination.
        let parent = self
            .build_row(
                &ledger_id,
                parent_override,
                &req,
                &req.reference,
                req.amount,
                status,
                now,
            )
            .await?;
        transaction::record_transaction(&parent, &self.pool)
            .await
            .map_err(map_lookup)?;

        for (i, leg) in req.distributions.iter().enumerate() {
            let leg_amount = match (leg.fraction, leg.amount) {
                (Some(fraction), _) => req.amount * fraction,
                (None, Some(amount)) => amount,
                (None, None) => continue,
            };
            let leg_reference = format!("{}-{i}", req.reference);
            let leg_req = QueueTransactionRequest {
                reference: leg_reference.clone(),
                source: req.source.clone(),
                destination: leg.balance.clone(),
                amount: leg_amount,
                precision: req.precision,
                currency: req.currency.clone(),
                rate: req.rate,
                description: req.description.clone(),
                inflight: req.inflight,
                scheduled_for: req.scheduled_for,
                distributions: Vec::new(),
                allow_overdraft: req.allow_overdraft,
            };
            let child = self
                .build_row(
                    &ledger_id,
                    Some(parent.id),
                    &leg_req,
                    &leg_reference,
                    leg_amount,
                    status,
                    now,
                )
                .await?;
            transaction::record_transaction(&child, &self.pool)
                .await
                .map_err(map_lookup)?;
            self.enqueue(&child).await?;
        }

        Ok(parent)
    }

    async fn build_row(
        &self,
        ledger_id: &LedgerId,
        parent: Option<TransactionId>,
        req: &QueueTransactionRequest,
        reference: &str,
        amount: f64,
        status: TransactionStatus,
        now: jiff::Timestamp,
    ) -> Result<TransactionRow, LedgerError> {
        let precise_amount = money::precise(amount, req.precision);
        let id = TransactionId::new();
        let hash = money::transaction_hash(&money::HashInput {
            transaction_id: id,
            parent_transaction: parent,
            source: &req.source,
            destination: &req.destination,
            reference,
            precise_amount,
            precision: req.precision,
            rate: req.rate,
            currency: &req.currency,
            status,
            created_at: now,
        });
        let inflight_expiry = if status == TransactionStatus::Inflight {
            Some(now + jiff::Span::new().seconds(DEFAULT_LOCK_TTL.as_secs() as i64))
        } else {
            None
        };

        Ok(TransactionRow {
            id,
            ledger_id: *ledger_id,
            parent_transaction: parent,
            source: req.source.clone(),
            destination: req.destination.clone(),
            amount,
            precise_amount,
            precision: req.precision,
            currency: req.currency.clone(),
            rate: req.rate,
            reference: reference.to_string(),
            description: req.description.clone(),
            status,
            inflight: req.inflight,
            allow_overdraft: req.allow_overdraft,
            inflight_expiry,
            scheduled_for: req.scheduled_for,
            created_at: now,
            hash,
        })
    }

    async fn enqueue(&self, row: &TransactionRow) -> Result<(), LedgerError> {
        let shard = crate::queue::shard_for(&row.source.to_string(), self.queue.shard_count());
        let available_at = row.scheduled_for.unwrap_or(row.created_at);
        self.queue
            .push(
                QueueName::Transaction(shard),
                &row.reference,
                serde_json::json!({ "transaction_id": row.id.to_string() }),
                available_at,
            )
            .await?;
        Ok(())
    }

    /// `RecordTransaction`: invoked by a shard worker for a task popped off
    /// its queue. Applies the balance engine and transitions the
    /// transaction's status, or rejects it on a terminal engine error.
    #[tracing::instrument(skip(self, task))]
    pub async fn record_transaction(&self, task: &Task) -> Result<(), LedgerError> {
        let transaction_id: TransactionId = task
            .payload
            .get("transaction_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or(LedgerError::TransactionNotFound)?;

        let row = transaction::get_transaction(&transaction_id, &self.pool)
            .await
            .map_err(map_lookup)?;

        if row.status.is_terminal() {
            // Already settled by a prior delivery of this at-least-once task.
            return Ok(());
        }
        // Another node may have claimed the reference between enqueue and
        // now; re-check is implicit because the row itself carries the
        // reference and its status already reflects reality.

        let lock_key = row.source.to_string();
        let handle = self
            .lock
            .acquire(&lock_key, DEFAULT_LOCK_TTL, LOCK_RETRIES, LOCK_RETRY_INTERVAL)
            .await?;

        let result = self.apply_locked(&row).await;

        self.lock.release(handle).await.ok();

        match result {
            Ok(()) => Ok(()),
            Err(LedgerError::InsufficientFunds) | Err(LedgerError::CurrencyMismatch) => {
                self.reject_transaction(&row, "balance engine refused the transaction")
                    .await
            }
            Err(other) => Err(other),
        }
    }

    async fn apply_locked(&self, row: &TransactionRow) -> Result<(), LedgerError> {
        let mut attempt = 0;
        let (source_id, dest_id) = loop {
            let source_row = balance::resolve(
                &row.source,
                &row.currency,
                row.precision,
                &self.time_source,
                &self.pool,
            )
            .await
            .map_err(map_lookup)?;
            let dest_row = balance::resolve(
                &row.destination,
                &row.currency,
                row.precision,
                &self.time_source,
                &self.pool,
            )
            .await
            .map_err(map_lookup)?;
            let (source_id, dest_id) = (source_row.id, dest_row.id);

            let mut source_snapshot: BalanceSnapshot = (&source_row).into();
            let mut dest_snapshot: BalanceSnapshot = (&dest_row).into();

            let engine_txn = EngineTransaction {
                precise_amount: row.precise_amount,
                rate: row.rate,
                currency: &row.currency,
                inflight: row.status == TransactionStatus::Inflight,
                allow_overdraft: row.allow_overdraft,
            };
            engine::apply(&engine_txn, &mut source_snapshot, &mut dest_snapshot)?;

            let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
            let persisted =
                balance::update_balances(&source_snapshot, &dest_snapshot, &mut tx).await;

            match persisted {
                Ok(()) => {
                    tx.commit().await.map_err(StoreError::from)?;
                    break (source_id, dest_id);
                }
                Err(StoreError::VersionConflict { balance_id }) => {
                    tx.rollback().await.ok();
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(LedgerError::Store(StoreError::VersionConflict {
                            balance_id,
                        }));
                    }
                    tokio::time::sleep(VERSION_CONFLICT_RETRY_INTERVAL).await;
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        };

        let new_status = match row.status {
            TransactionStatus::Queued | TransactionStatus::Scheduled => {
                TransactionStatus::Applied
            }
            other => other,
        };
        transaction::update_status(&row.id, new_status, &self.pool)
            .await
            .map_err(map_lookup)?;

        if row.status == TransactionStatus::Inflight {
            if let Some(expiry) = row.inflight_expiry {
                self.queue
                    .push(
                        QueueName::InflightExpiry,
                        &format!("expiry:{}", row.id),
                        serde_json::json!({ "parent_id": row.id.to_string() }),
                        expiry,
                    )
                    .await?;
            }
        }

        self.dispatch_notifications(row, new_status, source_id, dest_id);

        Ok(())
    }

    /// Fires the transaction-status webhook and evaluates monitors on both
    /// touched balances in a detached task; the worker never waits on this.
    fn dispatch_notifications(
        &self,
        row: &TransactionRow,
        status: TransactionStatus,
        source_id: payloads::BalanceId,
        dest_id: payloads::BalanceId,
    ) {
        let pool = self.pool.clone();
        let queue = self.queue.clone();
        let time_source = self.time_source.clone();
        let transaction_id = row.id;
        let event = status.event_name();

        tokio::spawn(async move {
            let now = time_source.now();
            let payload = serde_json::json!({
                "event": event,
                "transaction_id": transaction_id.to_string(),
            });
            if let Err(e) = queue
                .push(QueueName::Webhook, &format!("txn:{transaction_id}:{event}"), payload, now)
                .await
            {
                tracing::error!(error = %e, "failed to enqueue transaction webhook");
            }

            for id in [source_id, dest_id] {
                match balance::get_balance(&id, &pool).await {
                    Ok(balance_row) => {
                        if let Err(e) =
                            crate::monitor_eval::evaluate(&balance_row, &pool, &queue, now).await
                        {
                            tracing::error!(error = %e, "monitor evaluation failed");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to reload balance for monitor evaluation"),
                }
            }
        });
    }

    /// `CommitInflightTransaction`.
    #[tracing::instrument(skip(self))]
    pub async fn commit_inflight(
        &self,
        parent_id: TransactionId,
        amount: f64,
    ) -> Result<TransactionRow, LedgerError> {
        let parent = transaction::get_transaction(&parent_id, &self.pool)
            .await
            .map_err(map_lookup)?;
        if parent.status != TransactionStatus::Inflight {
            return Err(LedgerError::InvalidState {
                transaction_id: parent_id,
            });
        }

        let lock_key = parent.source.to_string();
        let handle = self
            .lock
            .acquire(&lock_key, DEFAULT_LOCK_TTL, LOCK_RETRIES, LOCK_RETRY_INTERVAL)
            .await?;

        let result = self.commit_inflight_locked(&parent, amount).await;
        self.lock.release(handle).await.ok();
        result
    }

    async fn commit_inflight_locked(
        &self,
        parent: &TransactionRow,
        amount: f64,
    ) -> Result<TransactionRow, LedgerError> {
        let committed_sum = transaction::get_total_committed(&parent.id, &self.pool)
            .await
            .map_err(map_lookup)?;
        let remaining = parent.precise_amount - committed_sum;
        if remaining == 0 {
            return Err(LedgerError::AlreadyCommitted {
                transaction_id: parent.id,
            });
        }

        let requested = if amount == 0.0 {
            remaining
        } else {
            money::precise(amount, parent.precision)
        };
        if requested < 1 || requested > remaining {
            return Err(LedgerError::InvalidAmount {
                amount: requested,
                remaining,
            });
        }

        let source_row = balance::resolve(
            &parent.source,
            &parent.currency,
            parent.precision,
            &self.time_source,
            &self.pool,
        )
        .await
        .map_err(map_lookup)?;
        let dest_row = balance::resolve(
            &parent.destination,
            &parent.currency,
            parent.precision,
            &self.time_source,
            &self.pool,
        )
        .await
        .map_err(map_lookup)?;

        let mut source_snapshot: BalanceSnapshot = (&source_row).into();
        let mut dest_snapshot: BalanceSnapshot = (&dest_row).into();
        source_snapshot.commit_inflight_debit(requested);
        dest_snapshot.commit_inflight_credit(requested);

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        balance::update_balances(&source_snapshot, &dest_snapshot, &mut tx).await?;
        tx.commit().await.map_err(StoreError::from)?;

        let now = self.time_source.now();
        let child_reference = format!("{}-commit-{committed_sum}", parent.reference);
        let child_id = TransactionId::new();
        let hash = money::transaction_hash(&money::HashInput {
            transaction_id: child_id,
            parent_transaction: Some(parent.id),
            source: &parent.source,
            destination: &parent.destination,
            reference: &child_reference,
            precise_amount: requested,
            precision: parent.precision,
            rate: parent.rate,
            currency: &parent.currency,
            status: TransactionStatus::Applied,
            created_at: now,
        });
        let child = TransactionRow {
            id: child_id,
            ledger_id: parent.ledger_id,
            parent_transaction: Some(parent.id),
            source: parent.source.clone(),
            destination: parent.destination.clone(),
            amount: money::from_precise(requested, parent.precision),
            precise_amount: requested,
            precision: parent.precision,
            currency: parent.currency.clone(),
            rate: parent.rate,
            reference: child_reference,
            description: parent.description.clone(),
            status: TransactionStatus::Applied,
            inflight: false,
            allow_overdraft: parent.allow_overdraft,
            inflight_expiry: None,
            scheduled_for: None,
            created_at: now,
            hash,
        };
        transaction::record_transaction(&child, &self.pool)
            .await
            .map_err(map_lookup)?;

        Ok(child)
    }

    /// `VoidInflightTransaction`.
    #[tracing::instrument(skip(self))]
    pub async fn void_inflight(
        &self,
        parent_id: TransactionId,
    ) -> Result<TransactionRow, LedgerError> {
        let parent = transaction::get_transaction(&parent_id, &self.pool)
            .await
            .map_err(map_lookup)?;
        if parent.status != TransactionStatus::Inflight {
            return Err(LedgerError::InvalidState {
                transaction_id: parent_id,
            });
        }
        if transaction::is_parent_void(&parent_id, &self.pool)
            .await
            .map_err(map_lookup)?
        {
            return Err(LedgerError::AlreadyVoided {
                transaction_id: parent_id,
            });
        }

        let lock_key = parent.source.to_string();
        let handle = self
            .lock
            .acquire(&lock_key, DEFAULT_LOCK_TTL, LOCK_RETRIES, LOCK_RETRY_INTERVAL)
            .await?;

        let result = self.void_inflight_locked(&parent).await;
        self.lock.release(handle).await.ok();
        result
    }

    async fn void_inflight_locked(
        &self,
        parent: &TransactionRow,
    ) -> Result<TransactionRow, LedgerError> {
        let committed_sum = transaction::get_total_committed(&parent.id, &self.pool)
            .await
            .map_err(map_lookup)?;
        let remaining = parent.precise_amount - committed_sum;

        let source_row = balance::resolve(
            &parent.source,
            &parent.currency,
            parent.precision,
            &self.time_source,
            &self.pool,
        )
        .await
        .map_err(map_lookup)?;
        let dest_row = balance::resolve(
            &parent.destination,
            &parent.currency,
            parent.precision,
            &self.time_source,
            &self.pool,
        )
        .await
        .map_err(map_lookup)?;

        let mut source_snapshot: BalanceSnapshot = (&source_row).into();
        let mut dest_snapshot: BalanceSnapshot = (&dest_row).into();
        source_snapshot.rollback_inflight_debit(remaining);
        dest_snapshot.rollback_inflight_credit(remaining);

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        balance::update_balances(&source_snapshot, &dest_snapshot, &mut tx).await?;
        tx.commit().await.map_err(StoreError::from)?;

        let now = self.time_source.now();
        let child_reference = format!("{}-void", parent.reference);
        let child_id = TransactionId::new();
        let hash = money::transaction_hash(&money::HashInput {
            transaction_id: child_id,
            parent_transaction: Some(parent.id),
            source: &parent.source,
            destination: &parent.destination,
            reference: &child_reference,
            precise_amount: remaining,
            precision: parent.precision,
            rate: parent.rate,
            currency: &parent.currency,
            status: TransactionStatus::Void,
            created_at: now,
        });
        let child = TransactionRow {
            id: child_id,
            ledger_id: parent.ledger_id,
            parent_transaction: Some(parent.id),
            source: parent.source.clone(),
            destination: parent.destination.clone(),
            amount: money::from_precise(remaining, parent.precision),
            precise_amount: remaining,
            precision: parent.precision,
            currency: parent.currency.clone(),
            rate: parent.rate,
            reference: child_reference,
            description: parent.description.clone(),
            status: TransactionStatus::Void,
            inflight: false,
            allow_overdraft: parent.allow_overdraft,
            inflight_expiry: None,
            scheduled_for: None,
            created_at: now,
            hash,
        };
        transaction::record_transaction(&child, &self.pool)
            .await
            .map_err(map_lookup)?;

        Ok(child)
    }

    /// `RefundTransaction`: enqueues a new, independent transaction with
    /// source and destination swapped.
    #[tracing::instrument(skip(self))]
    pub async fn refund_transaction(
        &self,
        original_id: TransactionId,
        reference_override: Option<String>,
    ) -> Result<TransactionRow, LedgerError> {
        let original = transaction::get_transaction(&original_id, &self.pool)
            .await
            .map_err(map_lookup)?;

        let reference = reference_override
            .unwrap_or_else(|| format!("{}-refund", original.reference));
        let req = QueueTransactionRequest {
            reference,
            source: original.destination.clone(),
            destination: original.source.clone(),
            amount: original.amount,
            precision: original.precision,
            currency: original.currency.clone(),
            rate: original.rate,
            description: original.description.clone(),
            inflight: original.status == TransactionStatus::Inflight,
            scheduled_for: None,
            distributions: Vec::new(),
            allow_overdraft: true,
        };

        self.queue_transaction_with_parent(original.ledger_id, Some(original.id), req)
            .await
    }

    /// `RejectTransaction`: terminal failure path, never touches balances.
    #[tracing::instrument(skip(self, row))]
    pub async fn reject_transaction(
        &self,
        row: &TransactionRow,
        reason: &str,
    ) -> Result<(), LedgerError> {
        tracing::warn!(transaction_id = %row.id, reason, "rejecting transaction");
        transaction::update_status(&row.id, TransactionStatus::Rejected, &self.pool)
            .await
            .map_err(map_lookup)?;
        Ok(())
    }
}

/// Ensure the general ledger exists, creating it on first use. Exposed so
/// startup can provision it before the HTTP listener binds.
pub async fn ensure_general_ledger(
    time_source: &TimeSource,
    pool: &PgPool,
) -> Result<LedgerId, LedgerError> {
    ledger::ensure_general_ledger(time_source, pool)
        .await
        .map_err(map_lookup)
}

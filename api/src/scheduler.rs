//! Top-level orchestration of the shard workers, the inflight-expiry timer
//! queue and webhook delivery.
//!
//! Each shard worker polls its own `transaction_<n>` queue; the expiry and
//! webhook queues are drained by their own single loops. Every loop follows
//! the same tick-then-process shape the teacher used for its auction
//! scheduler: a fixed-interval `tokio::time::interval`, with per-tick errors
//! logged rather than propagated so one bad task never kills the loop.

use payloads::TransactionId;
use secrecy::SecretBox;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::orchestrator::Orchestrator;
use crate::queue::{QueueName, Task, TaskQueue};
use crate::telemetry::log_error;
use crate::time::TimeSource;

const BASE_RETRY_BACKOFF: Duration = Duration::from_secs(5);

pub struct Scheduler {
    time_source: TimeSource,
    tick_interval: Duration,
    orchestrator: Orchestrator,
    queue: TaskQueue,
    webhook_signing_key: Arc<SecretBox<String>>,
}

impl Scheduler {
    pub fn new(
        time_source: TimeSource,
        tick_interval: Duration,
        orchestrator: Orchestrator,
        queue: TaskQueue,
        webhook_signing_key: Arc<SecretBox<String>>,
    ) -> Self {
        Self {
            time_source,
            tick_interval,
            orchestrator,
            queue,
            webhook_signing_key,
        }
    }

    /// Spawns one Tokio task per shard plus one each for the expiry and
    /// webhook queues, and waits for all of them. Intended to be
    /// `tokio::spawn`-ed once from `main`.
    pub async fn run(&self) {
        let shard_count = self.queue.shard_count();
        let mut handles = Vec::with_capacity(shard_count as usize + 2);

        for shard in 0..shard_count {
            let this = self.clone_for_worker();
            handles.push(tokio::spawn(async move {
                this.run_transaction_shard(shard).await;
            }));
        }

        {
            let this = self.clone_for_worker();
            handles.push(tokio::spawn(async move {
                this.run_expiry_loop().await;
            }));
        }

        {
            let this = self.clone_for_worker();
            handles.push(tokio::spawn(async move {
                this.run_webhook_loop().await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    fn clone_for_worker(&self) -> WorkerContext {
        WorkerContext {
            time_source: self.time_source.clone(),
            tick_interval: self.tick_interval,
            orchestrator: self.orchestrator.clone(),
            queue: self.queue.clone(),
            webhook_signing_key: self.webhook_signing_key.clone(),
        }
    }
}

/// Per-task-loop state, split out from `Scheduler` so each spawned loop owns
/// its own handles instead of borrowing across the `tokio::spawn` boundary.
#[derive(Clone)]
struct WorkerContext {
    time_source: TimeSource,
    tick_interval: Duration,
    orchestrator: Orchestrator,
    queue: TaskQueue,
    webhook_signing_key: Arc<SecretBox<String>>,
}

impl WorkerContext {
    async fn run_transaction_shard(&self, shard: u32) {
        let mut interval = time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            let now = self.time_source.now();
            match self.queue.pop_ready(QueueName::Transaction(shard), now).await {
                Ok(Some(task)) => {
                    if let Err(e) = self.orchestrator.record_transaction(&task).await {
                        tracing::warn!(shard, error = %e, "transaction application failed, retrying");
                        let _ = self
                            .queue
                            .retry(QueueName::Transaction(shard), task, now, BASE_RETRY_BACKOFF)
                            .await
                            .map_err(log_error);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log_error(anyhow::anyhow!(e));
                }
            }
        }
    }

    async fn run_expiry_loop(&self) {
        let mut interval = time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            let now = self.time_source.now();
            match self.queue.pop_ready(QueueName::InflightExpiry, now).await {
                Ok(Some(task)) => {
                    if let Err(e) = self.process_expiry(&task).await {
                        tracing::warn!(error = %e, "inflight expiry processing failed, retrying");
                        let _ = self
                            .queue
                            .retry(QueueName::InflightExpiry, task, now, BASE_RETRY_BACKOFF)
                            .await
                            .map_err(log_error);
                    }
                }
                Ok(None) => {}
                Err(e) => log_error(anyhow::anyhow!(e)),
            }
        }
    }

    async fn process_expiry(&self, task: &Task) -> anyhow::Result<()> {
        let parent_id: TransactionId = task
            .payload
            .get("parent_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("expiry task missing parent_id"))?;

        match self.orchestrator.void_inflight(parent_id).await {
            Ok(_) => Ok(()),
            // The inflight transaction already settled (committed or voided
            // by a human) before its timer fired; nothing to do.
            Err(crate::orchestrator::LedgerError::InvalidState { .. })
            | Err(crate::orchestrator::LedgerError::AlreadyVoided { .. }) => Ok(()),
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }

    async fn run_webhook_loop(&self) {
        let client = reqwest::Client::new();
        let mut interval = time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            let now = self.time_source.now();
            match self.queue.pop_ready(QueueName::Webhook, now).await {
                Ok(Some(task)) => {
                    if let Err(e) = self.deliver_webhook(&client, &task).await {
                        tracing::warn!(error = %e, "webhook delivery failed, retrying");
                        let _ = self
                            .queue
                            .retry(QueueName::Webhook, task, now, BASE_RETRY_BACKOFF)
                            .await
                            .map_err(log_error);
                    }
                }
                Ok(None) => {}
                Err(e) => log_error(anyhow::anyhow!(e)),
            }
        }
    }

    async fn deliver_webhook(&self, client: &reqwest::Client, task: &Task) -> anyhow::Result<()> {
        let Some(url) = task
            .payload
            .get("call_back_url")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        else {
            // Transaction-status events carry no per-call-back URL of their
            // own yet; monitor events always do. Nothing to deliver.
            return Ok(());
        };

        crate::notifier::deliver(client, url, &task.payload, &self.webhook_signing_key)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }
}

//! A delayed, sharded, at-least-once task queue backed by Redis.
//!
//! Ready-but-undelivered work sits in a per-shard Redis sorted set keyed by
//! the timestamp at which it becomes eligible for delivery; popping a task
//! is a `ZRANGEBYSCORE` + `ZREM` pair. A companion Redis set records task
//! ids seen within the retention window so redelivery of an already-handled
//! task id is filtered out, without claiming exactly-once delivery.

use jiff::Timestamp;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of transaction shard queues. The FNV32a hash of the source
/// balance id determines which shard a task lands on.
pub const DEFAULT_SHARD_COUNT: u32 = 20;

/// How long a delivered task id is remembered for deduplication purposes.
const DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// FNV-1a 32-bit hash, used to assign a source balance (and hence its
/// transactions) to a stable shard queue.
pub fn fnv32a(s: &str) -> u32 {
    const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;
    let mut hash = FNV_OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Which shard a source balance's transactions are dispatched to.
pub fn shard_for(source: &str, shard_count: u32) -> u32 {
    fnv32a(source) % shard_count
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    /// `shard` is zero-based; the wire queue name is 1-based.
    Transaction(u32),
    /// The wire queue name keeps its historical (misspelled) form for
    /// compatibility with consumers already polling it.
    Webhook,
    InflightExpiry,
}

impl QueueName {
    pub fn key(self) -> String {
        match self {
            Self::Transaction(shard) => {
                format!("new:transaction_{}", shard + 1)
            }
            Self::Webhook => "new:webhoook".to_string(),
            Self::InflightExpiry => "new:inflight-expiry".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub payload: serde_json::Value,
    pub attempt: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("task payload was not valid json: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct TaskQueue {
    conn: ConnectionManager,
    shard_count: u32,
}

impl TaskQueue {
    pub fn new(conn: ConnectionManager, shard_count: u32) -> Self {
        Self { conn, shard_count }
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Enqueue `task_id` with `payload` on `queue`, eligible for delivery at
    /// `available_at`. A task id already seen within the dedup window is
    /// silently dropped.
    #[tracing::instrument(skip(self, payload))]
    pub async fn push(
        &self,
        queue: QueueName,
        task_id: &str,
        payload: serde_json::Value,
        available_at: Timestamp,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let dedup_key = format!("seen:{}", queue.key());

        let already_seen: bool = conn.sismember(&dedup_key, task_id).await?;
        if already_seen {
            tracing::debug!(task_id, "dropping duplicate task id");
            return Ok(());
        }

        let task = Task {
            id: task_id.to_string(),
            payload,
            attempt: 0,
        };
        let encoded = serde_json::to_string(&task)?;
        let score = available_at.as_second() as f64;

        let _: () = conn.zadd(queue.key(), encoded, score).await?;
        let _: () = conn.sadd(&dedup_key, task_id).await?;
        let _: () = conn
            .expire(&dedup_key, DEDUP_TTL.as_secs() as i64)
            .await?;
        Ok(())
    }

    /// Pop the earliest task on `queue` whose score has elapsed, if any.
    #[tracing::instrument(skip(self))]
    pub async fn pop_ready(
        &self,
        queue: QueueName,
        now: Timestamp,
    ) -> Result<Option<Task>, QueueError> {
        let mut conn = self.conn.clone();
        let key = queue.key();

        let entries: Vec<String> = conn
            .zrangebyscore_limit(&key, 0, now.as_second() as f64, 0, 1)
            .await?;
        let Some(encoded) = entries.into_iter().next() else {
            return Ok(None);
        };

        let removed: i64 = conn.zrem(&key, &encoded).await?;
        if removed == 0 {
            // Another worker popped it first between our read and our
            // removal attempt; let the caller try again next tick.
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&encoded)?))
    }

    /// Re-enqueue `task` with an incremented attempt count after a
    /// bounded exponential backoff.
    #[tracing::instrument(skip(self, task))]
    pub async fn retry(
        &self,
        queue: QueueName,
        task: Task,
        now: Timestamp,
        base_backoff: Duration,
    ) -> Result<(), QueueError> {
        let delay = base_backoff.saturating_mul(1 << task.attempt.min(10));
        let available_at = now + jiff::Span::new().seconds(delay.as_secs() as i64);
        let mut retried = task;
        retried.attempt += 1;

        let mut conn = self.conn.clone();
        let encoded = serde_json::to_string(&retried)?;
        let _: () = conn
            .zadd(queue.key(), encoded, available_at.as_second() as f64)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv32a_is_stable() {
        assert_eq!(fnv32a("bln_00000000-0000-0000-0000-000000000000"),
            fnv32a("bln_00000000-0000-0000-0000-000000000000"));
        assert_ne!(fnv32a("a"), fnv32a("b"));
    }

    #[test]
    fn shard_for_is_bounded() {
        for i in 0..1000 {
            let source = format!("bln_{i}");
            assert!(shard_for(&source, DEFAULT_SHARD_COUNT) < DEFAULT_SHARD_COUNT);
        }
    }

    #[test]
    fn queue_name_keeps_historical_webhook_spelling() {
        assert_eq!(QueueName::Webhook.key(), "new:webhoook");
        assert_eq!(QueueName::Transaction(0).key(), "new:transaction_1");
        assert_eq!(QueueName::InflightExpiry.key(), "new:inflight-expiry");
    }
}

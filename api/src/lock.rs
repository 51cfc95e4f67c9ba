//! Keyed mutual exclusion backed by Redis.
//!
//! The lock keyspace is the source balance id: holding the lock for a
//! balance serializes every operation that could mutate it. Ownership is
//! proven by a random nonce stored as the key's value, so a stale holder's
//! release can never clobber a newer acquirer that grabbed the key after
//! the original TTL expired.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock contended: {key}")]
    Contended { key: String },
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub struct LockHandle {
    key: String,
    nonce: String,
}

#[derive(Clone)]
pub struct DistributedLock {
    conn: ConnectionManager,
}

impl DistributedLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Attempt to acquire `key` once per `retry_interval` until `retries` is
    /// exhausted. Returns `LockError::Contended` if every attempt loses the
    /// race.
    #[tracing::instrument(skip(self))]
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        retries: u32,
        retry_interval: Duration,
    ) -> Result<LockHandle, LockError> {
        let lock_key = format!("lock:{key}");
        let nonce = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();

        for attempt in 0..=retries {
            let acquired: bool = conn
                .set_nx(&lock_key, &nonce)
                .await
                .map_err(LockError::Redis)?;
            if acquired {
                let _: () = conn
                    .pexpire(&lock_key, ttl.as_millis() as i64)
                    .await
                    .map_err(LockError::Redis)?;
                return Ok(LockHandle {
                    key: lock_key,
                    nonce,
                });
            }
            if attempt < retries {
                tokio::time::sleep(retry_interval).await;
            }
        }

        Err(LockError::Contended { key: lock_key })
    }

    /// Idempotent compare-and-delete release; a no-op if the lock already
    /// expired or was stolen by a later acquirer.
    #[tracing::instrument(skip(self, handle))]
    pub async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        let script = redis::Script::new(RELEASE_SCRIPT);
        let mut conn = self.conn.clone();
        let _: i64 = script
            .key(&handle.key)
            .arg(&handle.nonce)
            .invoke_async(&mut conn)
            .await
            .map_err(LockError::Redis)?;
        Ok(())
    }
}

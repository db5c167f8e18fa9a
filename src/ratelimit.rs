//! Sliding-window rate limiter keyed by session.
//!
//! Each session key gets a rolling window of request timestamps persisted
//! in the `rate_events` table, so quotas survive process restart. The
//! window counts events in the trailing duration ending now — it never
//! resets at a clock-aligned boundary.
//!
//! Admission for one key is serialized through a per-key async mutex so
//! two concurrent requests cannot both observe `max - 1` entries and both
//! slip in. The critical section covers only the window read-modify-write;
//! callers never hold it across embedding or provider I/O.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::error::QueryError;

pub struct RateLimiter {
    pool: SqlitePool,
    max_requests: u32,
    window_secs: i64,
    /// Lock per session key; the outer mutex only guards the map itself.
    keys: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RateLimiter {
    pub fn new(pool: SqlitePool, config: &RateLimitConfig) -> Self {
        Self {
            pool,
            max_requests: config.max_requests,
            window_secs: config.window_secs,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request at time `now` (seconds).
    ///
    /// Admission records the timestamp; rejection carries the seconds
    /// until the oldest surviving entry expires.
    pub async fn admit(&self, session_key: &str, now: i64) -> Result<(), QueryError> {
        let key_lock = {
            let mut keys = self.keys.lock().await;
            keys.entry(session_key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        let expired_before = now - self.window_secs;

        // Drop entries that have aged out of the window.
        sqlx::query("DELETE FROM rate_events WHERE session_key = ? AND ts <= ?")
            .bind(session_key)
            .bind(expired_before)
            .execute(&self.pool)
            .await
            .map_err(crate::error::IndexError::from)?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rate_events WHERE session_key = ?")
                .bind(session_key)
                .fetch_one(&self.pool)
                .await
                .map_err(crate::error::IndexError::from)?;

        if count >= self.max_requests as i64 {
            let oldest: i64 =
                sqlx::query_scalar("SELECT MIN(ts) FROM rate_events WHERE session_key = ?")
                    .bind(session_key)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(crate::error::IndexError::from)?;
            return Err(QueryError::RateLimited {
                retry_after: oldest + self.window_secs - now,
            });
        }

        sqlx::query("INSERT INTO rate_events (session_key, ts) VALUES (?, ?)")
            .bind(session_key)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(crate::error::IndexError::from)?;

        Ok(())
    }
}

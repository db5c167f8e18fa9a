//! Document retention: expiry sweeps and explicit deletion.
//!
//! Non-sample documents expire after the configured retention window and
//! are removed by `sweep`, cascading to chunks and vectors. Sweeps take a
//! per-document lock, never a global one, so concurrent query traffic and
//! ingestion of other documents proceed untouched. One document failing
//! to delete is logged and retried on the next sweep; it never aborts the
//! rest of the pass.
//!
//! `sweep` takes an explicit `now` so tests can drive retention with
//! synthetic clocks; the serving binary runs [`spawn_sweeper`] which ticks
//! on a fixed interval starting at process start.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::error::IndexError;
use crate::index;

/// Per-document exclusion, keyed by document id.
///
/// Held by ingestion while a document's rows are being written and by the
/// sweep/delete path while they are being removed, so the two can never
/// interleave on the same document.
#[derive(Default)]
pub struct DocLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(document_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub expired: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete every non-sample document older than `retention_secs` at `now`.
///
/// Idempotent: re-running with the same `now` finds nothing left to
/// delete. Per-document failures are isolated; only a failure to list
/// candidates is an error.
pub async fn sweep(
    pool: &SqlitePool,
    locks: &DocLocks,
    retention_secs: i64,
    now: i64,
) -> Result<SweepReport, IndexError> {
    let cutoff = now - retention_secs;

    let expired: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM documents WHERE is_sample = 0 AND ingested_at < ? ORDER BY ingested_at",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let mut report = SweepReport {
        expired: expired.len(),
        ..Default::default()
    };

    for document_id in &expired {
        let _guard = locks.acquire(document_id).await;
        match index::delete_document(pool, document_id).await {
            Ok(_) => report.deleted += 1,
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "sweep failed to delete document");
                report.failed += 1;
            }
        }
    }

    if report.expired > 0 {
        info!(
            expired = report.expired as u64,
            deleted = report.deleted as u64,
            failed = report.failed as u64,
            "retention sweep complete"
        );
    }

    Ok(report)
}

/// Delete one document explicitly. Idempotent; returns whether it existed.
pub async fn delete_document(
    pool: &SqlitePool,
    locks: &DocLocks,
    document_id: &str,
) -> Result<bool, IndexError> {
    let _guard = locks.acquire(document_id).await;
    index::delete_document(pool, document_id).await
}

/// Run a sweep now and then on a fixed interval, until the task is
/// dropped with the server.
pub fn spawn_sweeper(
    pool: SqlitePool,
    locks: Arc<DocLocks>,
    retention_secs: i64,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp();
            if let Err(e) = sweep(&pool, &locks, retention_secs, now).await {
                warn!(error = %e, "retention sweep could not list documents");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn test_pool(dir: &tempfile::TempDir) -> SqlitePool {
        let pool = db::connect_path(&dir.path().join("lifecycle.sqlite"))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn seed_document(pool: &SqlitePool, id: &str, ingested_at: i64, is_sample: bool) {
        sqlx::query(
            "INSERT INTO documents (id, session_key, filename, ingested_at, is_sample, chunk_count)
             VALUES (?, 's1', 'f.txt', ?, ?, 1)",
        )
        .bind(id)
        .bind(ingested_at)
        .bind(is_sample)
        .execute(pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO chunks (id, document_id, chunk_index, text, page, hash) VALUES (?, ?, 0, 'text', NULL, 'h')")
            .bind(format!("{}-c0", id))
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn document_ids(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT id FROM documents ORDER BY id")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    const WEEK: i64 = 7 * 86_400;

    #[tokio::test]
    async fn test_sweep_before_deadline_deletes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&dir).await;
        let locks = DocLocks::new();
        seed_document(&pool, "young", 1000, false).await;

        let report = sweep(&pool, &locks, WEEK, 1000 + WEEK - 1).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(document_ids(&pool).await, vec!["young"]);
    }

    #[tokio::test]
    async fn test_sweep_deletes_expired_non_samples_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&dir).await;
        let locks = DocLocks::new();
        seed_document(&pool, "expired", 1000, false).await;
        seed_document(&pool, "fresh", 1000 + WEEK, false).await;
        seed_document(&pool, "sample", 1000, true).await;

        let now = 1000 + WEEK + 1;
        let report = sweep(&pool, &locks, WEEK, now).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(document_ids(&pool).await, vec!["fresh", "sample"]);

        // Cascade: the expired document's chunks are gone too.
        let chunks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = 'expired'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(chunks, 0);
    }

    #[tokio::test]
    async fn test_sweep_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&dir).await;
        let locks = DocLocks::new();
        seed_document(&pool, "expired", 1000, false).await;

        let now = 1000 + WEEK + 1;
        let first = sweep(&pool, &locks, WEEK, now).await.unwrap();
        assert_eq!(first.deleted, 1);

        let second = sweep(&pool, &locks, WEEK, now).await.unwrap();
        assert_eq!(second.expired, 0);
        assert_eq!(second.deleted, 0);
    }

    #[tokio::test]
    async fn test_delete_document_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&dir).await;
        let locks = DocLocks::new();
        seed_document(&pool, "doc", 1000, false).await;

        assert!(delete_document(&pool, &locks, "doc").await.unwrap());
        assert!(!delete_document(&pool, &locks, "doc").await.unwrap());
    }
}

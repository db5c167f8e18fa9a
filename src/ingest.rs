//! Ingestion boundary.
//!
//! Takes already-extracted plain text (byte-stream extraction is an
//! external concern), chunks it, embeds every chunk, and writes the
//! document, its chunks, and their vectors in a single transaction — a
//! document either exists completely or not at all.
//!
//! Embedding happens before the per-document lock is taken; the lock only
//! covers the database writes, so a slow embedding backend never blocks a
//! concurrent sweep.

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::chunker::chunk_text;
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{IndexError, IngestError};
use crate::index;
use crate::lifecycle::DocLocks;
use crate::models::IngestReceipt;

/// One ingestion request as accepted by the HTTP and CLI boundaries.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub session_key: String,
    pub filename: String,
    pub text: String,
    pub is_sample: bool,
}

pub async fn ingest_text(
    pool: &SqlitePool,
    locks: &DocLocks,
    embedder: &dyn EmbeddingProvider,
    config: &Config,
    request: &IngestRequest,
    now: i64,
) -> Result<IngestReceipt, IngestError> {
    if request.text.trim().is_empty() {
        return Err(IngestError::EmptyText);
    }

    let document_id = Uuid::new_v4().to_string();
    let chunks = chunk_text(
        &document_id,
        &request.text,
        config.chunking.size,
        config.chunking.overlap,
    );
    if chunks.is_empty() {
        return Err(IngestError::EmptyText);
    }

    // Embed everything up front; nothing is persisted if any batch fails.
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        vectors.extend(embedder.embed_batch(&texts).await?);
    }

    let _guard = locks.acquire(&document_id).await;
    let mut tx = pool.begin().await.map_err(IndexError::from)?;

    sqlx::query(
        r#"
        INSERT INTO documents (id, session_key, filename, ingested_at, is_sample, chunk_count)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&document_id)
    .bind(&request.session_key)
    .bind(&request.filename)
    .bind(now)
    .bind(request.is_sample)
    .bind(chunks.len() as i64)
    .execute(&mut *tx)
    .await
    .map_err(IndexError::from)?;

    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        index::upsert(&mut tx, chunk, vector).await?;
    }

    tx.commit().await.map_err(IndexError::from)?;

    info!(
        document_id = %document_id,
        filename = %request.filename,
        chunks = chunks.len() as u64,
        is_sample = request.is_sample,
        "document ingested"
    );

    Ok(IngestReceipt {
        document_id,
        chunk_count: chunks.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, GenerationConfig, ProviderConfig, ServerConfig};
    use crate::error::EmbedError;
    use crate::{db, migrate};
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            db: DbConfig {
                path: dir.path().join("ingest.sqlite"),
            },
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: Default::default(),
            generation: GenerationConfig {
                providers: vec![ProviderConfig {
                    kind: "openai".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    api_key_env: None,
                    timeout_secs: 60,
                }],
                temperature: 0.1,
                max_output_tokens: 256,
            },
            rate_limit: Default::default(),
            retention: Default::default(),
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
        }
    }

    fn request(text: &str) -> IngestRequest {
        IngestRequest {
            session_key: "s1".to_string(),
            filename: "notes.txt".to_string(),
            text: text.to_string(),
            is_sample: false,
        }
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let pool = db::connect(&config).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let locks = DocLocks::new();

        let err = ingest_text(&pool, &locks, &StubEmbedder, &config, &request("   \n"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyText));

        let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(docs, 0);
    }

    #[tokio::test]
    async fn test_ingest_writes_document_chunks_and_vectors() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let pool = db::connect(&config).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let locks = DocLocks::new();

        let text = "A sentence about storage. ".repeat(120);
        let receipt = ingest_text(&pool, &locks, &StubEmbedder, &config, &request(&text), 42)
            .await
            .unwrap();
        assert!(receipt.chunk_count > 1);

        let (count, is_sample): (i64, bool) = sqlx::query_as(
            "SELECT chunk_count, is_sample FROM documents WHERE id = ?",
        )
        .bind(&receipt.document_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count as usize, receipt.chunk_count);
        assert!(!is_sample);

        // Chunk indices are contiguous from 0, and every chunk has a vector.
        let indices: Vec<i64> = sqlx::query_scalar(
            "SELECT chunk_index FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(&receipt.document_id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(indices, (0..receipt.chunk_count as i64).collect::<Vec<_>>());

        let vectors: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors WHERE document_id = ?")
                .bind(&receipt.document_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(vectors as usize, receipt.chunk_count);
    }
}

//! Vector index adapter over SQLite.
//!
//! Chunk vectors live in the `chunk_vectors` table as little-endian f32
//! BLOBs, so the index survives process restart. Nearest-neighbor queries
//! load candidate vectors and score them with cosine similarity in Rust.
//!
//! Query scope is a hard isolation boundary: a session only ever sees its
//! own documents plus globally shared sample documents.

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::IndexError;
use crate::models::{Chunk, Retrieved};

/// Write one chunk and its vector inside the caller's transaction.
pub async fn upsert(
    conn: &mut SqliteConnection,
    chunk: &Chunk,
    vector: &[f32],
) -> Result<(), IndexError> {
    sqlx::query(
        r#"
        INSERT INTO chunks (id, document_id, chunk_index, text, page, hash)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(document_id, chunk_index) DO UPDATE SET
            text = excluded.text,
            page = excluded.page,
            hash = excluded.hash
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(chunk.chunk_index)
    .bind(&chunk.text)
    .bind(chunk.page)
    .bind(&chunk.hash)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO chunk_vectors (chunk_id, document_id, embedding)
        VALUES (?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            document_id = excluded.document_id,
            embedding = excluded.embedding
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(vec_to_blob(vector))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Top-k nearest chunks for a query vector, scoped to one session's
/// documents plus sample documents.
///
/// Ranked by descending cosine similarity; ties break by ascending chunk
/// index, then ascending document id, so results are deterministic. A
/// chunk deleted while the query is in flight simply drops out of the
/// candidate set.
pub async fn query(
    pool: &SqlitePool,
    session_key: &str,
    query_vec: &[f32],
    k: usize,
) -> Result<Vec<Retrieved>, IndexError> {
    let rows = sqlx::query(
        r#"
        SELECT cv.chunk_id, cv.document_id, cv.embedding,
               c.chunk_index, c.text, c.page,
               d.filename
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        JOIN documents d ON d.id = cv.document_id
        WHERE d.session_key = ? OR d.is_sample = 1
        "#,
    )
    .bind(session_key)
    .fetch_all(pool)
    .await?;

    let mut candidates: Vec<Retrieved> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&blob);
            Retrieved {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                filename: row.get("filename"),
                chunk_index: row.get("chunk_index"),
                page: row.get("page"),
                text: row.get("text"),
                score: cosine_similarity(query_vec, &vec),
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_index.cmp(&b.chunk_index))
            .then(a.document_id.cmp(&b.document_id))
    });
    candidates.truncate(k);

    Ok(candidates)
}

/// Delete a document with all its chunks and vectors.
///
/// Idempotent; returns whether a document row was actually removed.
pub async fn delete_document(pool: &SqlitePool, document_id: &str) -> Result<bool, IndexError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(deleted > 0)
}

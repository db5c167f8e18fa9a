//! Corpus statistics and health overview.
//!
//! Provides a quick summary of what's indexed: document counts, chunk
//! counts, vector coverage, and per-session breakdowns. Used by
//! `askd stats` to give confidence that ingestion and retention are
//! working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-session breakdown of document and chunk counts.
struct SessionStats {
    session_key: String,
    doc_count: i64,
    chunk_count: i64,
    sample_count: i64,
    oldest_ingest: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(&pool)
        .await?;

    let total_samples: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE is_sample = 1")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("askdocs — Corpus Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {} ({} samples)", total_docs, total_samples);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Vectors:     {} / {} ({}%)",
        total_vectors,
        total_chunks,
        if total_chunks > 0 {
            (total_vectors * 100) / total_chunks
        } else {
            0
        }
    );

    // Per-session breakdown
    let session_rows = sqlx::query(
        r#"
        SELECT
            d.session_key,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(DISTINCT c.id) AS chunk_count,
            COUNT(DISTINCT CASE WHEN d.is_sample = 1 THEN d.id END) AS sample_count,
            MIN(d.ingested_at) AS oldest_ingest
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.session_key
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let session_stats: Vec<SessionStats> = session_rows
        .iter()
        .map(|row| SessionStats {
            session_key: row.get("session_key"),
            doc_count: row.get("doc_count"),
            chunk_count: row.get("chunk_count"),
            sample_count: row.get("sample_count"),
            oldest_ingest: row.get("oldest_ingest"),
        })
        .collect();

    if !session_stats.is_empty() {
        println!();
        println!("  By session:");
        println!(
            "  {:<24} {:>6} {:>8} {:>8}   {}",
            "SESSION", "DOCS", "CHUNKS", "SAMPLES", "OLDEST"
        );
        println!("  {}", "-".repeat(72));

        for s in &session_stats {
            let oldest_display = match s.oldest_ingest {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>6} {:>8} {:>8}   {}",
                s.session_key, s.doc_count, s.chunk_count, s.sample_count, oldest_display
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

//! Core data models used throughout askdocs.
//!
//! These types represent the documents, chunks, and answers that flow
//! through the ingestion and question-answering pipeline.

use serde::Serialize;

/// Normalized document stored in SQLite.
///
/// Created on successful ingestion; never mutated afterwards except by
/// deletion (explicit or retention sweep).
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Document {
    pub id: String,
    /// Opaque key of the session that uploaded the document.
    pub session_key: String,
    pub filename: String,
    /// Unix timestamp of ingestion, the retention clock.
    pub ingested_at: i64,
    /// Pre-loaded demo content, exempt from expiry and visible to all sessions.
    pub is_sample: bool,
    pub chunk_count: i64,
}

/// A bounded slice of a document's text, the unit of retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// Best-effort page number recovered from extraction markers.
    pub page: Option<i64>,
    pub hash: String,
}

/// A chunk returned from the vector index for one query.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub page: Option<i64>,
    pub text: String,
    pub score: f32,
}

/// Source attribution attached to a generated answer.
///
/// Derived from the retrieved chunks actually passed to the model;
/// not persisted independently.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub document_id: String,
    pub filename: String,
    pub page: Option<i64>,
    pub excerpt: String,
}

/// Receipt returned by the ingestion boundary.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub chunk_count: usize,
}

/// A completed answer with its supporting citations.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub latency_ms: u64,
    /// Identity of the backend that produced the text.
    pub provider: String,
}

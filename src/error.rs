//! Error taxonomy for the ingestion and query paths.
//!
//! Library code returns these typed errors so callers (CLI, HTTP server)
//! can map them to exit codes and status codes. The binary boundary wraps
//! them in `anyhow` for context.

use thiserror::Error;

/// Failures while writing to or reading from the persistent index.
///
/// Fatal for the current request, never for the process.
#[derive(Error, Debug)]
#[error("index unavailable: {0}")]
pub struct IndexError(#[from] pub sqlx::Error);

/// Failures from the embedding backend.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Backend hiccup (HTTP 429/5xx, network). Retried with capped backoff
    /// inside the gateway before being surfaced.
    #[error("embedding provider error: {0}")]
    Transient(String),
    /// Rejected input (empty text, HTTP 4xx). Never retried.
    #[error("malformed embedding input: {0}")]
    MalformedInput(String),
}

/// Failures surfaced by the ingestion boundary.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("document text is empty")]
    EmptyText,
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Failures surfaced by the query boundary.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Session quota exhausted. `retry_after` is the number of seconds
    /// until the oldest window entry expires.
    #[error("rate limit exceeded, retry in {retry_after}s")]
    RateLimited { retry_after: i64 },
    /// Retrieval found nothing above the relevance bar; the caller should
    /// decline rather than let the model guess.
    #[error("no relevant content found for this question")]
    NoRelevantContent,
    /// Every configured generation backend failed. One reason per backend,
    /// surfaced verbatim for operators.
    #[error("all generation providers failed: {}", reasons.join("; "))]
    GenerationUnavailable { reasons: Vec<String> },
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

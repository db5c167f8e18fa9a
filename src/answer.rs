//! Retrieval-generation orchestrator: the query path.
//!
//! `answer` runs the full pipeline for one question: rate-limit gate,
//! question embedding, session-scoped top-k retrieval, grounded prompt
//! construction, routed generation, and citation assembly. The gate runs
//! before anything that costs money, so a rejected request never touches
//! a paid backend.
//!
//! The grounded prompt is the primary hallucination control: the model is
//! told to answer only from the supplied excerpts and to decline when
//! they are insufficient. Citations cover exactly the chunks passed to
//! the model for this call — never anything from another call.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::QueryError;
use crate::generate::Router;
use crate::index;
use crate::models::{Answer, Citation, Retrieved};
use crate::ratelimit::RateLimiter;

const EXCERPT_CHARS: usize = 240;

pub struct Answerer {
    pool: SqlitePool,
    top_k: usize,
    min_score: f32,
    embedder: Arc<dyn EmbeddingProvider>,
    router: Router,
    limiter: RateLimiter,
}

impl Answerer {
    pub fn new(
        pool: SqlitePool,
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        router: Router,
    ) -> Self {
        let limiter = RateLimiter::new(pool.clone(), &config.rate_limit);
        Self {
            pool,
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
            embedder,
            router,
            limiter,
        }
    }

    /// Answer one question for one session at time `now` (seconds).
    pub async fn answer(
        &self,
        session_key: &str,
        question: &str,
        now: i64,
    ) -> Result<Answer, QueryError> {
        let started = Instant::now();

        // Gate before any paid call; an admitted slot stays consumed even
        // if a later step fails or times out.
        self.limiter.admit(session_key, now).await?;

        let query_vec = self.embedder.embed(question).await?;

        let retrieved = index::query(&self.pool, session_key, &query_vec, self.top_k).await?;
        let relevant: Vec<Retrieved> = retrieved
            .into_iter()
            .filter(|r| r.score >= self.min_score)
            .collect();
        if relevant.is_empty() {
            return Err(QueryError::NoRelevantContent);
        }

        let prompt = build_prompt(question, &relevant);
        let generation = self.router.generate(&prompt).await?;

        let citations = build_citations(&relevant);
        let latency_ms = started.elapsed().as_millis() as u64;

        info!(
            session_key,
            provider = %generation.provider,
            chunks = relevant.len() as u64,
            latency_ms,
            "question answered"
        );

        Ok(Answer {
            answer: generation.text,
            citations,
            latency_ms,
            provider: generation.provider,
        })
    }
}

/// Build the grounded prompt from the question and retrieved excerpts.
pub fn build_prompt(question: &str, retrieved: &[Retrieved]) -> String {
    let mut prompt = String::from(
        "You are a helpful assistant answering questions about the user's documents.\n\
         Answer using only the excerpts between the CONTEXT markers. If the excerpts\n\
         do not contain the answer, say that you don't know. Do not guess. Do not\n\
         make up information. Cite the excerpts you used as [n].\n\n\
         === CONTEXT START ===\n",
    );

    for (i, r) in retrieved.iter().enumerate() {
        match r.page {
            Some(page) => {
                prompt.push_str(&format!("[{}] {}, page {}\n", i + 1, r.filename, page))
            }
            None => prompt.push_str(&format!("[{}] {}\n", i + 1, r.filename)),
        }
        prompt.push_str(&r.text);
        prompt.push_str("\n\n");
    }

    prompt.push_str("=== CONTEXT END ===\n\n");
    prompt.push_str(&format!("Question: {}\nAnswer:", question.trim()));
    prompt
}

/// One citation per retrieved chunk, in rank order, with citations that
/// share a document and page merged down to the best-ranked one.
pub fn build_citations(retrieved: &[Retrieved]) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();
    let mut seen: Vec<(String, Option<i64>)> = Vec::new();

    for r in retrieved {
        let key = (r.document_id.clone(), r.page);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        citations.push(Citation {
            document_id: r.document_id.clone(),
            filename: r.filename.clone(),
            page: r.page,
            excerpt: excerpt(&r.text, EXCERPT_CHARS),
        });
    }

    citations
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

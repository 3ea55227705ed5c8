//! Retrieval-augmented answering over the email store.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::email::EmailRecord;
use crate::error::RagError;
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::rag::chunking::{chunk_text, flatten_email};
use crate::rag::embedding::EmbeddingProvider;
use crate::store::{Database, StoredChunk};

static EMAIL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmsg_[0-9a-f]{8}\b").expect("valid email id pattern"));

const TEMPERATURE: f32 = 0.1;

/// Retrieval knobs.
#[derive(Debug, Clone, Copy)]
pub struct RagConfig {
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

/// A stored chunk ranked against a query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub email_id: String,
    pub chunk: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub chunks: Vec<RetrievedChunk>,
    pub extracted_ids: Vec<String>,
}

pub struct RagService {
    store: Arc<dyn Database>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    config: RagConfig,
}

impl RagService {
    pub fn new(
        store: Arc<dyn Database>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        config: RagConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            config,
        }
    }

    async fn chunks_for(&self, email: &EmailRecord) -> Result<Vec<StoredChunk>, RagError> {
        let texts = chunk_text(
            &flatten_email(email),
            self.config.chunk_size,
            self.config.chunk_overlap,
        );
        let vectors = self.embedder.embed_batch(&texts).await?;
        Ok(texts
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| StoredChunk {
                email_id: email.id.clone(),
                chunk,
                embedding,
            })
            .collect())
    }

    /// Rebuild the whole index from every stored email. Returns the chunk count.
    ///
    /// The old index is only replaced once every email has been embedded.
    pub async fn build_index(&self) -> Result<usize, RagError> {
        let emails = self.store.get_all_emails().await?;
        let mut chunks = Vec::new();
        for email in &emails {
            chunks.extend(self.chunks_for(email).await?);
        }

        self.store.replace_chunks(&chunks).await?;
        info!(emails = emails.len(), chunks = chunks.len(), "Retrieval index built");
        Ok(chunks.len())
    }

    /// Add one email's chunks to the index. Returns the chunk count.
    pub async fn index_email(&self, email: &EmailRecord) -> Result<usize, RagError> {
        let chunks = self.chunks_for(email).await?;
        self.store.insert_chunks(&chunks).await?;
        Ok(chunks.len())
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embedder.embed(text).await?)
    }

    /// The `k` stored chunks most similar to `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        let query_vector = self.embedder.embed(query).await?;
        let stored = self.store.list_chunks().await?;

        let mut ranked: Vec<RetrievedChunk> = stored
            .into_iter()
            .map(|c| RetrievedChunk {
                score: cosine_similarity(&query_vector, &c.embedding),
                email_id: c.email_id,
                chunk: c.chunk,
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Answer `query` from the top `k` chunks (default from config).
    pub async fn ask(&self, query: &str, k: Option<usize>) -> Result<RagAnswer, RagError> {
        let k = k.filter(|&k| k > 0).unwrap_or(self.config.top_k);
        let chunks = self.retrieve(query, k).await?;
        if chunks.is_empty() {
            warn!("Retrieval index is empty, answering without context");
        }

        let request = CompletionRequest::from_prompt(build_answer_prompt(query, &chunks))
            .with_temperature(TEMPERATURE);
        let response = self.llm.complete(request).await?;
        let answer = response.content.trim().to_string();
        let extracted_ids = extract_email_ids(&answer);

        Ok(RagAnswer {
            answer,
            chunks,
            extracted_ids,
        })
    }
}

fn build_answer_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| format!("[email_id: {}]\n{}", c.email_id, c.chunk))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "You answer questions about the user's emails using ONLY the context below.\n\
         When you refer to an email, include its email_id (for example msg_1a2b3c4d).\n\
         If the context does not contain the answer, say so.\n\n\
         Context:\n{context}\n\n\
         Question: {query}\n\
         Answer:"
    )
}

/// Email ids (`msg_` + 8 hex) mentioned in `text`, first occurrence order.
pub fn extract_email_ids(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    EMAIL_ID
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

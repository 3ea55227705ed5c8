//! Embedding service client.
//!
//! The remote service takes `{"text": "..."}` and answers with one of
//! several JSON shapes depending on the deployment. Decoding tries the
//! accepted shapes in a fixed order and fails with a single
//! `UnrecognizedShape` error otherwise.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::EmbeddingError;

/// Text → vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts, one request each, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingField {
    embedding: Vec<f32>,
}

/// Accepted response shapes, in the order they are tried.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    /// `{"embedding": [...]}`
    Flat { embedding: Vec<f32> },
    /// `{"data": {"embedding": [...]}}`
    Nested { data: EmbeddingField },
    /// `{"data": [{"embedding": [...]}, ...]}`
    Listed { data: Vec<EmbeddingField> },
    /// `[[...], ...]`
    Rows(Vec<Vec<f32>>),
    /// `[f, f, ...]`
    Vector(Vec<f32>),
}

impl EmbeddingResponse {
    fn into_vector(self) -> Option<Vec<f32>> {
        let vector = match self {
            Self::Flat { embedding } => embedding,
            Self::Nested { data } => data.embedding,
            Self::Listed { data } => data.into_iter().next()?.embedding,
            Self::Rows(rows) => rows.into_iter().next()?,
            Self::Vector(vector) => vector,
        };
        (!vector.is_empty()).then_some(vector)
    }
}

/// Decode an embedding service response body.
pub fn decode_embedding(body: Value) -> Result<Vec<f32>, EmbeddingError> {
    let preview = || body.to_string().chars().take(200).collect::<String>();
    serde_json::from_value::<EmbeddingResponse>(body.clone())
        .ok()
        .and_then(EmbeddingResponse::into_vector)
        .ok_or_else(|| EmbeddingError::UnrecognizedShape(preview()))
}

/// HTTP embedding client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
}

impl HttpEmbedder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EmbeddingError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;
        let vector = decode_embedding(body)?;
        debug!(dims = vector.len(), "Embedding received");
        Ok(vector)
    }
}

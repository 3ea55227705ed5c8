//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::email::{EmailRecord, EmailUpdate, PromptConfig};
use crate::error::DatabaseError;

/// One embedded slice of an email, as stored in the retrieval index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub email_id: String,
    pub chunk: String,
    pub embedding: Vec<f32>,
}

/// Backend-agnostic database trait covering emails, prompts and RAG chunks.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Emails ──────────────────────────────────────────────────────

    /// Every stored email, oldest first.
    async fn get_all_emails(&self) -> Result<Vec<EmailRecord>, DatabaseError>;

    /// Look up one email by id.
    async fn get_email(&self, id: &str) -> Result<Option<EmailRecord>, DatabaseError>;

    /// Insert or fully replace an email record.
    async fn upsert_email(&self, email: &EmailRecord) -> Result<(), DatabaseError>;

    /// Merge the present fields of `update` into the stored record.
    ///
    /// Fails with `DatabaseError::NotFound` when no email has this id.
    async fn update_email(&self, id: &str, update: &EmailUpdate) -> Result<(), DatabaseError>;

    // ── Prompts ─────────────────────────────────────────────────────

    /// The current prompt configuration (blank if never saved).
    async fn get_prompts(&self) -> Result<PromptConfig, DatabaseError>;

    /// Replace the prompt configuration.
    async fn save_prompts(&self, prompts: &PromptConfig) -> Result<(), DatabaseError>;

    // ── Retrieval chunks ────────────────────────────────────────────

    /// Append chunks to the index.
    async fn insert_chunks(&self, chunks: &[StoredChunk]) -> Result<(), DatabaseError>;

    /// Drop every chunk and store `chunks` in their place.
    async fn replace_chunks(&self, chunks: &[StoredChunk]) -> Result<(), DatabaseError>;

    /// All indexed chunks.
    async fn list_chunks(&self) -> Result<Vec<StoredChunk>, DatabaseError>;
}

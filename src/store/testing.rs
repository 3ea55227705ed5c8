//! In-memory `Database` with failure injection, for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::email::{EmailRecord, EmailUpdate, PromptConfig};
use crate::error::DatabaseError;
use crate::store::traits::{Database, StoredChunk};

#[derive(Default)]
pub struct MemoryStore {
    emails: Mutex<Vec<EmailRecord>>,
    prompts: Mutex<PromptConfig>,
    chunks: Mutex<Vec<StoredChunk>>,
    updates: Mutex<Vec<(String, EmailUpdate)>>,
    fail_reads: AtomicBool,
    fail_updates_for: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new(emails: Vec<EmailRecord>, prompts: PromptConfig) -> Self {
        Self {
            emails: Mutex::new(emails),
            prompts: Mutex::new(prompts),
            ..Default::default()
        }
    }

    /// Make `get_all_emails` / `get_email` fail.
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Make `update_email` fail for this id.
    pub fn fail_updates_for(&self, id: &str) {
        self.fail_updates_for.lock().unwrap().insert(id.to_string());
    }

    /// Successful and failed update attempts, in order.
    pub fn updates(&self) -> Vec<(String, EmailUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn stored(&self, id: &str) -> Option<EmailRecord> {
        self.emails.lock().unwrap().iter().find(|e| e.id == id).cloned()
    }

    pub fn set_prompts(&self, prompts: PromptConfig) {
        *self.prompts.lock().unwrap() = prompts;
    }

    pub fn chunks(&self) -> Vec<StoredChunk> {
        self.chunks.lock().unwrap().clone()
    }

    fn check_reads(&self) -> Result<(), DatabaseError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn get_all_emails(&self) -> Result<Vec<EmailRecord>, DatabaseError> {
        self.check_reads()?;
        Ok(self.emails.lock().unwrap().clone())
    }

    async fn get_email(&self, id: &str) -> Result<Option<EmailRecord>, DatabaseError> {
        self.check_reads()?;
        Ok(self.stored(id))
    }

    async fn upsert_email(&self, email: &EmailRecord) -> Result<(), DatabaseError> {
        let mut emails = self.emails.lock().unwrap();
        match emails.iter_mut().find(|e| e.id == email.id) {
            Some(existing) => *existing = email.clone(),
            None => emails.push(email.clone()),
        }
        Ok(())
    }

    async fn update_email(&self, id: &str, update: &EmailUpdate) -> Result<(), DatabaseError> {
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), update.clone()));
        if self.fail_updates_for.lock().unwrap().contains(id) {
            return Err(DatabaseError::Query("write timed out".into()));
        }
        let mut emails = self.emails.lock().unwrap();
        let email = emails
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "email".into(),
                id: id.into(),
            })?;
        email.apply(update);
        Ok(())
    }

    async fn get_prompts(&self) -> Result<PromptConfig, DatabaseError> {
        Ok(self.prompts.lock().unwrap().clone())
    }

    async fn save_prompts(&self, prompts: &PromptConfig) -> Result<(), DatabaseError> {
        self.set_prompts(prompts.clone());
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[StoredChunk]) -> Result<(), DatabaseError> {
        self.chunks.lock().unwrap().extend_from_slice(chunks);
        Ok(())
    }

    async fn replace_chunks(&self, chunks: &[StoredChunk]) -> Result<(), DatabaseError> {
        *self.chunks.lock().unwrap() = chunks.to_vec();
        Ok(())
    }

    async fn list_chunks(&self) -> Result<Vec<StoredChunk>, DatabaseError> {
        Ok(self.chunks())
    }
}

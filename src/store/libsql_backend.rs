//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. List-valued columns
//! (recipients, actions, embeddings) are stored as JSON text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::email::{EmailRecord, EmailUpdate, PromptConfig};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, StoredChunk};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn to_json_text<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Parse a JSON address list column, tolerating bad data.
fn parse_addrs(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

const EMAIL_COLUMNS: &str = "id, thread_id, subject, body_text, timestamp, sender_name, sender_email, \
     to_addrs, cc_addrs, bcc_addrs, folder, category, actions, categorization_prompt_hash, action_prompt_hash";

/// Map a libsql Row to an EmailRecord.
///
/// Column order matches EMAIL_COLUMNS. Nullable columns read as `None`.
fn row_to_email(row: &libsql::Row) -> Result<EmailRecord, libsql::Error> {
    let to_addrs: String = row.get(7)?;
    let cc_addrs: String = row.get(8)?;
    let bcc_addrs: String = row.get(9)?;
    let actions: Option<String> = row.get::<String>(12).ok();

    Ok(EmailRecord {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        subject: row.get(2)?,
        body_text: row.get(3)?,
        timestamp: row.get(4)?,
        sender_name: row.get(5)?,
        sender_email: row.get(6)?,
        to: parse_addrs(&to_addrs),
        cc: parse_addrs(&cc_addrs),
        bcc: parse_addrs(&bcc_addrs),
        folder: row.get(10)?,
        category: row.get::<String>(11).ok(),
        actions: actions.and_then(|raw| serde_json::from_str(&raw).ok()),
        categorization_prompt_hash: row.get::<String>(13).ok(),
        action_prompt_hash: row.get::<String>(14).ok(),
    })
}

fn row_to_chunk(row: &libsql::Row) -> Result<StoredChunk, DatabaseError> {
    let email_id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("chunk row parse: {e}")))?;
    let chunk: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("chunk row parse: {e}")))?;
    let embedding: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("chunk row parse: {e}")))?;
    let embedding: Vec<f32> = serde_json::from_str(&embedding)
        .map_err(|e| DatabaseError::Serialization(format!("chunk embedding: {e}")))?;

    Ok(StoredChunk {
        email_id,
        chunk,
        embedding,
    })
}

async fn insert_chunk_rows(conn: &Connection, chunks: &[StoredChunk]) -> Result<(), DatabaseError> {
    for chunk in chunks {
        conn.execute(
            "INSERT INTO rag_chunks (email_id, chunk, embedding) VALUES (?1, ?2, ?3)",
            params![
                chunk.email_id.as_str(),
                chunk.chunk.as_str(),
                to_json_text(&chunk.embedding)?
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_chunks: {e}")))?;
    }
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Emails ──────────────────────────────────────────────────────

    async fn get_all_emails(&self) -> Result<Vec<EmailRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails ORDER BY rowid ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_all_emails: {e}")))?;

        let mut emails = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_all_emails: {e}")))?
        {
            let email = row_to_email(&row)
                .map_err(|e| DatabaseError::Query(format!("get_all_emails row parse: {e}")))?;
            emails.push(email);
        }
        Ok(emails)
    }

    async fn get_email(&self, id: &str) -> Result<Option<EmailRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let email = row_to_email(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_email row parse: {e}")))?;
                Ok(Some(email))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_email: {e}"))),
        }
    }

    async fn upsert_email(&self, email: &EmailRecord) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let actions = email.actions.as_ref().map(to_json_text).transpose()?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO emails ({EMAIL_COLUMNS}, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                     ON CONFLICT (id) DO UPDATE SET
                        thread_id = ?2, subject = ?3, body_text = ?4, timestamp = ?5,
                        sender_name = ?6, sender_email = ?7, to_addrs = ?8, cc_addrs = ?9,
                        bcc_addrs = ?10, folder = ?11, category = ?12, actions = ?13,
                        categorization_prompt_hash = ?14, action_prompt_hash = ?15,
                        updated_at = ?16"
                ),
                params![
                    email.id.as_str(),
                    email.thread_id.as_str(),
                    email.subject.as_str(),
                    email.body_text.as_str(),
                    email.timestamp.as_str(),
                    email.sender_name.as_str(),
                    email.sender_email.as_str(),
                    to_json_text(&email.to)?,
                    to_json_text(&email.cc)?,
                    to_json_text(&email.bcc)?,
                    email.folder.as_str(),
                    opt_text(email.category.as_deref()),
                    opt_text(actions.as_deref()),
                    opt_text(email.categorization_prompt_hash.as_deref()),
                    opt_text(email.action_prompt_hash.as_deref()),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_email: {e}")))?;

        debug!(id = %email.id, "Email upserted");
        Ok(())
    }

    async fn update_email(&self, id: &str, update: &EmailUpdate) -> Result<(), DatabaseError> {
        let mut assignments = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();

        let mut set = |column: &str, value: libsql::Value| {
            values.push(value);
            assignments.push(format!("{column} = ?{}", values.len()));
        };

        if let Some(ref category) = update.category {
            set("category", libsql::Value::Text(category.clone()));
        }
        if let Some(ref hash) = update.categorization_prompt_hash {
            set("categorization_prompt_hash", libsql::Value::Text(hash.clone()));
        }
        if let Some(ref actions) = update.actions {
            set("actions", libsql::Value::Text(to_json_text(actions)?));
        }
        if let Some(ref hash) = update.action_prompt_hash {
            set("action_prompt_hash", libsql::Value::Text(hash.clone()));
        }
        set("updated_at", libsql::Value::Text(Utc::now().to_rfc3339()));

        values.push(libsql::Value::Text(id.to_string()));
        let sql = format!(
            "UPDATE emails SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );

        let count = self
            .conn()
            .execute(&sql, libsql::params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("update_email: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "email".into(),
                id: id.into(),
            });
        }
        Ok(())
    }

    // ── Prompts ─────────────────────────────────────────────────────

    async fn get_prompts(&self) -> Result<PromptConfig, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT categorization, action_item, auto_reply FROM prompts WHERE id = 1",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_prompts: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(PromptConfig {
                categorization: row.get(0).unwrap_or_default(),
                action_item: row.get(1).unwrap_or_default(),
                auto_reply: row.get(2).unwrap_or_default(),
            }),
            Ok(None) => Ok(PromptConfig::default()),
            Err(e) => Err(DatabaseError::Query(format!("get_prompts: {e}"))),
        }
    }

    async fn save_prompts(&self, prompts: &PromptConfig) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO prompts (id, categorization, action_item, auto_reply, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                    categorization = ?1, action_item = ?2, auto_reply = ?3, updated_at = ?4",
                params![
                    prompts.categorization.as_str(),
                    prompts.action_item.as_str(),
                    prompts.auto_reply.as_str(),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_prompts: {e}")))?;
        Ok(())
    }

    // ── Retrieval chunks ────────────────────────────────────────────

    async fn insert_chunks(&self, chunks: &[StoredChunk]) -> Result<(), DatabaseError> {
        insert_chunk_rows(self.conn(), chunks).await
    }

    async fn replace_chunks(&self, chunks: &[StoredChunk]) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_chunks begin: {e}")))?;

        tx.execute("DELETE FROM rag_chunks", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_chunks clear: {e}")))?;

        if let Err(e) = insert_chunk_rows(&tx, chunks).await {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback of chunk replacement failed");
            }
            return Err(e);
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_chunks commit: {e}")))?;

        info!(count = chunks.len(), "Retrieval index replaced");
        Ok(())
    }

    async fn list_chunks(&self) -> Result<Vec<StoredChunk>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT email_id, chunk, embedding FROM rag_chunks ORDER BY id ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_chunks: {e}")))?;

        let mut chunks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_chunk(&row) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => warn!("Skipping chunk row: {e}"),
            }
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::test_support::email;
    use serde_json::json;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn chunk(email_id: &str, text: &str) -> StoredChunk {
        StoredChunk {
            email_id: email_id.into(),
            chunk: text.into(),
            embedding: vec![0.25, -1.0, 3.5],
        }
    }

    // ── Email tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let db = test_db().await;
        let mut e = email("msg_0000aaaa");
        e.cc = vec!["boss@example.com".into()];
        e.category = Some("Billing".into());
        e.actions = Some(json!({"task": "pay", "deadline": "Friday"}));
        e.categorization_prompt_hash = Some("h1".into());

        db.upsert_email(&e).await.unwrap();

        let fetched = db.get_email("msg_0000aaaa").await.unwrap().unwrap();
        assert_eq!(fetched, e);
    }

    #[tokio::test]
    async fn get_email_not_found() {
        let db = test_db().await;
        assert!(db.get_email("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_all_preserves_insertion_order() {
        let db = test_db().await;
        for id in ["c", "a", "b"] {
            db.upsert_email(&email(id)).await.unwrap();
        }
        // Re-upserting keeps the original position.
        db.upsert_email(&email("c")).await.unwrap();

        let ids: Vec<String> = db
            .get_all_emails()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn update_touches_only_present_fields() {
        let db = test_db().await;
        let mut e = email("e1");
        e.category = Some("Billing".into());
        e.categorization_prompt_hash = Some("h1".into());
        db.upsert_email(&e).await.unwrap();

        db.update_email(
            "e1",
            &EmailUpdate {
                actions: Some(json!({"task": "pay"})),
                action_prompt_hash: Some("a1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let fetched = db.get_email("e1").await.unwrap().unwrap();
        assert_eq!(fetched.category.as_deref(), Some("Billing"));
        assert_eq!(fetched.categorization_prompt_hash.as_deref(), Some("h1"));
        assert_eq!(fetched.actions, Some(json!({"task": "pay"})));
        assert_eq!(fetched.action_prompt_hash.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn update_missing_email_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_email(
                "ghost",
                &EmailUpdate {
                    category: Some("Work".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn empty_actions_object_survives_storage() {
        let db = test_db().await;
        let mut e = email("e1");
        e.actions = Some(json!({}));
        db.upsert_email(&e).await.unwrap();

        let fetched = db.get_email("e1").await.unwrap().unwrap();
        assert_eq!(fetched.actions, Some(json!({})));
        assert!(!fetched.has_actions());
    }

    // ── Prompt tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn prompts_default_to_blank() {
        let db = test_db().await;
        assert!(db.get_prompts().await.unwrap().is_blank());
    }

    #[tokio::test]
    async fn save_prompts_overwrites() {
        let db = test_db().await;
        let mut prompts = PromptConfig {
            categorization: "cat v1".into(),
            action_item: "task".into(),
            auto_reply: "be nice".into(),
        };
        db.save_prompts(&prompts).await.unwrap();
        prompts.categorization = "cat v2".into();
        db.save_prompts(&prompts).await.unwrap();

        assert_eq!(db.get_prompts().await.unwrap(), prompts);
    }

    // ── Chunk tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_list_chunks() {
        let db = test_db().await;
        db.insert_chunks(&[chunk("e1", "one"), chunk("e1", "two")])
            .await
            .unwrap();
        db.insert_chunks(&[chunk("e2", "three")]).await.unwrap();

        let chunks = db.list_chunks().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], chunk("e2", "three"));
    }

    #[tokio::test]
    async fn replace_chunks_clears_previous_index() {
        let db = test_db().await;
        db.insert_chunks(&[chunk("old", "stale")]).await.unwrap();

        db.replace_chunks(&[chunk("new", "fresh")]).await.unwrap();

        assert_eq!(db.list_chunks().await.unwrap(), vec![chunk("new", "fresh")]);
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("inbox.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.upsert_email(&email("e1")).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_email("e1").await.unwrap().is_some());
    }
}

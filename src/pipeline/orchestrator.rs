//! Batch orchestrator: drives the decision engine and stages over emails.
//!
//! Flow per pass:
//! 1. Load prompts, fingerprint them once for the whole pass
//! 2. Load every email (the only all-or-nothing failure point)
//! 3. Per email: decide → run required stages → persist the delta
//!
//! Emails are processed strictly one after another, and the two stages of
//! an email run sequentially. Every model call first takes a slot from the
//! shared `RateLimiter`, so emails that need no work are never paced.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::email::{EmailRecord, EmailUpdate, NewEmail, PromptConfig};
use crate::error::PipelineError;
use crate::llm::provider::LlmProvider;
use crate::pipeline::decision::decide_with;
use crate::pipeline::fingerprint::PromptFingerprints;
use crate::pipeline::pacing::RateLimiter;
use crate::pipeline::stages::{Classifier, Extractor};
use crate::pipeline::types::{EmailOutcome, OutcomeStatus, PassSummary, ProcessedEmail};
use crate::store::Database;

/// Runs re-processing passes and single-email operations against the store.
pub struct BatchOrchestrator {
    store: Arc<dyn Database>,
    classifier: Classifier,
    extractor: Extractor,
    limiter: Arc<RateLimiter>,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            store,
            classifier: Classifier::new(Arc::clone(&llm)),
            extractor: Extractor::new(llm),
            limiter,
        }
    }

    /// Run one full pass over every stored email.
    ///
    /// Fails only when prompts or the email set cannot be read; per-email
    /// failures are reported in the summary's outcomes.
    pub async fn run_pass(&self) -> Result<PassSummary, PipelineError> {
        let prompts = self.load_prompts().await?;
        let fingerprints = PromptFingerprints::of(&prompts);

        let mut emails = self.store.get_all_emails().await.map_err(|e| {
            error!(error = %e, "Cannot read emails, aborting pass");
            PipelineError::EmailsUnavailable(e)
        })?;

        info!(count = emails.len(), "Starting re-processing pass");

        let mut outcomes = Vec::with_capacity(emails.len());
        for email in emails.iter_mut() {
            let outcome = self.process_email(email, &prompts, &fingerprints).await;
            outcomes.push(outcome);
        }

        let summary = PassSummary::from_outcomes(outcomes, emails);
        info!(
            total = summary.total_processed,
            updated = summary.updated,
            failed = summary.failed,
            model_calls = summary.model_calls,
            "Re-processing pass complete"
        );
        Ok(summary)
    }

    /// Decide-and-process one stored email by id.
    pub async fn process_by_id(&self, id: &str) -> Result<ProcessedEmail, PipelineError> {
        let prompts = self.load_prompts().await?;
        let fingerprints = PromptFingerprints::of(&prompts);

        let mut email = self
            .store
            .get_email(id)
            .await?
            .ok_or_else(|| PipelineError::EmailNotFound(id.to_string()))?;

        let outcome = self.process_email(&mut email, &prompts, &fingerprints).await;
        Ok(ProcessedEmail { email, outcome })
    }

    /// Categorize an email that is not (necessarily) stored. Nothing is persisted.
    pub async fn categorize_adhoc(&self, subject: &str, body: &str) -> Result<String, PipelineError> {
        let prompts = self.load_prompts().await?;
        self.classifier
            .categorize(subject, body, &prompts.categorization)
            .await
    }

    /// Assign ids to a new email, run both stages, and store it.
    ///
    /// A failed stage leaves its field empty (and unstamped) so the next
    /// pass retries it.
    pub async fn ingest(&self, new_email: NewEmail) -> Result<EmailRecord, PipelineError> {
        let prompts = self.load_prompts().await?;
        let fingerprints = PromptFingerprints::of(&prompts);
        let (id, thread_id) = generate_email_ids();

        let mut email = EmailRecord {
            id,
            thread_id,
            subject: new_email.subject,
            body_text: new_email.body_text,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            sender_name: new_email.sender_name,
            sender_email: new_email.sender_email,
            to: new_email.to,
            cc: new_email.cc,
            bcc: new_email.bcc,
            folder: new_email.folder,
            category: None,
            actions: None,
            categorization_prompt_hash: None,
            action_prompt_hash: None,
        };
        let body = email.annotated_body();

        self.limiter.acquire().await;
        match self
            .classifier
            .categorize(&email.subject, &body, &prompts.categorization)
            .await
        {
            Ok(label) => {
                email.category = Some(label);
                email.categorization_prompt_hash = Some(fingerprints.categorization.to_string());
            }
            Err(e) => warn!(id = %email.id, error = %e, "Categorization failed for new email"),
        }

        self.limiter.acquire().await;
        match self
            .extractor
            .extract(&email.subject, &body, &prompts.action_item)
            .await
        {
            Ok(actions) => {
                email.actions = Some(normalize_ingested_actions(actions));
                email.action_prompt_hash = Some(fingerprints.action_item.to_string());
            }
            Err(e) => warn!(id = %email.id, error = %e, "Extraction failed for new email"),
        }

        self.store.upsert_email(&email).await?;
        info!(id = %email.id, category = ?email.category, "Stored new email");
        Ok(email)
    }

    async fn load_prompts(&self) -> Result<PromptConfig, PipelineError> {
        self.store.get_prompts().await.map_err(|e| {
            error!(error = %e, "Cannot read prompt configuration");
            PipelineError::PromptsUnavailable(e)
        })
    }

    /// Decide, run the required stages, and persist only what changed.
    ///
    /// The in-memory record takes the new values only after the store
    /// confirms the update, so a hash never points at an unpersisted value.
    async fn process_email(
        &self,
        email: &mut EmailRecord,
        prompts: &PromptConfig,
        fingerprints: &PromptFingerprints,
    ) -> EmailOutcome {
        let decision = decide_with(email, fingerprints);
        let mut outcome = EmailOutcome::new(&email.id, decision);

        if decision.is_noop() {
            debug!(id = %email.id, "Email up to date, skipping");
            return outcome;
        }

        let body = email.annotated_body();
        let mut update = EmailUpdate::default();

        if decision.categorize {
            self.limiter.acquire().await;
            outcome.model_calls += 1;
            match self
                .classifier
                .categorize(&email.subject, &body, &prompts.categorization)
                .await
            {
                Ok(label) => {
                    if email.category.as_deref() != Some(label.as_str()) {
                        update.category = Some(label);
                    }
                    if !fingerprints
                        .categorization
                        .matches(email.categorization_prompt_hash.as_deref())
                    {
                        update.categorization_prompt_hash =
                            Some(fingerprints.categorization.to_string());
                    }
                }
                Err(e) => {
                    warn!(id = %email.id, error = %e, "Categorization failed, keeping stored category");
                    outcome.errors.push(e.to_string());
                }
            }
        }

        if decision.extract {
            self.limiter.acquire().await;
            outcome.model_calls += 1;
            match self
                .extractor
                .extract(&email.subject, &body, &prompts.action_item)
                .await
            {
                Ok(actions) => {
                    if email.actions.as_ref() != Some(&actions) {
                        update.actions = Some(actions);
                    }
                    if !fingerprints
                        .action_item
                        .matches(email.action_prompt_hash.as_deref())
                    {
                        update.action_prompt_hash = Some(fingerprints.action_item.to_string());
                    }
                }
                Err(e) => {
                    warn!(id = %email.id, error = %e, "Extraction failed, keeping stored actions");
                    outcome.errors.push(e.to_string());
                }
            }
        }

        if update.is_empty() {
            outcome.status = if outcome.errors.len() == outcome.model_calls as usize {
                OutcomeStatus::StageFailed
            } else {
                OutcomeStatus::Unchanged
            };
            return outcome;
        }

        match self.store.update_email(&email.id, &update).await {
            Ok(()) => {
                email.apply(&update);
                outcome.status = OutcomeStatus::Updated;
                debug!(
                    id = %email.id,
                    category = ?email.category,
                    "Email updated"
                );
            }
            Err(source) => {
                let err = PipelineError::Persist {
                    id: email.id.clone(),
                    source,
                };
                error!(error = %err, "Failed to persist email update");
                outcome.errors.push(err.to_string());
                outcome.status = OutcomeStatus::PersistFailed;
            }
        }

        outcome
    }
}

/// `msg_<8 hex>` / `thd_<8 hex>` identifiers for a newly ingested email.
pub fn generate_email_ids() -> (String, String) {
    let short = || Uuid::new_v4().simple().to_string()[..8].to_string();
    (format!("msg_{}", short()), format!("thd_{}", short()))
}

/// New emails always carry an object; anything else becomes blank task/deadline.
fn normalize_ingested_actions(actions: Value) -> Value {
    if actions.is_object() {
        actions
    } else {
        json!({"task": "", "deadline": ""})
    }
}

//! Reply drafting: one-shot, stateless, strict JSON output.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::email::{EmailRecord, PromptConfig, PromptKind};
use crate::error::AgentError;
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::pipeline::stages::extract_json_object;

/// Sentinel instruction selecting the stored auto-reply prompt.
pub const STORED_REPLY_PROMPT: &str = "reply_prompt";

const TEMPERATURE: f32 = 0.1;

/// A drafted reply email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyDraft {
    pub subject: String,
    pub body: String,
}

/// Turn an optional caller instruction into the drafting instruction.
///
/// Absent, blank, or `reply_prompt` selects the stored auto-reply prompt.
pub fn resolve_instruction<'a>(requested: Option<&'a str>, prompts: &'a PromptConfig) -> &'a str {
    match requested.map(str::trim) {
        None | Some("") | Some(STORED_REPLY_PROMPT) => prompts.get(PromptKind::AutoReply),
        Some(custom) => custom,
    }
}

pub fn build_reply_prompt(subject: &str, body: &str, instruction: &str) -> String {
    format!(
        "You are an AI system that drafts a professional and context-aware email reply.\n\
         Below is the original email received:\n\n\
         Subject: {subject}\n\n\
         Body:\n{body}\n\n\
         Draft a reply email following these instructions:\n{instruction}\n\n\
         OUTPUT FORMAT (VERY IMPORTANT):\n\
         Return only valid JSON in the following structure:\n\n\
         {{\n  \"subject\": \"<reply email subject>\",\n  \"body\": \"<reply email body>\"\n}}\n\n\
         Do not include explanations, comments, or text outside the JSON.\n"
    )
}

/// Parse the model output as a `{subject, body}` draft.
pub fn parse_reply(raw: &str) -> Result<ReplyDraft, AgentError> {
    serde_json::from_str(raw.trim())
        .or_else(|_| serde_json::from_str(&extract_json_object(raw)))
        .map_err(|e: serde_json::Error| {
            warn!(error = %e, "Reply draft is not valid JSON");
            AgentError::InvalidOutput(e.to_string())
        })
}

pub struct ReplyDrafter {
    llm: Arc<dyn LlmProvider>,
}

impl ReplyDrafter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Draft a reply to `email` following `instruction`.
    ///
    /// The body sent to the model carries the timestamp and sender.
    /// Unparseable output is returned as `AgentError::InvalidOutput`.
    pub async fn draft(&self, email: &EmailRecord, instruction: &str) -> Result<ReplyDraft, AgentError> {
        let prompt = build_reply_prompt(&email.subject, &email.reply_context_body(), instruction);
        let request = CompletionRequest::from_prompt(prompt).with_temperature(TEMPERATURE);

        let response = self.llm.complete(request).await?;
        let draft = parse_reply(&response.content)?;
        debug!(id = %email.id, subject = %draft.subject, "Reply drafted");
        Ok(draft)
    }
}

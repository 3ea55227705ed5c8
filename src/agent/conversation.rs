//! Conversational agent: instruction-style follow-ups against one email.
//!
//! The agent holds a single session scoped to an anchor email id. Asking
//! about a different email discards the previous history and starts over
//! from the system message. The session lock is held for the whole
//! append → invoke → append turn, so concurrent turns are serialized.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::email::EmailRecord;
use crate::error::AgentError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

const SYSTEM_PROMPT: &str = "You are an AI assistant that processes emails strictly based on the user instructions. \
     Never assume anything outside the email.";

const TEMPERATURE: f32 = 0.1;

/// Wrap a free-text user request as a strict instruction.
pub fn strict_instruction(prompt: &str) -> String {
    format!("User instruction: {prompt}. Strictly follow this instruction.")
}

/// Ordered message log for one anchor email, system message first.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    anchor_id: String,
    history: Vec<ChatMessage>,
}

impl ConversationSession {
    pub fn new(anchor_id: &str) -> Self {
        Self {
            anchor_id: anchor_id.to_string(),
            history: vec![ChatMessage::system(SYSTEM_PROMPT)],
        }
    }

    pub fn anchor_id(&self) -> &str {
        &self.anchor_id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

fn user_turn(email: &EmailRecord, instruction: &str) -> String {
    format!(
        "\nINSTRUCTIONS: {instruction}\n\n\
         EMAIL DETAILS:\n\
         Subject: {}\n\
         Body: {}\n\
         Timestamp: {}\n\n\
         Follow instructions EXACTLY.\n \
         Do NOT invent or guess missing information. If it is out of context, \
         tell the user to stick to the email content only.\n",
        email.subject,
        email.annotated_body(),
        email.timestamp,
    )
}

/// Runs turns against the current session.
pub struct ConversationAgent {
    llm: Arc<dyn LlmProvider>,
    session: Mutex<Option<ConversationSession>>,
}

impl ConversationAgent {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            session: Mutex::new(None),
        }
    }

    /// One turn: reset if the anchor changed, append the user turn, invoke
    /// the model with the full history, append and return its reply.
    ///
    /// A failed model call leaves the history as it was before the turn.
    pub async fn ask(&self, email: &EmailRecord, instruction: &str) -> Result<String, AgentError> {
        let mut guard = self.session.lock().await;

        let needs_reset = guard
            .as_ref()
            .is_none_or(|session| session.anchor_id != email.id);
        if needs_reset {
            info!(anchor_id = %email.id, "Starting new conversation session");
            *guard = Some(ConversationSession::new(&email.id));
        }
        let session = guard.get_or_insert_with(|| ConversationSession::new(&email.id));

        session
            .history
            .push(ChatMessage::user(user_turn(email, instruction)));

        let request =
            CompletionRequest::new(session.history.clone()).with_temperature(TEMPERATURE);
        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                session.history.pop();
                return Err(e.into());
            }
        };

        let reply = response.content.trim().to_string();
        session.history.push(ChatMessage::assistant(&response.content));
        debug!(
            anchor_id = %session.anchor_id,
            history_len = session.history.len(),
            "Conversation turn complete"
        );
        Ok(reply)
    }

    /// Snapshot of the current session, if any.
    pub async fn session(&self) -> Option<ConversationSession> {
        self.session.lock().await.clone()
    }
}

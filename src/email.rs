//! Email records, partial updates, and the prompt configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored email plus its derived classification state.
///
/// `categorization_prompt_hash` / `action_prompt_hash` record which prompt
/// fingerprint produced the currently stored `category` / `actions`, not
/// necessarily the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body_text: String,
    /// ISO-8601 timestamp string, kept verbatim.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Prompt-defined structure; the shape is whatever the action prompt asked for.
    #[serde(default)]
    pub actions: Option<Value>,
    #[serde(default)]
    pub categorization_prompt_hash: Option<String>,
    #[serde(default)]
    pub action_prompt_hash: Option<String>,
}

impl EmailRecord {
    /// Body with the timestamp appended, as fed to the categorize/extract stages.
    pub fn annotated_body(&self) -> String {
        format!("{}\n\nTimestamp: {}", self.body_text, self.timestamp)
    }

    /// Body with timestamp and sender appended, as fed to the reply drafter.
    pub fn reply_context_body(&self) -> String {
        let sender = if self.sender_name.trim().is_empty() {
            "Unknown Sender"
        } else {
            self.sender_name.as_str()
        };
        format!(
            "{}\n\nTimestamp: {}\nSender: {}",
            self.body_text, self.timestamp, sender
        )
    }

    /// True when a non-blank category is stored.
    pub fn has_category(&self) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    /// True when a non-empty actions value is stored.
    pub fn has_actions(&self) -> bool {
        !actions_missing(self.actions.as_ref())
    }

    /// Merge the fields present in `update` into this record.
    pub fn apply(&mut self, update: &EmailUpdate) {
        if let Some(ref category) = update.category {
            self.category = Some(category.clone());
        }
        if let Some(ref hash) = update.categorization_prompt_hash {
            self.categorization_prompt_hash = Some(hash.clone());
        }
        if let Some(ref actions) = update.actions {
            self.actions = Some(actions.clone());
        }
        if let Some(ref hash) = update.action_prompt_hash {
            self.action_prompt_hash = Some(hash.clone());
        }
    }
}

/// Null, empty string, empty array and empty object all count as "no actions".
pub fn actions_missing(actions: Option<&Value>) -> bool {
    match actions {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Partial update of the derived fields. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorization_prompt_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_prompt_hash: Option<String>,
}

impl EmailUpdate {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.categorization_prompt_hash.is_none()
            && self.actions.is_none()
            && self.action_prompt_hash.is_none()
    }
}

/// A manually submitted email awaiting ids, classification and storage.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEmail {
    pub sender_name: String,
    pub sender_email: String,
    pub subject: String,
    pub body_text: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default = "default_folder")]
    pub folder: String,
}

fn default_folder() -> String {
    "Inbox".to_string()
}

/// The three user-editable prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub categorization: String,
    #[serde(default)]
    pub action_item: String,
    #[serde(default)]
    pub auto_reply: String,
}

/// Which of the three prompts is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Categorization,
    ActionItem,
    AutoReply,
}

impl PromptConfig {
    pub fn get(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::Categorization => &self.categorization,
            PromptKind::ActionItem => &self.action_item,
            PromptKind::AutoReply => &self.auto_reply,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.categorization.trim().is_empty()
            && self.action_item.trim().is_empty()
            && self.auto_reply.trim().is_empty()
    }
}

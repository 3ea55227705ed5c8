//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, DEFAULT_MAX_TOKENS, FinishReason,
    LlmProvider, Role,
};

/// Adapter wrapping any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Messages split into rig's preamble / history / prompt shape.
#[derive(Debug, PartialEq)]
struct SplitMessages {
    preamble: Option<String>,
    history: Vec<ChatMessage>,
    prompt: String,
}

/// System messages become the preamble; the trailing user message is the
/// prompt and everything in between is history.
fn split_messages(mut messages: Vec<ChatMessage>) -> Result<SplitMessages, String> {
    let prompt = match messages.pop() {
        Some(last) if last.role == Role::User => last.content,
        Some(_) => return Err("last message must come from the user".into()),
        None => return Err("no messages in request".into()),
    };

    let system: Vec<String> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.clone())
        .collect();
    let preamble = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };

    let history = messages
        .into_iter()
        .filter(|m| m.role != Role::System)
        .collect();

    Ok(SplitMessages {
        preamble,
        history,
        prompt,
    })
}

fn to_rig_message(message: ChatMessage) -> Message {
    match message.role {
        Role::Assistant => Message::assistant(message.content),
        Role::User | Role::System => Message::user(message.content),
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let split = split_messages(request.messages).map_err(|reason| {
            LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason,
            }
        })?;

        let history: Vec<Message> = split.history.into_iter().map(to_rig_message).collect();
        let mut builder = self
            .model
            .completion_request(Message::user(split.prompt))
            .messages(history)
            .max_tokens(u64::from(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)));
        if let Some(preamble) = split.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_single_prompt() {
        let split = split_messages(vec![ChatMessage::user("hello")]).unwrap();
        assert_eq!(split.preamble, None);
        assert!(split.history.is_empty());
        assert_eq!(split.prompt, "hello");
    }

    #[test]
    fn split_conversation_with_system() {
        let split = split_messages(vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("first"),
            ChatMessage::assistant("ok"),
            ChatMessage::user("second"),
        ])
        .unwrap();
        assert_eq!(split.preamble.as_deref(), Some("be terse"));
        assert_eq!(
            split.history,
            vec![ChatMessage::user("first"), ChatMessage::assistant("ok")]
        );
        assert_eq!(split.prompt, "second");
    }

    #[test]
    fn split_rejects_trailing_assistant() {
        let result = split_messages(vec![ChatMessage::user("a"), ChatMessage::assistant("b")]);
        assert!(result.is_err());
    }

    #[test]
    fn split_rejects_empty() {
        assert!(split_messages(vec![]).is_err());
    }
}

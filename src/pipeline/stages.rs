//! LLM-backed stages: categorization and action-item extraction.
//!
//! A model call failure is returned to the caller as a per-email
//! `PipelineError::Stage`. Unparseable extraction output is not an error:
//! it yields an empty JSON object.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::provider::{CompletionRequest, LlmProvider};

/// Temperature for both stages.
const STAGE_TEMPERATURE: f32 = 0.1;

/// Max tokens for a category label.
const CATEGORY_MAX_TOKENS: u32 = 64;

/// Max tokens for the extracted JSON object.
const EXTRACTION_MAX_TOKENS: u32 = 1024;

/// Formats the categorization prompt and returns the model's label verbatim.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Categorize one email. Any trimmed text the model returns is accepted.
    pub async fn categorize(
        &self,
        subject: &str,
        body: &str,
        instruction: &str,
    ) -> Result<String, PipelineError> {
        let request =
            CompletionRequest::from_prompt(build_categorization_prompt(instruction, subject, body))
                .with_temperature(STAGE_TEMPERATURE)
                .with_max_tokens(CATEGORY_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| PipelineError::Stage {
                stage: "categorization",
                source,
            })?;

        let label = response.content.trim().to_string();
        debug!(label = %label, "Categorization complete");
        Ok(label)
    }
}

/// Formats the action-item prompt and parses the model output as JSON.
pub struct Extractor {
    llm: Arc<dyn LlmProvider>,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Extract the fields requested by `fields_requested`.
    ///
    /// Returns the parsed JSON as-is, or an empty object when the output
    /// does not parse.
    pub async fn extract(
        &self,
        subject: &str,
        body: &str,
        fields_requested: &str,
    ) -> Result<Value, PipelineError> {
        let request = CompletionRequest::from_prompt(build_extraction_prompt(
            fields_requested,
            subject,
            body,
        ))
        .with_temperature(STAGE_TEMPERATURE)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| PipelineError::Stage {
                stage: "extraction",
                source,
            })?;

        Ok(parse_extraction(&response.content))
    }
}

/// The value stored when extraction output is not valid JSON.
pub fn empty_extraction() -> Value {
    Value::Object(serde_json::Map::new())
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the categorization prompt: user instruction followed by the email.
pub fn build_categorization_prompt(instruction: &str, subject: &str, body: &str) -> String {
    format!(
        "{instruction}\n\n\
         Email:\n\
         Subject: {subject}\n\
         Body: {body}\n\n\
         Return ONLY the category."
    )
}

/// Build the extraction prompt. The user decides which fields are wanted.
pub fn build_extraction_prompt(fields_requested: &str, subject: &str, body: &str) -> String {
    format!(
        "You are an AI that extracts structured information from email content.\n\
         The user will decide which fields need to be extracted.\n\n\
         Rules:\n\
         1. Return ONLY a valid JSON object.\n\
         2. The JSON must contain EXACTLY the fields specified by the user.\n\
         3. If a field is not found in the email, return an empty string for that field.\n\
         4. Do NOT include any extra fields.\n\
         5. Do NOT explain anything outside of the JSON.\n\n\
         Fields to extract: {fields_requested}\n\n\
         Email:\n\
         Subject: {subject}\n\
         Body: {body}\n"
    )
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse extraction output, falling back to an empty object.
pub fn parse_extraction(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }

    match serde_json::from_str::<Value>(&extract_json_object(trimmed)) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                error = %e,
                raw_response = %trimmed.chars().take(200).collect::<String>(),
                "Extraction output is not valid JSON, using empty result"
            );
            empty_extraction()
        }
    }
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
pub(crate) fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use serde_json::json;

    // ── Prompt construction tests ───────────────────────────────────

    #[test]
    fn categorization_prompt_embeds_instruction_and_email() {
        let prompt = build_categorization_prompt("Pick Work or Personal", "Lunch?", "Free at noon");
        assert!(prompt.starts_with("Pick Work or Personal"));
        assert!(prompt.contains("Subject: Lunch?"));
        assert!(prompt.contains("Body: Free at noon"));
        assert!(prompt.ends_with("Return ONLY the category."));
    }

    #[test]
    fn extraction_prompt_lists_fields() {
        let prompt = build_extraction_prompt("task, deadline", "Report", "Due Monday");
        assert!(prompt.contains("Fields to extract: task, deadline"));
        assert!(prompt.contains("Return ONLY a valid JSON object."));
        assert!(prompt.contains("Subject: Report"));
    }

    // ── Parsing tests ───────────────────────────────────────────────

    #[test]
    fn parse_plain_object() {
        let v = parse_extraction(r#"{"task": "send report", "deadline": ""}"#);
        assert_eq!(v, json!({"task": "send report", "deadline": ""}));
    }

    #[test]
    fn parse_array_kept_as_is() {
        let v = parse_extraction(r#"[{"task": "a"}, {"task": "b"}]"#);
        assert_eq!(v, json!([{"task": "a"}, {"task": "b"}]));
    }

    #[test]
    fn parse_markdown_wrapped_object() {
        let v = parse_extraction("```json\n{\"task\": \"call Bob\"}\n```");
        assert_eq!(v, json!({"task": "call Bob"}));
    }

    #[test]
    fn parse_object_with_chatter() {
        let v = parse_extraction("Sure! {\"deadline\": \"Friday\"} Hope that helps.");
        assert_eq!(v, json!({"deadline": "Friday"}));
    }

    #[test]
    fn parse_garbage_yields_empty_object() {
        assert_eq!(parse_extraction("I could not find any tasks."), json!({}));
        assert_eq!(parse_extraction(""), json!({}));
        assert_eq!(parse_extraction("{not json"), json!({}));
    }

    // ── Stage tests with scripted LLM ───────────────────────────────

    #[tokio::test]
    async fn classifier_returns_trimmed_label_verbatim() {
        let llm = Arc::new(ScriptedLlm::fixed("  Definitely-Not-A-Real-Category \n"));
        let classifier = Classifier::new(llm.clone());

        let label = classifier.categorize("s", "b", "Categorize").await.unwrap();
        assert_eq!(label, "Definitely-Not-A-Real-Category");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(STAGE_TEMPERATURE));
        assert!(requests[0].messages[0].content.contains("Return ONLY the category."));
    }

    #[tokio::test]
    async fn classifier_propagates_model_failure() {
        let classifier = Classifier::new(Arc::new(ScriptedLlm::failing()));
        let err = classifier.categorize("s", "b", "p").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: "categorization",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn extractor_parses_json() {
        let extractor = Extractor::new(Arc::new(ScriptedLlm::fixed(r#"{"task": "pay"}"#)));
        let v = extractor.extract("s", "b", "task").await.unwrap();
        assert_eq!(v, json!({"task": "pay"}));
    }

    #[tokio::test]
    async fn extractor_parse_failure_is_not_an_error() {
        let extractor = Extractor::new(Arc::new(ScriptedLlm::fixed("no json here")));
        let v = extractor.extract("s", "b", "task").await.unwrap();
        assert_eq!(v, empty_extraction());
    }

    #[tokio::test]
    async fn extractor_propagates_model_failure() {
        let extractor = Extractor::new(Arc::new(ScriptedLlm::failing()));
        let err = extractor.extract("s", "b", "task").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: "extraction",
                ..
            }
        ));
    }
}

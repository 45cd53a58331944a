//! Chat-completion client for answer generation.

use serde::Serialize;
use serde_json::Value;

use crate::config::ChatConfig;
use crate::error::{Error, Result};

/// Shown to the user when the service reply carries no usable answer text.
pub const NO_ANSWER_FALLBACK: &str = "No answer was received from the model.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Outcome of one chat exchange, decided once at the service boundary:
/// either the assistant's text, or the raw reply when it does not have the
/// expected shape.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    Answer(String),
    Unrecognized(Value),
}

impl ChatOutcome {
    /// The answer text, or the fixed fallback for unrecognized replies.
    pub fn into_text(self) -> String {
        match self {
            ChatOutcome::Answer(text) => text,
            ChatOutcome::Unrecognized(_) => NO_ANSWER_FALLBACK.to_string(),
        }
    }
}

/// Classify a raw chat service reply. The answer is expected at
/// `message.content`; anything else is surfaced as `Unrecognized`.
pub fn outcome_from_response(value: Value) -> ChatOutcome {
    match value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(content) if !content.trim().is_empty() => {
            ChatOutcome::Answer(content.trim().to_string())
        }
        _ => ChatOutcome::Unrecognized(value),
    }
}

/// Build the two-message prompt: the grounding system instruction plus the
/// context block and question.
pub fn build_prompt(system_prompt: &str, context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion: {}",
            context, question
        )),
    ]
}

/// Ollama `/api/chat` client. One blocking exchange per call: no retries,
/// no streaming, timeout enforced by the HTTP client alone.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub async fn send(&self, messages: &[ChatMessage]) -> Result<ChatOutcome> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            stream: bool,
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&Request {
                model: &self.model,
                messages,
                stream: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Chat(format!(
                "Chat request failed with HTTP {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        Ok(outcome_from_response(body))
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_reply_is_an_answer() {
        let outcome = outcome_from_response(json!({
            "model": "llama3:latest",
            "message": {"role": "assistant", "content": "The war ended in 1945."},
            "done": true
        }));

        match outcome {
            ChatOutcome::Answer(text) => assert_eq!(text, "The war ended in 1945."),
            ChatOutcome::Unrecognized(_) => panic!("Expected an answer"),
        }
    }

    #[test]
    fn test_missing_message_is_unrecognized() {
        let raw = json!({"model": "llama3:latest", "done": true});
        let outcome = outcome_from_response(raw.clone());

        match outcome {
            ChatOutcome::Unrecognized(value) => assert_eq!(value, raw),
            ChatOutcome::Answer(_) => panic!("Expected unrecognized reply"),
        }
    }

    #[test]
    fn test_empty_content_is_unrecognized() {
        let outcome = outcome_from_response(json!({
            "message": {"role": "assistant", "content": "   "}
        }));
        assert!(matches!(outcome, ChatOutcome::Unrecognized(_)));
    }

    #[test]
    fn test_unrecognized_maps_to_fallback_text() {
        let outcome = outcome_from_response(json!({"done": true}));
        assert_eq!(outcome.into_text(), NO_ANSWER_FALLBACK);
    }

    #[test]
    fn test_prompt_shape() {
        let messages = build_prompt(
            "Answer only from the context.",
            "chunk one\n\nchunk two",
            "When did the war end?",
        );

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "Answer only from the context.");
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.starts_with("Context:\nchunk one"));
        assert!(messages[1].content.ends_with("Question: When did the war end?"));
    }
}

//! LLM port - interface for language model interactions.
//!
//! The core needs exactly two operations from a provider: generate free
//! text, and (optionally) generate a schema-validated object. Providers are
//! selected by configuration; the replay provider substitutes cached
//! responses from a prior session's log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod anthropic;
mod replay;
mod scripted;

pub use anthropic::AnthropicClient;
pub use replay::{Divergence, ReplayProvider};
pub use scripted::ScriptedLlm;

/// Error type for LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    #[error("LLM returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("LLM request timed out")]
    Timeout,

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Provider does not support structured output")]
    StructuredUnsupported,

    #[error("Replay cache exhausted for agent '{0}'")]
    CacheExhausted(String),
}

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The calling agent; keys the replay cache and the call-sequence log.
    pub agent_id: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn new(agent_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            agent_id: agent_id.into(),
            system_prompt: None,
            messages,
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// The exchange as it is written to `llm_call` events. The replay
    /// provider compares against exactly this form, so logging and
    /// divergence detection can never drift apart.
    pub fn to_logged_messages(&self) -> Vec<aeonisk_domain::events::LoggedMessage> {
        let mut logged = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system_prompt {
            logged.push(aeonisk_domain::events::LoggedMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for message in &self.messages {
            logged.push(aeonisk_domain::events::LoggedMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            });
        }
        logged
    }

    /// Flattened prompt text, used for replay divergence detection.
    pub fn prompt_text(&self) -> String {
        let mut text = String::new();
        if let Some(system) = &self.system_prompt {
            text.push_str(system);
            text.push('\n');
        }
        for message in &self.messages {
            text.push_str(message.role.as_str());
            text.push_str(": ");
            text.push_str(&message.content);
            text.push('\n');
        }
        text
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Response from the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Port for LLM interactions.
#[async_trait]
pub trait LlmPort: Send + Sync {
    /// Generate a free-text response.
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Generate a response validated against a JSON schema. Providers that
    /// cannot do this return `StructuredUnsupported` and callers fall back
    /// to marker parsing.
    async fn generate_structured(
        &self,
        _request: LlmRequest,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        Err(LlmError::StructuredUnsupported)
    }

    /// Whether `generate_structured` is expected to succeed.
    fn supports_structured(&self) -> bool {
        false
    }

    /// Model identifier recorded in `llm_call` events.
    fn model_name(&self) -> String;
}

// Shared providers (the replay driver keeps a handle to read divergences
// after the session ends) can be used wherever a port is expected.
#[async_trait]
impl<T: LlmPort + ?Sized> LlmPort for std::sync::Arc<T> {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).generate(request).await
    }

    async fn generate_structured(
        &self,
        request: LlmRequest,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        (**self).generate_structured(request, schema).await
    }

    fn supports_structured(&self) -> bool {
        (**self).supports_structured()
    }

    fn model_name(&self) -> String {
        (**self).model_name()
    }
}

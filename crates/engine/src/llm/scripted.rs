//! Scripted LLM provider for tests and pure-mechanics runs.
//!
//! Responses are queued per agent and consumed in order; a missing queue
//! entry falls back to the default response when one is set. The scenario
//! suite scripts whole sessions this way, in the same spirit as cassette
//! playback.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{LlmError, LlmPort, LlmRequest, LlmResponse, TokenUsage};

/// Deterministic canned-response provider.
#[derive(Default)]
pub struct ScriptedLlm {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    default_response: Option<String>,
    structured: bool,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this text when an agent's queue is empty.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    /// Advertise structured-output support; queued responses must then be
    /// valid JSON when consumed structurally.
    pub fn with_structured_support(mut self) -> Self {
        self.structured = true;
        self
    }

    /// Queue the next response for an agent.
    pub fn push_response(&self, agent_id: impl Into<String>, response: impl Into<String>) {
        if let Ok(mut queues) = self.queues.lock() {
            queues
                .entry(agent_id.into())
                .or_default()
                .push_back(response.into());
        }
    }

    fn next_response(&self, agent_id: &str) -> Result<String, LlmError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| LlmError::RequestFailed("script queue poisoned".to_string()))?;
        if let Some(response) = queues.get_mut(agent_id).and_then(VecDeque::pop_front) {
            return Ok(response);
        }
        self.default_response
            .clone()
            .ok_or_else(|| LlmError::CacheExhausted(agent_id.to_string()))
    }
}

#[async_trait]
impl LlmPort for ScriptedLlm {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let content = self.next_response(&request.agent_id)?;
        Ok(LlmResponse {
            content,
            usage: TokenUsage::default(),
        })
    }

    async fn generate_structured(
        &self,
        request: LlmRequest,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        if !self.structured {
            return Err(LlmError::StructuredUnsupported);
        }
        let content = self.next_response(&request.agent_id)?;
        serde_json::from_str(&content)
            .map_err(|e| LlmError::InvalidResponse(format!("scripted response is not JSON: {e}")))
    }

    fn supports_structured(&self) -> bool {
        self.structured
    }

    fn model_name(&self) -> String {
        "scripted".to_string()
    }
}

//! Log-driven LLM playback.
//!
//! A replay provider is built from a prior session's event log: every
//! `llm_call` record becomes a cached response, keyed by agent id and
//! consumed in call-sequence order. Prompt content is compared against the
//! recording; a mismatch (usually a prompt-template change between runs)
//! is reported as a divergence but still serves the cached response, so a
//! replay always runs to completion and the report tells you how far it
//! can be trusted.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use aeonisk_domain::events::{EventRecord, LoggedMessage, SessionEvent};

use super::{LlmError, LlmPort, LlmRequest, LlmResponse, TokenUsage};

/// A recorded divergence between the live prompt and the cached one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub agent_id: String,
    pub call_sequence: u32,
    pub detail: String,
}

struct CachedCall {
    call_sequence: u32,
    messages: Vec<LoggedMessage>,
    response: String,
    input_tokens: u32,
    output_tokens: u32,
}

/// Mock LLM provider backed by a session log.
pub struct ReplayProvider {
    cache: Mutex<HashMap<String, Vec<CachedCall>>>,
    divergences: Mutex<Vec<Divergence>>,
    model: String,
}

impl ReplayProvider {
    /// Build the cache from loaded events.
    pub fn from_events(events: &[EventRecord]) -> Self {
        let mut cache: HashMap<String, Vec<CachedCall>> = HashMap::new();
        let mut model = String::from("replay");
        for record in events {
            if let SessionEvent::LlmCall {
                agent_id,
                call_sequence,
                messages,
                response,
                model: call_model,
                input_tokens,
                output_tokens,
                ..
            } = &record.event
            {
                model = call_model.clone();
                cache
                    .entry(agent_id.to_string())
                    .or_default()
                    .push(CachedCall {
                        call_sequence: *call_sequence,
                        messages: messages.clone(),
                        response: response.clone(),
                        input_tokens: *input_tokens,
                        output_tokens: *output_tokens,
                    });
            }
        }
        // Serve each agent's calls in their original sequence order.
        for calls in cache.values_mut() {
            calls.sort_by_key(|c| c.call_sequence);
        }
        Self {
            cache: Mutex::new(cache),
            divergences: Mutex::new(Vec::new()),
            model,
        }
    }

    /// Divergences observed so far.
    pub fn divergences(&self) -> Vec<Divergence> {
        self.divergences
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    fn next_call(&self, agent_id: &str) -> Result<CachedCall, LlmError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| LlmError::RequestFailed("replay cache poisoned".to_string()))?;
        let calls = cache
            .get_mut(agent_id)
            .ok_or_else(|| LlmError::CacheExhausted(agent_id.to_string()))?;
        if calls.is_empty() {
            return Err(LlmError::CacheExhausted(agent_id.to_string()));
        }
        Ok(calls.remove(0))
    }

    fn check_divergence(&self, request: &LlmRequest, cached: &CachedCall) {
        let live = request.to_logged_messages();
        if live != cached.messages {
            let divergence = Divergence {
                agent_id: request.agent_id.clone(),
                call_sequence: cached.call_sequence,
                detail: "prompt content differs from recording".to_string(),
            };
            warn!(
                agent_id = %divergence.agent_id,
                call_sequence = divergence.call_sequence,
                "replay divergence: {}",
                divergence.detail
            );
            if let Ok(mut divergences) = self.divergences.lock() {
                divergences.push(divergence);
            }
        }
    }
}

#[async_trait]
impl LlmPort for ReplayProvider {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let cached = self.next_call(&request.agent_id)?;
        self.check_divergence(&request, &cached);
        Ok(LlmResponse {
            content: cached.response,
            usage: TokenUsage {
                input_tokens: cached.input_tokens,
                output_tokens: cached.output_tokens,
            },
        })
    }

    async fn generate_structured(
        &self,
        request: LlmRequest,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        let cached = self.next_call(&request.agent_id)?;
        self.check_divergence(&request, &cached);
        serde_json::from_str(&cached.response).map_err(|e| {
            LlmError::InvalidResponse(format!("cached response is not structured JSON: {e}"))
        })
    }

    fn supports_structured(&self) -> bool {
        true
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

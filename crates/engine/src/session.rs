//! Session-scoped context threaded through every component.
//!
//! There is no ambient global state: the orchestrator builds one
//! `SessionContext` carrying the seeded RNG, the event log handle, the
//! prompt store, the LLM provider, and the target-id map, and passes it
//! down. Every LLM call is funneled through here so the call sequence,
//! the `llm_call` event, and the replay cache can never disagree.

use chrono::Utc;
use std::collections::HashMap;

use tracing::warn;

use aeonisk_domain::events::{EventRecord, PromptMetadata, SessionEvent};
use aeonisk_domain::SessionId;

use crate::eventlog::{EventLog, EventLogError};
use crate::llm::{LlmError, LlmPort, LlmRequest, LlmResponse};
use crate::prompts::PromptStore;
use crate::rng::SessionRng;
use crate::targeting::TargetIdMap;

/// Everything a component needs from the running session.
pub struct SessionContext {
    pub session_id: SessionId,
    pub round: u32,
    pub rng: SessionRng,
    pub log: EventLog,
    pub prompts: PromptStore,
    pub provider: Box<dyn LlmPort>,
    pub targets: TargetIdMap,
    pub free_targeting: bool,
    call_sequences: HashMap<String, u32>,
}

impl SessionContext {
    pub fn new(
        session_id: SessionId,
        rng: SessionRng,
        log: EventLog,
        prompts: PromptStore,
        provider: Box<dyn LlmPort>,
        free_targeting: bool,
    ) -> Self {
        Self {
            session_id,
            round: 0,
            rng,
            log,
            prompts,
            provider,
            targets: TargetIdMap::new(),
            free_targeting,
            call_sequences: HashMap::new(),
        }
    }

    /// Append an event for the current round.
    pub fn emit(&mut self, event: SessionEvent) -> Result<(), EventLogError> {
        let record = EventRecord::new(Utc::now(), self.session_id, self.round, event);
        self.log.append(&record)
    }

    /// Append an event carrying prompt provenance.
    pub fn emit_with_metadata(
        &mut self,
        event: SessionEvent,
        metadata: PromptMetadata,
    ) -> Result<(), EventLogError> {
        let record = EventRecord::new(Utc::now(), self.session_id, self.round, event)
            .with_prompt_metadata(metadata);
        self.log.append(&record)
    }

    fn next_sequence(&mut self, agent_id: &str) -> u32 {
        let sequence = self.call_sequences.entry(agent_id.to_string()).or_insert(0);
        *sequence += 1;
        *sequence
    }

    /// Issue a free-text LLM call, logging the full exchange.
    pub async fn llm_call(
        &mut self,
        request: LlmRequest,
        metadata: Option<PromptMetadata>,
    ) -> Result<LlmResponse, LlmError> {
        let sequence = self.next_sequence(&request.agent_id);
        let messages = request.to_logged_messages();
        let agent_id = request.agent_id.clone();
        let temperature = request.temperature;
        let response = self.provider.generate(request).await?;

        let event = SessionEvent::LlmCall {
            agent_id: aeonisk_domain::AgentId::new(agent_id),
            call_sequence: sequence,
            messages,
            response: response.content.clone(),
            model: self.provider.model_name(),
            temperature,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        };
        let logged = match metadata {
            Some(metadata) => self.emit_with_metadata(event, metadata),
            None => self.emit(event),
        };
        if let Err(e) = logged {
            // The call already happened; losing the record is worth a
            // warning but must not fail the turn.
            warn!(error = %e, "failed to log llm_call event");
        }
        Ok(response)
    }

    /// Issue a structured LLM call; the serialized object is what gets
    /// logged (and therefore replayed).
    pub async fn llm_call_structured(
        &mut self,
        request: LlmRequest,
        schema: &serde_json::Value,
        metadata: Option<PromptMetadata>,
    ) -> Result<serde_json::Value, LlmError> {
        let sequence = self.next_sequence(&request.agent_id);
        let messages = request.to_logged_messages();
        let agent_id = request.agent_id.clone();
        let temperature = request.temperature;
        let value = self.provider.generate_structured(request, schema).await?;

        let response_text = serde_json::to_string(&value)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let event = SessionEvent::LlmCall {
            agent_id: aeonisk_domain::AgentId::new(agent_id),
            call_sequence: sequence,
            messages,
            response: response_text,
            model: self.provider.model_name(),
            temperature,
            input_tokens: 0,
            output_tokens: 0,
        };
        let logged = match metadata {
            Some(metadata) => self.emit_with_metadata(event, metadata),
            None => self.emit(event),
        };
        if let Err(e) = logged {
            warn!(error = %e, "failed to log llm_call event");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventlog::parse_lines;
    use crate::llm::{ChatMessage, ScriptedLlm};

    fn context(llm: ScriptedLlm) -> SessionContext {
        SessionContext::new(
            SessionId::new(),
            SessionRng::new(42),
            EventLog::in_memory(),
            PromptStore::new("scripted", "en"),
            Box::new(llm),
            false,
        )
    }

    #[tokio::test]
    async fn llm_calls_are_sequenced_per_agent() {
        let llm = ScriptedLlm::new().with_default_response("ok");
        let mut ctx = context(llm);
        ctx.llm_call(LlmRequest::new("dm", vec![ChatMessage::user("a")]), None)
            .await
            .unwrap();
        ctx.llm_call(LlmRequest::new("pc_nyx", vec![ChatMessage::user("b")]), None)
            .await
            .unwrap();
        ctx.llm_call(LlmRequest::new("dm", vec![ChatMessage::user("c")]), None)
            .await
            .unwrap();

        let raw = String::from_utf8(ctx.log.memory_contents().unwrap().to_vec()).unwrap();
        let events = parse_lines(raw.lines().map(String::from).collect()).unwrap();
        let sequences: Vec<(String, u32)> = events
            .iter()
            .filter_map(|r| match &r.event {
                SessionEvent::LlmCall {
                    agent_id,
                    call_sequence,
                    ..
                } => Some((agent_id.to_string(), *call_sequence)),
                _ => None,
            })
            .collect();
        assert_eq!(
            sequences,
            vec![
                ("dm".to_string(), 1),
                ("pc_nyx".to_string(), 1),
                ("dm".to_string(), 2)
            ]
        );
    }

    #[tokio::test]
    async fn llm_call_logs_prompt_and_response() {
        let llm = ScriptedLlm::new().with_default_response("The vault groans.");
        let mut ctx = context(llm);
        let request = LlmRequest::new("dm", vec![ChatMessage::user("narrate")])
            .with_system_prompt("You are the DM.");
        ctx.llm_call(request, None).await.unwrap();

        let raw = String::from_utf8(ctx.log.memory_contents().unwrap().to_vec()).unwrap();
        let events = parse_lines(raw.lines().map(String::from).collect()).unwrap();
        let SessionEvent::LlmCall {
            messages, response, ..
        } = &events[0].event
        else {
            panic!("expected llm_call");
        };
        assert_eq!(messages[0].role, "system");
        assert_eq!(response, "The vault groans.");
    }
}

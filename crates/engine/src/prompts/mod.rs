//! Versioned prompt store.
//!
//! Prompt files are keyed by provider x language x agent type and carry a
//! `version` string plus a `sections` map. Built-in defaults are compiled
//! in; a prompt directory on disk overrides them file by file. Requested
//! sections are composed blank-line separated with `{variable}`
//! substitution, and the resulting metadata flows into every `llm_call`
//! event so prompt changes can be correlated with behavior.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use aeonisk_domain::events::PromptMetadata;

mod defaults;

/// Error type for prompt loading.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("No prompt file for agent type '{0}'")]
    UnknownAgentType(String),

    #[error("Unknown prompt section '{section}' for agent type '{agent_type}'")]
    UnknownSection {
        agent_type: String,
        section: String,
    },

    #[error("Failed to read prompt file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse prompt file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One prompt file: a version and its named sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptFile {
    pub version: String,
    pub sections: BTreeMap<String, String>,
}

/// A composed prompt ready to send, with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedPrompt {
    pub text: String,
    pub metadata: PromptMetadata,
}

/// Loads and composes versioned prompt templates.
pub struct PromptStore {
    provider: String,
    language: String,
    root: Option<PathBuf>,
    cache: Mutex<HashMap<String, PromptFile>>,
}

impl PromptStore {
    pub fn new(provider: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            language: language.into(),
            root: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Override built-in templates from `<root>/<provider>/<language>/<agent_type>.json`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Compose the requested sections for an agent type, substituting
    /// `{variable}` placeholders. Missing variables substitute as empty
    /// strings with a warning.
    pub fn compose(
        &self,
        agent_type: &str,
        sections: &[&str],
        variables: &HashMap<String, String>,
    ) -> Result<LoadedPrompt, PromptError> {
        let file = self.load(agent_type)?;
        let mut parts = Vec::with_capacity(sections.len());
        for section in sections {
            let template = file.sections.get(*section).ok_or_else(|| {
                PromptError::UnknownSection {
                    agent_type: agent_type.to_string(),
                    section: (*section).to_string(),
                }
            })?;
            parts.push(substitute(template, variables, agent_type, section));
        }
        Ok(LoadedPrompt {
            text: parts.join("\n\n"),
            metadata: PromptMetadata {
                version: file.version.clone(),
                provider: self.provider.clone(),
                language: self.language.clone(),
                template: format!("{agent_type}/{}", sections.join("+")),
            },
        })
    }

    fn load(&self, agent_type: &str) -> Result<PromptFile, PromptError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(file) = cache.get(agent_type) {
                return Ok(file.clone());
            }
        }
        let file = self.load_uncached(agent_type)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(agent_type.to_string(), file.clone());
        }
        Ok(file)
    }

    fn load_uncached(&self, agent_type: &str) -> Result<PromptFile, PromptError> {
        if let Some(root) = &self.root {
            let path = root
                .join(&self.provider)
                .join(&self.language)
                .join(format!("{agent_type}.json"));
            if path.is_file() {
                let raw = std::fs::read_to_string(&path)?;
                return Ok(serde_json::from_str(&raw)?);
            }
        }
        defaults::builtin(agent_type)
            .ok_or_else(|| PromptError::UnknownAgentType(agent_type.to_string()))
    }
}

/// Replace `{name}` placeholders from the variable map.
fn substitute(
    template: &str,
    variables: &HashMap<String, String>,
    agent_type: &str,
    section: &str,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if after[..end].chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                let name = &after[..end];
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        warn!(agent_type, section, variable = name, "missing prompt variable");
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

//! Analysis request construction and validation

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Role instruction sent ahead of every analysis
pub const SYSTEM_PROMPT: &str =
    "You are an AI assistant who is an expert at analyzing legal documents and contracts.";

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 500..=4000;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1500;

/// Hosted chat models offered for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum ModelId {
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[default]
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [ModelId::Gpt35Turbo, ModelId::Gpt4, ModelId::Gpt4Turbo];

    /// API model identifier
    pub const fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gpt35Turbo => "gpt-3.5-turbo",
            ModelId::Gpt4 => "gpt-4",
            ModelId::Gpt4Turbo => "gpt-4-turbo",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ModelId::ALL
            .into_iter()
            .find(|model| model.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownModel {
                model: s.to_string(),
            })
    }
}

/// Bearer credential for the completion API. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key, treating blank input as absent
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Settings for one analysis, resolved from the caller's input and the
/// server defaults. Lives for a single request.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub credential: Option<ApiKey>,
    pub model: ModelId,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential: None,
            model: ModelId::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl SessionConfig {
    /// Check the generation parameters against their allowed ranges
    pub fn validate(&self) -> Result<()> {
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(Error::InvalidParameter {
                name: "temperature".to_string(),
                reason: format!(
                    "{} is outside {}..={}",
                    self.temperature,
                    TEMPERATURE_RANGE.start(),
                    TEMPERATURE_RANGE.end()
                ),
            });
        }
        if !MAX_TOKENS_RANGE.contains(&self.max_tokens) {
            return Err(Error::InvalidParameter {
                name: "max_tokens".to_string(),
                reason: format!(
                    "{} is outside {}..={}",
                    self.max_tokens,
                    MAX_TOKENS_RANGE.start(),
                    MAX_TOKENS_RANGE.end()
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// System instruction plus one user message holding the prompt and the
    /// full contract text. The text is never truncated.
    pub fn new(session: &SessionConfig, prompt: &str, contract_text: &str) -> Self {
        Self {
            model: session.model.as_str().to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("{}\n\nContract:\n{}", prompt, contract_text),
                },
            ],
            temperature: session.temperature,
            max_tokens: session.max_tokens,
        }
    }
}

//! Contract analysis through a chat-completion API

pub mod client;
pub mod presets;
pub mod request;

pub use client::{ChatBackend, OpenAiClient, DEFAULT_API_BASE, DEFAULT_TIMEOUT_SECS};
pub use presets::{find_preset, resolve_prompt, AnalysisPreset, ResolvedPrompt, PRESETS};
pub use request::{
    ApiKey, ChatMessage, ChatRequest, ModelId, SessionConfig, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE, MAX_TOKENS_RANGE, SYSTEM_PROMPT, TEMPERATURE_RANGE,
};

use crate::error::{Error, Result};
use std::sync::Arc;

/// Shown with every analysis result
pub const DISCLAIMER: &str =
    "This explanation was generated by AI and should be verified by a legal professional.";

/// Issues one completion request per analysis. No retries, no streaming.
#[derive(Clone)]
pub struct Analyzer {
    backend: Arc<dyn ChatBackend>,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Analyze `contract_text` with `prompt` under the session's settings.
    ///
    /// The credential is checked first, then the text, the prompt and the
    /// generation parameters. Any failure returns before a request is sent.
    pub async fn analyze(
        &self,
        contract_text: &str,
        session: &SessionConfig,
        prompt: &str,
    ) -> Result<String> {
        let api_key = session.credential.as_ref().ok_or(Error::MissingCredential)?;
        if contract_text.trim().is_empty() {
            return Err(Error::EmptyExtractedText);
        }
        if prompt.trim().is_empty() {
            return Err(Error::EmptyPrompt);
        }
        session.validate()?;

        let request = ChatRequest::new(session, prompt, contract_text);
        tracing::info!(
            model = %session.model,
            temperature = session.temperature,
            max_tokens = session.max_tokens,
            chars = contract_text.len(),
            "requesting contract analysis"
        );

        self.backend.complete(api_key, &request).await
    }
}

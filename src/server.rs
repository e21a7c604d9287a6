//! MCP Server implementation using rmcp

use crate::analysis::{
    resolve_prompt, AnalysisPreset, Analyzer, ApiKey, ChatBackend, ModelId, OpenAiClient,
    SessionConfig, DEFAULT_API_BASE, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT_SECS, DISCLAIMER, MAX_TOKENS_RANGE, PRESETS, TEMPERATURE_RANGE,
};
use crate::error::{Error, ErrorKind, ExtractionCause};
use crate::pdf::{preview, ExtractedText, TextExtractor};
use crate::source::{resolve_base64, resolve_path, validate_path_access, ResolvedPdf};
use crate::tokens::{TokenEstimate, TokenEstimator, TokenProfile};
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Contract document source specification
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum DocumentSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF data
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
    /// Reference to a previously extracted document
    CacheRef {
        /// Cache key returned by extract_text
        cache_key: String,
    },
}

impl<'de> serde::Deserialize<'de> for DocumentSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                return Err(serde::de::Error::custom(format!(
                    "Invalid source: expected an object with one of \"path\", \"base64\", or \"cache_key\", but got {}",
                    match &value {
                        serde_json::Value::Array(_) => "an array",
                        serde_json::Value::String(_) => "a string",
                        serde_json::Value::Number(_) => "a number",
                        serde_json::Value::Bool(_) => "a boolean",
                        serde_json::Value::Null => "null",
                        _ => "unknown type",
                    }
                )))
            }
        };

        for field in ["path", "base64", "cache_key"] {
            if let Some(v) = obj.get(field) {
                let s = v.as_str().ok_or_else(|| {
                    serde::de::Error::custom(format!("\"{}\" must be a string", field))
                })?;
                let s = s.to_string();
                return Ok(match field {
                    "path" => DocumentSource::Path { path: s },
                    "base64" => DocumentSource::Base64 { base64: s },
                    _ => DocumentSource::CacheRef { cache_key: s },
                });
            }
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of \"path\", \"base64\", or \"cache_key\", but got keys: {:?}",
            keys
        )))
    }
}

/// Credential, provider, and resource configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories path sources are confined to (empty = no restriction)
    pub resource_dirs: Vec<String>,
    /// API key used when a request does not carry its own
    pub api_key: Option<ApiKey>,
    /// Base URL of the OpenAI-compatible API
    pub api_base: String,
    /// Model used when a request does not name one
    pub default_model: ModelId,
    /// Whole-request timeout for completion calls
    pub request_timeout: Duration,
    /// Maximum number of entries per memo cache (default: 100)
    pub cache_max_entries: usize,
    /// Byte budget per memo cache (default: 64MB)
    pub cache_max_bytes: usize,
    /// Characters of extracted text shown in previews (default: 1000)
    pub preview_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            default_model: ModelId::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_max_entries: 100,
            cache_max_bytes: 64 * 1024 * 1024, // 64MB
            preview_chars: 1000,
        }
    }
}

fn parse_or_default<T: FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "invalid setting, using default");
            default
        }),
        None => default,
    }
}

impl ServerConfig {
    /// Build configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let resource_dirs = lookup("CONTRACT_ANALYZER_RESOURCE_DIRS")
            .map(|dirs| {
                dirs.split(':')
                    .map(str::trim)
                    .filter(|dir| !dir.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let default_model = match lookup("CONTRACT_ANALYZER_MODEL") {
            Some(raw) => raw.parse().unwrap_or_else(|e: Error| {
                tracing::warn!(error = %e, "invalid CONTRACT_ANALYZER_MODEL, using default");
                defaults.default_model
            }),
            None => defaults.default_model,
        };

        let timeout_secs = parse_or_default(
            "CONTRACT_ANALYZER_TIMEOUT_SECS",
            lookup("CONTRACT_ANALYZER_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        );

        Self {
            resource_dirs,
            api_key: lookup("OPENAI_API_KEY").and_then(|key| ApiKey::new(key)),
            api_base: lookup("OPENAI_BASE_URL")
                .filter(|base| !base.trim().is_empty())
                .unwrap_or(defaults.api_base),
            default_model,
            request_timeout: Duration::from_secs(timeout_secs),
            cache_max_entries: parse_or_default(
                "CONTRACT_ANALYZER_CACHE_MAX_ENTRIES",
                lookup("CONTRACT_ANALYZER_CACHE_MAX_ENTRIES"),
                defaults.cache_max_entries,
            ),
            cache_max_bytes: parse_or_default(
                "CONTRACT_ANALYZER_CACHE_MAX_BYTES",
                lookup("CONTRACT_ANALYZER_CACHE_MAX_BYTES"),
                defaults.cache_max_bytes,
            ),
            preview_chars: defaults.preview_chars,
        }
    }
}

/// Contract analyzer MCP server
#[derive(Clone)]
pub struct ContractServer {
    extractor: Arc<TextExtractor>,
    estimator: Arc<TokenEstimator>,
    analyzer: Analyzer,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for extract_text
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractTextParams {
    /// Contract document to extract
    pub source: DocumentSource,
    /// Model whose tokenizer is used for the token estimate (default: server model)
    #[serde(default)]
    pub model: Option<String>,
    /// Characters of text to include in the preview (default: 1000)
    #[serde(default)]
    pub preview_chars: Option<usize>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct TokenEstimateInfo {
    /// Model the estimate was computed for
    pub model: String,
    /// Estimated token count
    pub tokens: usize,
    /// Tokenizer that produced the estimate
    pub profile: TokenProfile,
}

impl TokenEstimateInfo {
    fn new(model: String, estimate: TokenEstimate) -> Self {
        Self {
            model,
            tokens: estimate.tokens,
            profile: estimate.profile,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ExtractTextResult {
    pub source: String,
    /// Pass back as {"cache_key": ...} to reuse this document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    pub char_count: usize,
    /// Start of the extracted text, for display only
    pub preview: String,
    /// False when the document has no extractable text
    pub analyzable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_estimate: Option<TokenEstimateInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

// ============================================================================
// Request/Response types for estimate_tokens
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EstimateTokensParams {
    /// Text to estimate
    pub text: String,
    /// Model identifier (unknown models use a generic tokenizer)
    #[serde(default)]
    pub model: Option<String>,
}

// ============================================================================
// Request/Response types for list_models
// ============================================================================

#[derive(Debug, Serialize, JsonSchema)]
pub struct ListModelsResult {
    pub models: Vec<ModelId>,
    pub default_model: ModelId,
    pub default_temperature: f64,
    pub temperature_range: (f64, f64),
    pub default_max_tokens: u32,
    pub max_tokens_range: (u32, u32),
}

// ============================================================================
// Request/Response types for analyze_contract
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeContractParams {
    /// Contract document to analyze
    pub source: DocumentSource,
    /// Analysis preset id from list_analysis_presets (default: "summary")
    #[serde(default)]
    pub preset: Option<String>,
    /// Custom analysis prompt; overrides the preset's prompt
    #[serde(default)]
    pub prompt: Option<String>,
    /// Model identifier: gpt-3.5-turbo, gpt-4, or gpt-4-turbo
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature, 0.0 to 1.0 (default: 0.7)
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Maximum response tokens, 500 to 4000 (default: 1500)
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// OpenAI API key; falls back to the server's configured key
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AnalyzeContractResult {
    pub source: String,
    /// Title of the analysis that was run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

const EMPTY_TEXT_WARNING: &str = "No text could be extracted from the PDF. Make sure the \
                                  document is not empty and its text is machine-readable";

#[tool_router]
impl ContractServer {
    /// Create a server from environment configuration
    pub fn new() -> crate::error::Result<Self> {
        Self::with_config(ServerConfig::from_env())
    }

    /// Create a server with PDFium extraction and the OpenAI client
    pub fn with_config(config: ServerConfig) -> crate::error::Result<Self> {
        let backend = OpenAiClient::new(&config.api_base, config.request_timeout)?;
        let extractor = TextExtractor::new(config.cache_max_entries, config.cache_max_bytes);
        let estimator = TokenEstimator::new(config.cache_max_entries, config.cache_max_bytes);
        Ok(Self::with_components(
            config,
            extractor,
            estimator,
            Arc::new(backend),
        ))
    }

    /// Create a server from explicit pipeline components
    pub fn with_components(
        config: ServerConfig,
        extractor: TextExtractor,
        estimator: TokenEstimator,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            estimator: Arc::new(estimator),
            analyzer: Analyzer::new(backend),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Extract text from a contract PDF
    #[tool(
        description = "Extract the text of a contract PDF. Returns a preview, the character count, an estimated token count, and a cache_key that can be reused as the source of analyze_contract.

Source format: one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn extract_text(&self, Parameters(params): Parameters<ExtractTextParams>) -> String {
        let result = self.process_extract_text(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "extract_text failed");
            ExtractTextResult {
                source: Self::source_name(&params.source),
                cache_key: None,
                char_count: 0,
                preview: String::new(),
                analyzable: false,
                token_estimate: None,
                warning: None,
                error: Some(e.client_message()),
                error_kind: Some(e.kind()),
            }
        });

        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    /// Estimate the token count of a text
    #[tool(
        description = "Estimate how many tokens a text uses under a model's tokenizer. Unknown models use a generic tokenizer; if none is available the whitespace word count is returned. The estimate is informational only."
    )]
    async fn estimate_tokens(
        &self,
        Parameters(params): Parameters<EstimateTokensParams>,
    ) -> String {
        let model = params
            .model
            .unwrap_or_else(|| self.config.default_model.to_string());
        let result = match self.estimate_blocking(params.text, model.clone()).await {
            Ok(estimate) => serde_json::to_value(TokenEstimateInfo::new(model, estimate)),
            Err(e) => {
                tracing::warn!(error = %e, "estimate_tokens failed");
                Ok(serde_json::json!({
                    "error": e.client_message(),
                    "error_kind": e.kind(),
                }))
            }
        };

        result
            .and_then(|value| serde_json::to_string_pretty(&value))
            .unwrap_or_default()
    }

    /// List the ready-made analysis prompts
    #[tool(
        description = "List the available quick-analysis presets (summary, parties, obligations, payment terms, term, termination, risks, custom) with their prompts."
    )]
    async fn list_analysis_presets(&self) -> String {
        let presets: &[AnalysisPreset] = PRESETS;
        let response = serde_json::json!({ "presets": presets });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// List supported models and generation parameter ranges
    #[tool(
        description = "List the supported models and the allowed temperature and max_tokens ranges, with their defaults."
    )]
    async fn list_models(&self) -> String {
        let result = ListModelsResult {
            models: ModelId::ALL.to_vec(),
            default_model: self.config.default_model,
            default_temperature: DEFAULT_TEMPERATURE,
            temperature_range: (*TEMPERATURE_RANGE.start(), *TEMPERATURE_RANGE.end()),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            max_tokens_range: (*MAX_TOKENS_RANGE.start(), *MAX_TOKENS_RANGE.end()),
        };
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    /// Analyze a contract with a language model
    #[tool(
        description = "Analyze a contract PDF with an OpenAI chat model. Sends the full extracted text together with the chosen preset or custom prompt in a single request and returns the model's answer. Errors (missing API key, empty text or prompt, authentication, rate limit, timeout, connection) are reported in error and error_kind; nothing is retried.

Source format: one of {\"path\": \"/absolute/path.pdf\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn analyze_contract(
        &self,
        Parameters(params): Parameters<AnalyzeContractParams>,
    ) -> String {
        let result = self.process_analyze_contract(&params).await;
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }
}

impl ContractServer {
    fn source_name(source: &DocumentSource) -> String {
        match source {
            DocumentSource::Path { path } => path.clone(),
            DocumentSource::Base64 { .. } => "<base64>".to_string(),
            DocumentSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    /// Resolve a source and extract its text, reusing cached extractions
    async fn load_document(
        &self,
        source: &DocumentSource,
    ) -> crate::error::Result<(String, ExtractedText)> {
        let resolved = match source {
            DocumentSource::Path { path } => {
                let allowed = validate_path_access(path, &self.config.resource_dirs)?;
                let mut resolved = resolve_path(allowed)?;
                resolved.source_name = path.clone();
                resolved
            }
            DocumentSource::Base64 { base64 } => resolve_base64(base64)?,
            DocumentSource::CacheRef { cache_key } => {
                let text = self.extractor.cached(cache_key)?;
                return Ok((Self::source_name(source), text));
            }
        };

        let ResolvedPdf { data, source_name } = resolved;
        let extractor = Arc::clone(&self.extractor);

        // Move CPU-heavy PDF work to blocking thread pool
        let text = tokio::task::spawn_blocking(move || extractor.extract(&data))
            .await
            .map_err(|e| Error::ExtractionFailed {
                cause: ExtractionCause::Unreadable,
                reason: format!("Task join error: {}", e),
            })??;

        Ok((source_name, text))
    }

    async fn estimate_blocking(
        &self,
        text: String,
        model: String,
    ) -> crate::error::Result<TokenEstimate> {
        let estimator = Arc::clone(&self.estimator);
        tokio::task::spawn_blocking(move || estimator.estimate(&text, &model))
            .await
            .map_err(|e| Error::Unexpected {
                detail: format!("Task join error: {}", e),
            })
    }

    async fn process_extract_text(
        &self,
        params: &ExtractTextParams,
    ) -> crate::error::Result<ExtractTextResult> {
        let (source_name, extracted) = self.load_document(&params.source).await?;

        let preview_chars = params.preview_chars.unwrap_or(self.config.preview_chars);
        let preview = preview(&extracted.text, preview_chars);
        let char_count = extracted.char_count();

        if !extracted.is_analyzable() {
            return Ok(ExtractTextResult {
                source: source_name,
                cache_key: Some(extracted.key),
                char_count,
                preview,
                analyzable: false,
                token_estimate: None,
                warning: Some(EMPTY_TEXT_WARNING.to_string()),
                error: None,
                error_kind: None,
            });
        }

        let model = params
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.to_string());
        let estimate = self
            .estimate_blocking(extracted.text.clone(), model.clone())
            .await?;

        Ok(ExtractTextResult {
            source: source_name,
            cache_key: Some(extracted.key),
            char_count,
            preview,
            analyzable: true,
            token_estimate: Some(TokenEstimateInfo::new(model, estimate)),
            warning: None,
            error: None,
            error_kind: None,
        })
    }

    /// Per-request settings: explicit parameters first, then server defaults
    fn session_for(&self, params: &AnalyzeContractParams) -> crate::error::Result<SessionConfig> {
        let model = match params.model.as_deref() {
            Some(model) => model.parse()?,
            None => self.config.default_model,
        };
        let credential = params
            .api_key
            .as_deref()
            .and_then(|key| ApiKey::new(key))
            .or_else(|| self.config.api_key.clone());

        Ok(SessionConfig {
            credential,
            model,
            temperature: params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    pub async fn process_analyze_contract(
        &self,
        params: &AnalyzeContractParams,
    ) -> AnalyzeContractResult {
        let mut result = AnalyzeContractResult {
            source: Self::source_name(&params.source),
            title: None,
            model: None,
            analysis: None,
            disclaimer: None,
            error: None,
            error_kind: None,
        };

        let outcome: crate::error::Result<String> = async {
            let (source_name, extracted) = self.load_document(&params.source).await?;
            result.source = source_name;

            let prompt = resolve_prompt(params.preset.as_deref(), params.prompt.as_deref())?;
            result.title = Some(prompt.title);

            let session = self.session_for(params)?;
            result.model = Some(session.model);

            self.analyzer
                .analyze(&extracted.text, &session, &prompt.prompt)
                .await
        }
        .await;

        match outcome {
            Ok(analysis) => {
                result.analysis = Some(analysis);
                result.disclaimer = Some(DISCLAIMER.to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "analyze_contract failed");
                result.error = Some(e.client_message());
                result.error_kind = Some(e.kind());
            }
        }

        result
    }
}

#[tool_handler]
impl ServerHandler for ContractServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Contract Analyzer extracts the text of PDF contracts, estimates their token \
                 count, and analyzes them with an OpenAI chat model. Call extract_text first, \
                 then analyze_contract with the returned cache_key. AI analysis should be \
                 verified by a legal professional."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with configuration from the environment
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::from_env()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    if config.api_key.is_none() {
        tracing::info!("No default API key configured; requests must supply api_key");
    }
    let server = ContractServer::with_config(config)?;

    tracing::info!("Contract Analyzer ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}

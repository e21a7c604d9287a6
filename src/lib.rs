//! Contract Analyzer MCP Server Library
//!
//! This crate provides MCP tools for reviewing contract PDFs:
//! - `extract_text`: Extract the text of a contract and estimate its tokens
//! - `estimate_tokens`: Estimate the token count of arbitrary text
//! - `list_analysis_presets`: List the ready-made analysis prompts
//! - `list_models`: List supported models and parameter ranges
//! - `analyze_contract`: Analyze a contract with an OpenAI chat model

pub mod analysis;
pub mod error;
pub mod pdf;
pub mod server;
pub mod source;
pub mod tokens;

pub use error::{Error, ErrorKind, ExtractionCause, Result};
pub use server::{
    run_server, run_server_with_config, AnalyzeContractParams, AnalyzeContractResult,
    ContractServer, DocumentSource, ExtractTextParams, ExtractTextResult, ServerConfig,
};

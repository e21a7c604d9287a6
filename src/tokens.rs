//! Token count estimation for display
//!
//! Counts are guidance for the user only. Nothing in the pipeline truncates
//! or rejects a contract based on them.

use crate::source::{content_key, MemoCache, Weigh};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::CoreBPE;

/// Which tokenizer produced an estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenProfile {
    /// The model's own encoding
    Model,
    /// Generic `cl100k_base` encoding, used for models the tokenizer does not know
    Generic,
    /// Whitespace-separated word count, used when no encoding is available
    WordCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub struct TokenEstimate {
    pub tokens: usize,
    pub profile: TokenProfile,
}

impl Weigh for TokenEstimate {
    fn weight(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Resolves tokenizer encodings by model name
pub trait EncodingSource: Send + Sync {
    fn for_model(&self, model: &str) -> Option<Arc<CoreBPE>>;
    fn generic(&self) -> Option<Arc<CoreBPE>>;
}

/// Encodings bundled with `tiktoken-rs`, loaded lazily, one per tokenizer.
///
/// Model names only select a tokenizer, so aliases such as `gpt-4-0613` share
/// the `gpt-4` encoding and unknown names load nothing.
#[derive(Default)]
pub struct TiktokenEncodings {
    by_tokenizer: Mutex<HashMap<Tokenizer, Option<Arc<CoreBPE>>>>,
}

impl TiktokenEncodings {
    fn encoding(&self, tokenizer: Tokenizer) -> Option<Arc<CoreBPE>> {
        self.by_tokenizer
            .lock()
            .entry(tokenizer)
            .or_insert_with(|| match tiktoken_rs::get_bpe_from_tokenizer(tokenizer) {
                Ok(bpe) => Some(Arc::new(bpe)),
                Err(e) => {
                    tracing::warn!(error = %e, ?tokenizer, "token encoding unavailable");
                    None
                }
            })
            .clone()
    }
}

impl EncodingSource for TiktokenEncodings {
    fn for_model(&self, model: &str) -> Option<Arc<CoreBPE>> {
        get_tokenizer(model).and_then(|tokenizer| self.encoding(tokenizer))
    }

    fn generic(&self) -> Option<Arc<CoreBPE>> {
        self.encoding(Tokenizer::Cl100kBase)
    }
}

/// Number of whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Memoizing token estimator keyed by (text hash, model)
pub struct TokenEstimator {
    encodings: Box<dyn EncodingSource>,
    cache: MemoCache<TokenEstimate>,
}

impl TokenEstimator {
    pub fn new(cache_entries: usize, cache_bytes: usize) -> Self {
        Self::with_source(
            Box::new(TiktokenEncodings::default()),
            cache_entries,
            cache_bytes,
        )
    }

    pub fn with_source(
        encodings: Box<dyn EncodingSource>,
        cache_entries: usize,
        cache_bytes: usize,
    ) -> Self {
        Self {
            encodings,
            cache: MemoCache::new(cache_entries, cache_bytes),
        }
    }

    /// Estimate the token count of `text` under `model`'s tokenizer.
    ///
    /// Falls back to the generic encoding for unknown models and to a word
    /// count when no encoding can be loaded at all.
    pub fn estimate(&self, text: &str, model: &str) -> TokenEstimate {
        let key = format!("{}:{}", content_key(text.as_bytes()), model);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        let estimate = if let Some(bpe) = self.encodings.for_model(model) {
            TokenEstimate {
                tokens: bpe.encode_ordinary(text).len(),
                profile: TokenProfile::Model,
            }
        } else if let Some(bpe) = self.encodings.generic() {
            tracing::debug!(model, "model unknown to tokenizer, using generic encoding");
            TokenEstimate {
                tokens: bpe.encode_ordinary(text).len(),
                profile: TokenProfile::Generic,
            }
        } else {
            TokenEstimate {
                tokens: word_count(text),
                profile: TokenProfile::WordCount,
            }
        };

        self.cache.put(key, estimate);
        estimate
    }
}

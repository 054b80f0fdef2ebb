//! Pluggable token counting for the tool-registry context budget.
//!
//! `BytesEstimateTokenizer` is a fast bytes/3 heuristic with no dependencies;
//! `TiktokenTokenizer` does BPE counting and is feature-gated behind `tiktoken`.

use std::sync::Arc;

pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
    fn name(&self) -> &str;
}

/// Default: bytes/3 estimation. Errs high for JSON, which is fine for a ceiling check.
pub struct BytesEstimateTokenizer;

impl Tokenizer for BytesEstimateTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(3)
    }
    fn name(&self) -> &str {
        "bytes-estimate"
    }
}

#[cfg(feature = "tiktoken")]
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenTokenizer {
    /// `None` if the bundled cl100k ranks fail to load.
    pub fn new() -> Option<Self> {
        tiktoken_rs::cl100k_base().ok().map(|bpe| Self { bpe })
    }
}

#[cfg(feature = "tiktoken")]
impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
    fn name(&self) -> &str {
        "tiktoken"
    }
}

/// Create a tokenizer by name. Falls back to bytes-estimate for unknown names.
pub fn create_tokenizer(name: &str) -> Arc<dyn Tokenizer> {
    match name {
        #[cfg(feature = "tiktoken")]
        "tiktoken" => match TiktokenTokenizer::new() {
            Some(t) => Arc::new(t),
            None => {
                tracing::warn!("tiktoken ranks unavailable, using bytes-estimate");
                Arc::new(BytesEstimateTokenizer)
            }
        },
        _ => Arc::new(BytesEstimateTokenizer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_estimate_rounds_up() {
        let tok = BytesEstimateTokenizer;
        assert_eq!(tok.count_tokens(""), 0);
        assert_eq!(tok.count_tokens("ab"), 1);
        assert_eq!(tok.count_tokens("abcd"), 2);
    }

    #[test]
    fn unknown_name_falls_back() {
        assert_eq!(create_tokenizer("nope").name(), "bytes-estimate");
    }
}

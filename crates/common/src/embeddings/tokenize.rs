//! Tokenization for BERT-style encoders
//!
//! Every input is truncated and padded to exactly `max_length` positions so
//! the encoder always sees a uniform shape.

use super::EmbeddingError;
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Tokenized input ready for encoder inference
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedInput {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
}

impl TokenizedInput {
    /// Number of real (non-padding) positions
    pub fn real_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m > 0).count()
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Tokenizer wrapper for the query encoder
#[derive(Clone)]
pub struct QueryTokenizer {
    tokenizer: Arc<Tokenizer>,
    max_length: usize,
    pad_id: u32,
}

impl QueryTokenizer {
    /// Load a tokenizer.json from disk
    pub fn from_file(path: &str, max_length: usize) -> Result<Self, EmbeddingError> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| EmbeddingError::TokenizerLoad(format!("{}: {}", path, e)))?;
        Ok(Self::with_tokenizer(tokenizer, max_length))
    }

    /// Create tokenizer from tokenizer.json contents
    pub fn from_bytes(tokenizer_json: &[u8], max_length: usize) -> Result<Self, EmbeddingError> {
        let tokenizer = Tokenizer::from_bytes(tokenizer_json)
            .map_err(|e| EmbeddingError::TokenizerLoad(e.to_string()))?;
        Ok(Self::with_tokenizer(tokenizer, max_length))
    }

    fn with_tokenizer(tokenizer: Tokenizer, max_length: usize) -> Self {
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
        Self {
            tokenizer: Arc::new(tokenizer),
            max_length: max_length.max(1),
            pad_id,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Tokenize a single text, truncating and padding to `max_length`
    pub fn encode(&self, text: &str) -> Result<TokenizedInput, EmbeddingError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenize(e.to_string()))?;

        let mut input_ids = encoding.get_ids().to_vec();
        let mut attention_mask = encoding.get_attention_mask().to_vec();
        let mut token_type_ids = encoding.get_type_ids().to_vec();

        if input_ids.len() > self.max_length {
            // Keep the closing special token (e.g. [SEP]) at the new boundary
            let closing = encoding
                .get_special_tokens_mask()
                .last()
                .filter(|&&special| special == 1)
                .and(input_ids.last().copied());

            input_ids.truncate(self.max_length);
            attention_mask.truncate(self.max_length);
            token_type_ids.truncate(self.max_length);

            if let (Some(id), Some(last)) = (closing, input_ids.last_mut()) {
                *last = id;
            }
        }

        let pad_len = self.max_length - input_ids.len();
        if pad_len > 0 {
            input_ids.extend(std::iter::repeat(self.pad_id).take(pad_len));
            attention_mask.extend(std::iter::repeat(0).take(pad_len));
            token_type_ids.extend(std::iter::repeat(0).take(pad_len));
        }

        Ok(TokenizedInput {
            input_ids,
            attention_mask,
            token_type_ids,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal word-level tokenizer.json used across embedding tests
    pub(crate) const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[PAD]": 0, "[UNK]": 1, "stage": 2, "lung": 3, "cancer": 4 },
            "unk_token": "[UNK]"
        }
    }"#;

    fn tokenizer(max_length: usize) -> QueryTokenizer {
        QueryTokenizer::from_bytes(WORD_LEVEL_TOKENIZER.as_bytes(), max_length).unwrap()
    }

    #[test]
    fn test_short_text_is_padded() {
        let input = tokenizer(512).encode("stage lung cancer").unwrap();
        assert_eq!(input.len(), 512);
        assert_eq!(input.attention_mask.len(), 512);
        assert_eq!(input.token_type_ids.len(), 512);
        assert_eq!(input.real_tokens(), 3);
        assert_eq!(&input.input_ids[..3], &[2, 3, 4]);
        assert!(input.input_ids[3..].iter().all(|&id| id == 0));
    }

    #[test]
    fn test_long_text_is_truncated() {
        let text = vec!["cancer"; 600].join(" ");
        let input = tokenizer(512).encode(&text).unwrap();
        assert_eq!(input.len(), 512);
        assert_eq!(input.real_tokens(), 512);
    }

    #[test]
    fn test_empty_text_is_all_padding() {
        let input = tokenizer(16).encode("").unwrap();
        assert_eq!(input.len(), 16);
        assert_eq!(input.real_tokens(), 0);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let input = tokenizer(8).encode("metastasis").unwrap();
        assert_eq!(input.input_ids[0], 1);
        assert_eq!(input.real_tokens(), 1);
    }
}

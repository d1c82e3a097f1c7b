//! Context Assembler - Bounded context window from ranked evidence

use crate::config::RetrievalConfig;
use crate::store::EvidenceHit;

/// Separator placed between passages
const SEPARATOR: char = '\n';

/// Builds the context window fed to the prompt
///
/// Limits are counted in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAssembler {
    /// Cap applied to each passage before joining
    pub per_passage_chars: usize,

    /// Cap applied to the joined result
    pub max_context_chars: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            per_passage_chars: 700,
            max_context_chars: 5000,
        }
    }
}

impl From<&RetrievalConfig> for ContextAssembler {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            per_passage_chars: config.per_passage_chars,
            max_context_chars: config.max_context_chars,
        }
    }
}

impl ContextAssembler {
    /// Concatenate hits in the given order
    ///
    /// No re-sorting and no deduplication. Empty input yields an empty string.
    pub fn assemble(&self, hits: &[EvidenceHit]) -> String {
        let mut context = String::new();

        for (i, hit) in hits.iter().enumerate() {
            if i > 0 {
                context.push(SEPARATOR);
            }
            context.extend(hit.text.chars().take(self.per_passage_chars));
        }

        truncate_chars(context, self.max_context_chars)
    }
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((byte_idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_idx);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str) -> EvidenceHit {
        EvidenceHit {
            score: 0.8,
            text: text.to_string(),
            source: "guideline.txt".to_string(),
        }
    }

    #[test]
    fn test_empty_hits_give_empty_context() {
        assert_eq!(ContextAssembler::default().assemble(&[]), "");
    }

    #[test]
    fn test_passages_keep_order_and_duplicates() {
        let hits = vec![hit("second-ranked"), hit("first"), hit("first")];
        let context = ContextAssembler::default().assemble(&hits);
        assert_eq!(context, "second-ranked\nfirst\nfirst");
    }

    #[test]
    fn test_each_passage_capped() {
        let hits = vec![hit(&"a".repeat(1000)), hit(&"b".repeat(10))];
        let context = ContextAssembler::default().assemble(&hits);
        let parts: Vec<&str> = context.split('\n').collect();
        assert_eq!(parts[0].len(), 700);
        assert_eq!(parts[1], "b".repeat(10));
    }

    #[test]
    fn test_whole_context_capped() {
        let hits: Vec<_> = (0..10).map(|_| hit(&"c".repeat(700))).collect();
        let context = ContextAssembler::default().assemble(&hits);
        assert_eq!(context.chars().count(), 5000);
    }

    #[test]
    fn test_limits_count_characters() {
        let assembler = ContextAssembler {
            per_passage_chars: 3,
            max_context_chars: 5,
        };
        let context = assembler.assemble(&[hit("рак лёгкого"), hit("стадия")]);
        assert_eq!(context, "рак\nс");
    }
}

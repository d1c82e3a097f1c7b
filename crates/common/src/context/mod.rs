//! Prompt-side components of the answer pipeline
//!
//! - `ContextAssembler`: ranked evidence to one bounded context string
//! - `build_prompt`: fixed instruction template around query and context
//! - `normalize`: artifact stripping and sentence-boundary completion

mod assembler;
mod normalizer;
mod prompt;

pub use assembler::ContextAssembler;
pub use normalizer::{normalize, NormalizedAnswer, COULD_NOT_GENERATE};
pub use prompt::{build_prompt, FALLBACK_PHRASE};

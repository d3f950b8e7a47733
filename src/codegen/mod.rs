//! Artifact emission from the resolved model.

mod generator;
pub mod templates;
mod writer;

pub use generator::{CodeGenerator, GenerationReport, GeneratorConfig, DEFAULT_OUTPUT_DIR};
pub use writer::{content_hash, CodeWriter, CommentMarker, WriteOutcome};

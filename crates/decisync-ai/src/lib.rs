//! Outcome classification backed by a generative-text service.

pub mod classifier;
pub mod generator;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use classifier::{Classification, OutcomeClassifier};
pub use generator::{GeneratorConfig, OpenAiGenerator, TextGenerator};

pub const CRATE_NAME: &str = "decisync-ai";

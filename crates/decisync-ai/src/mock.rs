//! Scripted generator for deterministic tests.
//!
//! Enable the `mock` feature to use it outside this crate's own tests.
//!
//! ```ignore
//! use decisync_ai::mock::MockGenerator;
//!
//! let generator = MockGenerator::new()
//!     .with_fixed_response(r#"{"outcome":"Denied","confidence":0.8}"#)
//!     .with_response_for("23-0002", "not json at all");
//! assert_eq!(generator.call_count(), 0);
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use decisync_core::DecisionError;

use crate::generator::TextGenerator;

#[derive(Clone)]
pub struct MockGenerator {
    rules: Arc<Mutex<Vec<(String, Result<String, DecisionError>)>>>,
    default_response: Arc<Mutex<Result<String, DecisionError>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub prompt: String,
    pub temperature: f32,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(Mutex::new(Vec::new())),
            default_response: Arc::new(Mutex::new(Ok(
                r#"{"outcome":"Denied","confidence":0.9,"reasoning":"mock"}"#.to_string(),
            ))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Response for prompts that match no rule.
    pub fn with_fixed_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock().unwrap() = Ok(response.into());
        self
    }

    /// Fail every prompt that matches no rule.
    pub fn with_failure(self, error: DecisionError) -> Self {
        *self.default_response.lock().unwrap() = Err(error);
        self
    }

    /// Answer prompts containing `needle` with `response`; first rule wins.
    pub fn with_response_for(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((needle.into(), Ok(response.into())));
        self
    }

    pub fn with_failure_for(self, needle: impl Into<String>, error: DecisionError) -> Self {
        self.rules.lock().unwrap().push((needle.into(), Err(error)));
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of prompts that mentioned `needle`.
    pub fn calls_mentioning(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.prompt.contains(needle))
            .count()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate_json(&self, prompt: &str, temperature: f32) -> Result<String, DecisionError> {
        self.calls.lock().unwrap().push(MockCall {
            prompt: prompt.to_string(),
            temperature,
        });
        let rules = self.rules.lock().unwrap();
        if let Some((_, response)) = rules.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
            return response.clone();
        }
        self.default_response.lock().unwrap().clone()
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

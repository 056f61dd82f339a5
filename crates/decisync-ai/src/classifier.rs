//! LLM-assisted outcome classification with local degradation.

use std::sync::Arc;

use chrono::NaiveDate;
use decisync_core::Outcome;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use crate::generator::TextGenerator;

/// Leading characters of the decision text included in the prompt.
pub const MAX_PROMPT_CHARS: usize = 4000;
pub const CLASSIFICATION_TEMPERATURE: f32 = 0.1;
/// Confidence assigned when the model names an outcome but no confidence.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outcome: Outcome,
    pub confidence: f64,
    /// Model rationale; logged, never persisted.
    pub reasoning: Option<String>,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            outcome: Outcome::Unknown,
            confidence: 0.0,
            reasoning: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    outcome: String,
    #[serde(default)]
    confidence: Option<JsonValue>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parses a model reply. `None` means the reply is unusable.
pub fn parse_classification(reply: &str) -> Option<Classification> {
    let cleaned = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let raw: RawClassification = serde_json::from_str(cleaned).ok()?;
    let outcome = Outcome::from_model_label(&raw.outcome)?;
    let confidence = match raw.confidence {
        None | Some(JsonValue::Null) => DEFAULT_CONFIDENCE,
        Some(JsonValue::Number(n)) => n.as_f64()?,
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok()?,
        Some(_) => return None,
    };
    if !confidence.is_finite() {
        return None;
    }
    Some(Classification {
        outcome,
        confidence: confidence.clamp(0.0, 1.0),
        reasoning: raw.reasoning,
    })
}

pub fn build_prompt(citation_number: &str, decision_date: Option<NaiveDate>, raw_text: &str) -> String {
    let excerpt: String = raw_text.chars().take(MAX_PROMPT_CHARS).collect();
    let date = decision_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Classify the outcome of this Board of Veterans' Appeals decision.\n\
         Citation: {citation_number}\n\
         Decision date: {date}\n\n\
         Respond with JSON of the form \
         {{\"outcome\": \"Granted\" | \"Denied\" | \"Remanded\" | \"Mixed\", \
         \"confidence\": <number between 0 and 1>, \"reasoning\": \"<one sentence>\"}}.\n\
         Use \"Mixed\" when some issues are granted and others denied or remanded.\n\n\
         Decision text:\n{excerpt}"
    )
}

#[derive(Clone)]
pub struct OutcomeClassifier {
    generator: Arc<dyn TextGenerator>,
}

impl OutcomeClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Labels a decision. Never fails: a failed call or an unusable reply
    /// yields [`Classification::unknown`].
    #[instrument(skip(self, decision_date, raw_text), fields(model = %self.generator.model_name()))]
    pub async fn classify(
        &self,
        citation_number: &str,
        decision_date: Option<NaiveDate>,
        raw_text: &str,
    ) -> Classification {
        let prompt = build_prompt(citation_number, decision_date, raw_text);
        let reply = match self
            .generator
            .generate_json(&prompt, CLASSIFICATION_TEMPERATURE)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "classification call failed; outcome left unknown");
                return Classification::unknown();
            }
        };

        match parse_classification(&reply) {
            Some(classification) => {
                debug!(
                    outcome = %classification.outcome,
                    confidence = classification.confidence,
                    reasoning = classification.reasoning.as_deref().unwrap_or(""),
                    "decision classified"
                );
                classification
            }
            None => {
                let preview: String = reply.chars().take(120).collect();
                warn!(reply = %preview, "unusable classification reply; outcome left unknown");
                Classification::unknown()
            }
        }
    }
}

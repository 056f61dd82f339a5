//! Core domain model for decision synchronization.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

mod error;

pub use error::{DecisionError, ErrorKind, TRANSPORT_STATUS};

pub const CRATE_NAME: &str = "decisync-core";

/// Fixed key of the singleton sync-status record.
pub const SYNC_METADATA_KEY: &str = "decision_sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionType {
    #[serde(rename = "AMA", alias = "ama")]
    Ama,
    #[serde(rename = "legacy", alias = "Legacy")]
    Legacy,
}

impl DecisionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ama => "AMA",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionType {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ama" => Ok(Self::Ama),
            "legacy" => Ok(Self::Legacy),
            other => Err(DecisionError::invalid_input(format!(
                "unknown decision type {other:?}"
            ))),
        }
    }
}

/// One paragraph of a decision body as delivered upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub section: Option<String>,
    pub text: String,
    pub order: u32,
}

/// Search hit; carries just enough to address the full decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub citation_number: String,
    #[serde(default, alias = "date")]
    pub decision_date: Option<NaiveDate>,
    pub decision_type: DecisionType,
    #[serde(default)]
    pub docket_numbers: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Full decision payload from the per-citation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionDetail {
    #[serde(flatten)]
    pub summary: DecisionSummary,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Granted,
    Denied,
    Remanded,
    Mixed,
    Unknown,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "Granted",
            Self::Denied => "Denied",
            Self::Remanded => "Remanded",
            Self::Mixed => "Mixed",
            Self::Unknown => "Unknown",
        }
    }

    /// Parses one of the four labels a model may assign; `Unknown` is never
    /// accepted from a model.
    pub fn from_model_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            "remanded" => Some(Self::Remanded),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_model_label(s) {
            Some(outcome) => Ok(outcome),
            None if s.trim().eq_ignore_ascii_case("unknown") => Ok(Self::Unknown),
            None => Err(DecisionError::invalid_input(format!(
                "unknown outcome {s:?}"
            ))),
        }
    }
}

/// Canonical persisted decision. One row per `citation_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDecisionRecord {
    pub id: Uuid,
    pub external_id: String,
    pub citation_number: String,
    pub decision_date: Option<NaiveDate>,
    pub decision_type: DecisionType,
    pub docket_numbers: Vec<String>,
    pub source_url: Option<String>,
    pub filename: Option<String>,
    pub raw_text: String,
    pub paragraphs: Vec<Paragraph>,
    pub sections: BTreeMap<String, String>,
    pub outcome: Option<Outcome>,
    pub confidence: Option<f64>,
    pub synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vector_indexed: bool,
}

/// Per-item failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemError {
    pub decision_id: String,
    pub citation_number: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRunSummary {
    pub total: usize,
    pub synced: usize,
    pub skipped: usize,
    pub errors: Vec<SyncItemError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl SyncRunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            synced: 0,
            skipped: 0,
            errors: Vec::new(),
            started_at,
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    CompletedWithErrors,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            other => Err(DecisionError::decode(
                TRANSPORT_STATUS,
                format!("unknown sync status {other:?}"),
            )),
        }
    }
}

/// Singleton status record, overwritten after every completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub last_sync_at: DateTime<Utc>,
    pub total_synced: u64,
    pub status: SyncStatus,
    pub error_summary: Option<String>,
}

/// Number of failed citations quoted in the status summary.
pub const ERROR_SUMMARY_CITATIONS: usize = 3;

impl SyncMetadata {
    pub fn from_summary(summary: &SyncRunSummary) -> Self {
        let status = if summary.has_errors() {
            SyncStatus::CompletedWithErrors
        } else {
            SyncStatus::Completed
        };
        let error_summary = summary.has_errors().then(|| {
            let cited: Vec<&str> = summary
                .errors
                .iter()
                .take(ERROR_SUMMARY_CITATIONS)
                .map(|e| e.citation_number.as_str())
                .collect();
            let mut text = format!("{} error(s): {}", summary.errors.len(), cited.join(", "));
            if summary.errors.len() > ERROR_SUMMARY_CITATIONS {
                text.push_str(", ...");
            }
            text
        });
        Self {
            last_sync_at: summary.finished_at.unwrap_or_else(Utc::now),
            total_synced: summary.synced as u64,
            status,
            error_summary,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

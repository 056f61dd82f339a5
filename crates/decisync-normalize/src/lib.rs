//! Maps raw decision payloads into the canonical persisted shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use decisync_core::{CanonicalDecisionRecord, DecisionDetail, Paragraph};
use uuid::Uuid;

pub const CRATE_NAME: &str = "decisync-normalize";

/// Bucket for paragraphs without a section label.
pub const DEFAULT_SECTION: &str = "content";

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Maps a free-form section heading onto the canonical vocabulary.
///
/// Matching is a case-insensitive substring test; rules are tried in order
/// and the first hit wins. Headings that match nothing are returned as-is.
pub fn normalize_section_label(label: &str) -> String {
    let lower = label.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    let canonical = if has("introduction") || has("intro") {
        "introduction"
    } else if has("finding") || has("fact") {
        "findings_of_fact"
    } else if has("analysis") || has("discussion") {
        "analysis"
    } else if has("reason") && has("base") {
        "reasons_and_bases"
    } else if has("conclusion") || has("order") {
        "conclusion"
    } else if has("evidence") {
        "evidence"
    } else if has("procedural") {
        "procedural_history"
    } else {
        return label.to_string();
    };
    canonical.to_string()
}

/// Groups paragraph text by canonical section, preserving paragraph order
/// within each section.
pub fn group_sections(paragraphs: &[Paragraph]) -> BTreeMap<String, String> {
    let mut ordered: Vec<&Paragraph> = paragraphs.iter().collect();
    ordered.sort_by_key(|p| p.order);

    let mut buckets: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for paragraph in ordered {
        let key = match paragraph.section.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => normalize_section_label(label),
            _ => DEFAULT_SECTION.to_string(),
        };
        buckets.entry(key).or_default().push(&paragraph.text);
    }

    buckets
        .into_iter()
        .map(|(section, texts)| (section, texts.join(PARAGRAPH_SEPARATOR).trim().to_string()))
        .collect()
}

pub fn normalize_decision(detail: DecisionDetail) -> CanonicalDecisionRecord {
    normalize_decision_at(detail, Utc::now())
}

/// Builds a fresh canonical record stamped with `now`. Outcome and
/// confidence stay unset until classification.
pub fn normalize_decision_at(detail: DecisionDetail, now: DateTime<Utc>) -> CanonicalDecisionRecord {
    let sections = group_sections(&detail.paragraphs);
    let mut paragraphs = detail.paragraphs;
    paragraphs.sort_by_key(|p| p.order);
    let summary = detail.summary;

    CanonicalDecisionRecord {
        id: Uuid::new_v4(),
        external_id: summary.id,
        citation_number: summary.citation_number,
        decision_date: summary.decision_date,
        decision_type: summary.decision_type,
        docket_numbers: summary.docket_numbers,
        source_url: summary.url,
        filename: detail.filename,
        raw_text: detail.raw_text,
        paragraphs,
        sections,
        outcome: None,
        confidence: None,
        synced_at: now,
        updated_at: now,
        vector_indexed: false,
    }
}

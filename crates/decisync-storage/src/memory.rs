use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use decisync_core::{CanonicalDecisionRecord, DecisionError, SyncMetadata};
use tokio::sync::Mutex;

use crate::{DecisionStore, UpsertOutcome};

#[derive(Debug, Default)]
struct MemoryState {
    decisions: HashMap<String, CanonicalDecisionRecord>,
    metadata: Option<SyncMetadata>,
    rejected: HashSet<String>,
    metadata_writes: usize,
}

/// Process-local store with the same upsert semantics as Postgres.
#[derive(Debug, Default)]
pub struct MemoryDecisionStore {
    state: Mutex<MemoryState>,
}

impl MemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every upsert of `citation_number` fail with a storage error.
    pub async fn reject_citation(&self, citation_number: impl Into<String>) {
        self.state.lock().await.rejected.insert(citation_number.into());
    }

    /// All stored records ordered by citation number.
    pub async fn snapshot(&self) -> Vec<CanonicalDecisionRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state.decisions.values().cloned().collect();
        records.sort_by(|a, b| a.citation_number.cmp(&b.citation_number));
        records
    }

    pub async fn metadata_writes(&self) -> usize {
        self.state.lock().await.metadata_writes
    }
}

#[async_trait]
impl DecisionStore for MemoryDecisionStore {
    async fn find_by_citation(
        &self,
        citation_number: &str,
    ) -> Result<Option<CanonicalDecisionRecord>, DecisionError> {
        Ok(self.state.lock().await.decisions.get(citation_number).cloned())
    }

    async fn upsert_decision(
        &self,
        record: &CanonicalDecisionRecord,
    ) -> Result<UpsertOutcome, DecisionError> {
        let mut state = self.state.lock().await;
        if state.rejected.contains(&record.citation_number) {
            return Err(DecisionError::storage(format!(
                "write rejected for {}",
                record.citation_number
            )));
        }
        let duplicate_external = state.decisions.values().any(|existing| {
            existing.external_id == record.external_id
                && existing.citation_number != record.citation_number
        });
        if duplicate_external {
            return Err(DecisionError::storage(format!(
                "external id {} already stored under another citation",
                record.external_id
            )));
        }

        match state.decisions.get_mut(&record.citation_number) {
            Some(existing) => {
                let mut merged = record.clone();
                merged.id = existing.id;
                merged.synced_at = existing.synced_at;
                merged.outcome = record.outcome.or(existing.outcome);
                merged.confidence = record.confidence.or(existing.confidence);
                merged.vector_indexed = false;
                *existing = merged;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let mut inserted = record.clone();
                inserted.vector_indexed = false;
                state
                    .decisions
                    .insert(record.citation_number.clone(), inserted);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn count_decisions(&self) -> Result<u64, DecisionError> {
        Ok(self.state.lock().await.decisions.len() as u64)
    }

    async fn put_sync_metadata(&self, metadata: &SyncMetadata) -> Result<(), DecisionError> {
        let mut state = self.state.lock().await;
        state.metadata = Some(metadata.clone());
        state.metadata_writes += 1;
        Ok(())
    }

    async fn sync_metadata(&self) -> Result<Option<SyncMetadata>, DecisionError> {
        Ok(self.state.lock().await.metadata.clone())
    }
}

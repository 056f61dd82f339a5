//! Persistence for canonical decisions and the sync-status singleton.

use async_trait::async_trait;
use decisync_core::{CanonicalDecisionRecord, DecisionError, SyncMetadata};

mod memory;
mod pg;

pub use memory::MemoryDecisionStore;
pub use pg::PgDecisionStore;

pub const CRATE_NAME: &str = "decisync-storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Write surface of the decision store.
///
/// Upserts are keyed by citation number, so any number of re-syncs leaves
/// at most one row per citation. On overwrite the stored internal id and
/// `synced_at` are kept, every other field is replaced, `vector_indexed`
/// is reset, and an unset outcome/confidence keeps the stored one.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn find_by_citation(
        &self,
        citation_number: &str,
    ) -> Result<Option<CanonicalDecisionRecord>, DecisionError>;

    async fn upsert_decision(
        &self,
        record: &CanonicalDecisionRecord,
    ) -> Result<UpsertOutcome, DecisionError>;

    async fn count_decisions(&self) -> Result<u64, DecisionError>;

    /// Overwrites the singleton status record.
    async fn put_sync_metadata(&self, metadata: &SyncMetadata) -> Result<(), DecisionError>;

    async fn sync_metadata(&self) -> Result<Option<SyncMetadata>, DecisionError>;
}

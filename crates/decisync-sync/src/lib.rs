//! Decision sync pipeline orchestration.
//!
//! One run walks the search results page by page and takes every summary
//! through `fetch_detail -> parse -> classify -> upsert`, strictly in
//! sequence. Item failures are recorded and skipped past; only a failure of
//! the page walk itself aborts the run.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use decisync_ai::{OpenAiGenerator, OutcomeClassifier};
use decisync_client::{DecisionClient, DecisionTypeFilter, SearchFilters, SortOrder, PAGE_SIZE};
use decisync_core::{
    DecisionError, DecisionSummary, Outcome, SyncMetadata, SyncRunSummary,
};
use decisync_normalize::normalize_decision;
use decisync_storage::{DecisionStore, MemoryDecisionStore, PgDecisionStore, UpsertOutcome};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};

mod config;
mod tracker;

pub use config::SyncConfig;
pub use tracker::RunTracker;

pub const CRATE_NAME: &str = "decisync-sync";

pub const DEFAULT_QUERY: &str = "veteran";
pub const DEFAULT_MAX_DECISIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub query: String,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub decision_type: DecisionTypeFilter,
    pub max_decisions: usize,
    /// Skip citations already in the store before fetching their detail.
    pub skip_existing: bool,
    pub extract_outcomes: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            start_year: None,
            end_year: None,
            decision_type: DecisionTypeFilter::All,
            max_decisions: DEFAULT_MAX_DECISIONS,
            skip_existing: false,
            extract_outcomes: true,
        }
    }
}

impl SyncOptions {
    fn search_filters(&self) -> SearchFilters {
        SearchFilters {
            decision_type: self.decision_type,
            start_year: self.start_year,
            end_year: self.end_year,
            sort: SortOrder::DateDesc,
            offset: 0,
            limit: PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
    LookupExisting,
    FetchDetail,
    Parse,
    Classify,
    Upsert,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LookupExisting => "lookup_existing",
            Self::FetchDetail => "fetch_detail",
            Self::Parse => "parse",
            Self::Classify => "classify",
            Self::Upsert => "upsert",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct ItemFailure {
    pub stage: ItemStage,
    #[source]
    pub source: DecisionError,
}

impl ItemFailure {
    fn at(stage: ItemStage) -> impl FnOnce(DecisionError) -> Self {
        move |source| Self { stage, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemResult {
    Synced {
        upsert: UpsertOutcome,
        outcome: Option<Outcome>,
    },
    Skipped,
}

/// A run that could not finish. `summary` is finalized and reflects every
/// item attempted before the failure.
#[derive(Debug, Error)]
#[error("sync run aborted after {} item(s): {source}", .summary.total)]
pub struct RunError {
    pub summary: SyncRunSummary,
    #[source]
    pub source: DecisionError,
}

pub struct SyncPipeline {
    client: DecisionClient,
    classifier: OutcomeClassifier,
    store: Arc<dyn DecisionStore>,
}

impl SyncPipeline {
    pub fn new(
        client: DecisionClient,
        classifier: OutcomeClassifier,
        store: Arc<dyn DecisionStore>,
    ) -> Self {
        Self {
            client,
            classifier,
            store,
        }
    }

    /// Wires the pipeline from configuration, using Postgres when a
    /// database URL is configured and an in-memory store otherwise.
    pub async fn from_config(config: &SyncConfig) -> anyhow::Result<Self> {
        let client =
            DecisionClient::new(config.client_config()).context("building decision client")?;
        let generator =
            OpenAiGenerator::new(config.generator_config()).context("building llm client")?;
        let store: Arc<dyn DecisionStore> = match &config.database_url {
            Some(url) => {
                let store = PgDecisionStore::connect(url)
                    .await
                    .context("connecting decision store")?;
                store.migrate().await.context("migrating decision store")?;
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set; results are kept in memory only");
                Arc::new(MemoryDecisionStore::new())
            }
        };
        Ok(Self::new(
            client,
            OutcomeClassifier::new(Arc::new(generator)),
            store,
        ))
    }

    pub fn client(&self) -> &DecisionClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn DecisionStore> {
        &self.store
    }

    #[instrument(skip_all, fields(query = %options.query, max_decisions = options.max_decisions))]
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncRunSummary, RunError> {
        let mut tracker = RunTracker::start();
        let mut cursor = self
            .client
            .iterate(options.query.clone(), options.search_filters());

        'pages: while tracker.total() < options.max_decisions {
            let batch = match cursor.next_batch().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(source) => {
                    let summary = tracker.finish();
                    error!(error = %source, total = summary.total, "search iteration failed; run aborted");
                    return Err(RunError { summary, source });
                }
            };

            for summary in &batch {
                if tracker.total() >= options.max_decisions {
                    break 'pages;
                }
                tracker.begin_item();
                match self.process_item(summary, options).await {
                    Ok(ItemResult::Synced { upsert, outcome }) => {
                        tracker.record_synced();
                        info!(
                            citation_number = %summary.citation_number,
                            ?upsert,
                            outcome = outcome.map(Outcome::as_str).unwrap_or("unclassified"),
                            "decision synced"
                        );
                    }
                    Ok(ItemResult::Skipped) => {
                        tracker.record_skipped();
                        info!(citation_number = %summary.citation_number, "decision already stored; skipped");
                    }
                    Err(failure) => {
                        warn!(
                            citation_number = %summary.citation_number,
                            stage = %failure.stage,
                            error = %failure.source,
                            "decision failed"
                        );
                        tracker.record_error(
                            summary.id.clone(),
                            summary.citation_number.clone(),
                            failure.to_string(),
                        );
                    }
                }
            }
        }

        let summary = tracker.finish();
        let metadata = SyncMetadata::from_summary(&summary);
        if let Err(source) = self.store.put_sync_metadata(&metadata).await {
            error!(error = %source, "writing sync status failed");
            return Err(RunError { summary, source });
        }

        info!(
            total = summary.total,
            synced = summary.synced,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            duration_ms = summary.duration_ms.unwrap_or_default(),
            status = metadata.status.as_str(),
            "sync run finished"
        );
        Ok(summary)
    }

    /// Takes one search hit through every stage. The classify stage cannot
    /// fail; an unusable classification is stored as `Unknown`.
    pub async fn process_item(
        &self,
        summary: &DecisionSummary,
        options: &SyncOptions,
    ) -> Result<ItemResult, ItemFailure> {
        if options.skip_existing {
            let existing = self
                .store
                .find_by_citation(&summary.citation_number)
                .await
                .map_err(ItemFailure::at(ItemStage::LookupExisting))?;
            if existing.is_some() {
                return Ok(ItemResult::Skipped);
            }
        }

        let detail = self
            .client
            .fetch_detail(&summary.citation_number)
            .await
            .map_err(ItemFailure::at(ItemStage::FetchDetail))?;

        if detail.summary.citation_number != summary.citation_number {
            return Err(ItemFailure {
                stage: ItemStage::Parse,
                source: DecisionError::decode(
                    200,
                    format!(
                        "detail for {} reported citation {}",
                        summary.citation_number, detail.summary.citation_number
                    ),
                ),
            });
        }
        let mut record = normalize_decision(detail);

        if options.extract_outcomes {
            let classification = self
                .classifier
                .classify(&record.citation_number, record.decision_date, &record.raw_text)
                .await;
            record.outcome = Some(classification.outcome);
            record.confidence = Some(classification.confidence);
        }

        let upsert = self
            .store
            .upsert_decision(&record)
            .await
            .map_err(ItemFailure::at(ItemStage::Upsert))?;
        Ok(ItemResult::Synced {
            upsert,
            outcome: record.outcome,
        })
    }
}

/// Runs one scheduled sync unless another is still holding `running`.
/// Returns whether a run was started.
async fn run_if_idle(running: &Mutex<()>, pipeline: &SyncPipeline, options: &SyncOptions) -> bool {
    let Ok(_guard) = running.try_lock() else {
        warn!("previous scheduled sync still running; trigger skipped");
        return false;
    };
    match pipeline.run(options).await {
        Ok(summary) => info!(
            synced = summary.synced,
            errors = summary.errors.len(),
            "scheduled sync finished"
        ),
        Err(err) => error!(error = %err, "scheduled sync aborted"),
    }
    true
}

/// Builds a cron scheduler that runs `options` on `cron`. A trigger that
/// fires while the previous run is still going is skipped.
pub async fn build_scheduler(
    pipeline: Arc<SyncPipeline>,
    cron: &str,
    options: SyncOptions,
) -> anyhow::Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let running = Arc::new(Mutex::new(()));
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);
        let options = options.clone();
        let running = Arc::clone(&running);
        Box::pin(async move {
            run_if_idle(&running, &pipeline, &options).await;
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}

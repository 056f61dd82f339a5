use decisync_core::{DecisionError, DecisionSummary};
use tracing::debug;

use crate::{DecisionClient, SearchFilters, PAGE_SIZE};

/// Finite, non-restartable walk over search pages.
///
/// Starts at offset 0 and advances by [`PAGE_SIZE`] until upstream reports
/// `has_more = false` or returns an empty page; zero matches yield no
/// batch at all. The configured page delay is slept before every page
/// after the first, so no delay follows the final batch and a caller that
/// stops early never waits. An error ends the walk.
#[derive(Debug)]
pub struct SearchCursor<'a> {
    client: &'a DecisionClient,
    query: String,
    filters: SearchFilters,
    next_offset: u32,
    batches: usize,
    finished: bool,
}

impl<'a> SearchCursor<'a> {
    pub(crate) fn new(client: &'a DecisionClient, query: String, filters: SearchFilters) -> Self {
        Self {
            client,
            query,
            filters,
            next_offset: 0,
            batches: 0,
            finished: false,
        }
    }

    /// Number of non-empty batches yielded so far.
    pub fn batches_fetched(&self) -> usize {
        self.batches
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn next_batch(&mut self) -> Result<Option<Vec<DecisionSummary>>, DecisionError> {
        if self.finished {
            return Ok(None);
        }

        let delay = self.client.page_delay();
        if self.batches > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let filters = SearchFilters {
            offset: self.next_offset,
            limit: PAGE_SIZE,
            ..self.filters.clone()
        };
        let page = match self.client.search(&self.query, &filters).await {
            Ok(page) => page,
            Err(err) => {
                self.finished = true;
                return Err(err);
            }
        };

        // An empty page ends the walk even if upstream claims more.
        if page.decisions.is_empty() {
            self.finished = true;
            debug!(offset = filters.offset, "search exhausted on empty page");
            return Ok(None);
        }

        self.batches += 1;
        self.next_offset = self.next_offset.saturating_add(PAGE_SIZE);
        if !page.has_more {
            self.finished = true;
        }
        debug!(
            batch = self.batches,
            offset = filters.offset,
            size = page.decisions.len(),
            finished = self.finished,
            "search batch ready"
        );
        Ok(Some(page.decisions))
    }
}

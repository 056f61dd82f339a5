//! HTTP client for the upstream decision-search service.

use std::time::Duration;

use decisync_core::{DecisionDetail, DecisionError, DecisionSummary, DecisionType};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info_span, warn, Instrument};

mod cursor;

pub use cursor::SearchCursor;

pub const CRATE_NAME: &str = "decisync-client";

/// Page size used by [`DecisionClient::iterate`].
pub const PAGE_SIZE: u32 = 100;
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_LIMIT: u32 = 20;
pub const MIN_YEAR: i32 = 1990;
pub const MAX_YEAR: i32 = 2030;

const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Pause between consecutive pages while iterating.
    pub page_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionTypeFilter {
    Only(DecisionType),
    #[default]
    All,
}

impl DecisionTypeFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Only(decision_type) => decision_type.as_str(),
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    DateDesc,
    DateAsc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DateDesc => "date.desc",
            Self::DateAsc => "date.asc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    pub decision_type: DecisionTypeFilter,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub sort: SortOrder,
    pub offset: u32,
    pub limit: u32,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            decision_type: DecisionTypeFilter::All,
            start_year: None,
            end_year: None,
            sort: SortOrder::DateDesc,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchFilters {
    pub fn validate(&self) -> Result<(), DecisionError> {
        for (field, year) in [("start_year", self.start_year), ("end_year", self.end_year)] {
            if let Some(year) = year {
                if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
                    return Err(DecisionError::invalid_input(format!(
                        "{field} {year} is outside {MIN_YEAR}..={MAX_YEAR}"
                    )));
                }
            }
        }
        if let (Some(start), Some(end)) = (self.start_year, self.end_year) {
            if start > end {
                return Err(DecisionError::invalid_input(format!(
                    "start_year {start} is after end_year {end}"
                )));
            }
        }
        if !(1..=PAGE_SIZE).contains(&self.limit) {
            return Err(DecisionError::invalid_input(format!(
                "limit {} must be between 1 and {PAGE_SIZE}",
                self.limit
            )));
        }
        Ok(())
    }

    fn query_pairs(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("query", query.to_string())];
        if self.decision_type != DecisionTypeFilter::All {
            pairs.push(("decision_type", self.decision_type.as_str().to_string()));
        }
        if let Some(start) = self.start_year {
            pairs.push(("start_year", start.to_string()));
        }
        if let Some(end) = self.end_year {
            pairs.push(("end_year", end.to_string()));
        }
        pairs.push(("sort", self.sort.as_str().to_string()));
        pairs.push(("offset", self.offset.to_string()));
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchPage {
    pub offset: u32,
    pub limit: u32,
    pub has_more: bool,
    pub count: u64,
    #[serde(default)]
    pub decisions: Vec<DecisionSummary>,
}

#[derive(Debug, Clone)]
pub struct DecisionClient {
    client: reqwest::Client,
    base_url: Url,
    page_delay: Duration,
}

impl DecisionClient {
    pub fn new(config: ClientConfig) -> Result<Self, DecisionError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DecisionError::invalid_input(format!("base url {:?}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DecisionError::invalid_input(format!(
                "base url {:?} cannot carry a path",
                config.base_url
            )));
        }

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| DecisionError::invalid_input(format!("building http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            page_delay: config.page_delay,
        })
    }

    pub fn page_delay(&self) -> Duration {
        self.page_delay
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<SearchPage, DecisionError> {
        if query.trim().is_empty() {
            return Err(DecisionError::invalid_input("search query must not be empty"));
        }
        filters.validate()?;

        let url = self.endpoint(&["search"]);
        let span = info_span!(
            "decision_search",
            query,
            offset = filters.offset,
            limit = filters.limit
        );
        async {
            let response = self
                .client
                .get(url)
                .query(&filters.query_pairs(query))
                .send()
                .await
                .map_err(transport_error)?;
            let page: SearchPage = read_json(response, "search").await?;
            debug!(
                returned = page.decisions.len(),
                count = page.count,
                has_more = page.has_more,
                "search page received"
            );
            Ok(page)
        }
        .instrument(span)
        .await
    }

    pub async fn fetch_detail(&self, citation_number: &str) -> Result<DecisionDetail, DecisionError> {
        let url = self.endpoint(&["decisions", citation_number]);
        let span = info_span!("decision_detail", citation_number);
        async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(transport_error)?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(DecisionError::not_found(format!(
                    "decision {citation_number}"
                )));
            }
            read_json(response, "decision detail").await
        }
        .instrument(span)
        .await
    }

    /// Lazily walks every page for `query`, [`PAGE_SIZE`] results at a time.
    pub fn iterate(&self, query: impl Into<String>, filters: SearchFilters) -> SearchCursor<'_> {
        SearchCursor::new(self, query.into(), filters)
    }

    /// Reachability probe. Never fails; any error reads as unhealthy.
    pub async fn health_check(&self) -> bool {
        let url = self.endpoint(&["health"]);
        let span = info_span!("decision_health");
        async {
            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    warn!(status = %response.status(), "decision service health check failed");
                    false
                }
                Err(err) => {
                    warn!(error = %err, "decision service unreachable");
                    false
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn transport_error(err: reqwest::Error) -> DecisionError {
    DecisionError::transport(format!("request failed: {err}"))
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, DecisionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
        return Err(DecisionError::api(
            status.as_u16(),
            format!("{what} returned {status}: {preview}"),
        ));
    }
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DecisionError::decode(status.as_u16(), format!("{what} body: {e}")))
}

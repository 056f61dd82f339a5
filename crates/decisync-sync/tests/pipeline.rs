//! End-to-end runs against a simulated decision service, a scripted
//! generator and the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use decisync_ai::mock::MockGenerator;
use decisync_ai::OutcomeClassifier;
use decisync_client::{ClientConfig, DecisionClient};
use decisync_core::{
    CanonicalDecisionRecord, DecisionType, ErrorKind, Outcome, SyncStatus,
};
use decisync_storage::{DecisionStore, MemoryDecisionStore};
use decisync_sync::{SyncOptions, SyncPipeline};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    generator: MockGenerator,
    store: Arc<MemoryDecisionStore>,
    pipeline: SyncPipeline,
}

impl Harness {
    async fn new() -> Self {
        Self::with_generator(MockGenerator::new()).await
    }

    async fn with_generator(generator: MockGenerator) -> Self {
        let server = MockServer::start().await;
        let client = DecisionClient::new(ClientConfig {
            base_url: server.uri(),
            page_delay: Duration::ZERO,
            ..Default::default()
        })
        .expect("client");
        let store = Arc::new(MemoryDecisionStore::new());
        let pipeline = SyncPipeline::new(
            client,
            OutcomeClassifier::new(Arc::new(generator.clone())),
            store.clone(),
        );
        Self {
            server,
            generator,
            store,
            pipeline,
        }
    }

    async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}

fn citation(n: usize) -> String {
    format!("23-{n:04}")
}

fn summary_json(n: usize) -> Value {
    json!({
        "id": format!("ext-{n}"),
        "citation_number": citation(n),
        "decision_date": "2023-03-15",
        "decision_type": "AMA",
        "docket_numbers": [format!("230315-{n}")],
        "url": format!("https://decisions.example.test/{}", citation(n))
    })
}

fn detail_json(n: usize) -> Value {
    let mut detail = summary_json(n);
    let extra = json!({
        "paragraphs": [
            {"section": "Introduction", "text": format!("Appeal {}.", citation(n)), "order": 1},
            {"section": "Findings of Fact", "text": "The Veteran served.", "order": 2},
            {"section": "ORDER", "text": "Service connection is denied.", "order": 3}
        ],
        "raw_text": format!("Appeal {}. The Veteran served. Service connection is denied.", citation(n)),
        "filename": format!("{}.txt", citation(n)),
        "created_at": "2023-03-16T00:00:00Z",
        "updated_at": "2023-03-17T00:00:00Z"
    });
    if let (Some(target), Some(source)) = (detail.as_object_mut(), extra.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
    detail
}

/// Mounts search pages for decisions `1..=total` plus a detail route for each.
async fn mount_upstream(server: &MockServer, total: usize) {
    let mut offset = 0;
    loop {
        let end = (offset + 100).min(total);
        let decisions: Vec<Value> = (offset + 1..=end).map(summary_json).collect();
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "offset": offset,
                "limit": 100,
                "has_more": end < total,
                "count": total,
                "decisions": decisions,
            })))
            .mount(server)
            .await;
        if end >= total {
            break;
        }
        offset = end;
    }
}

async fn mount_details(server: &MockServer, numbers: impl IntoIterator<Item = usize>) {
    for n in numbers {
        Mock::given(method("GET"))
            .and(path(format!("/decisions/{}", citation(n))))
            .respond_with(ResponseTemplate::new(200).set_body_json(detail_json(n)))
            .mount(server)
            .await;
    }
}

fn stored_fingerprint(records: &[CanonicalDecisionRecord]) -> Vec<(String, String, String)> {
    records
        .iter()
        .map(|r| (r.citation_number.clone(), r.id.to_string(), r.raw_text.clone()))
        .collect()
}

#[tokio::test]
async fn repeated_runs_do_not_duplicate_records() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 3).await;
    mount_details(&harness.server, 1..=3).await;

    let first = harness.pipeline.run(&SyncOptions::default()).await.expect("first run");
    let after_first = harness.store.snapshot().await;
    let second = harness.pipeline.run(&SyncOptions::default()).await.expect("second run");
    let after_second = harness.store.snapshot().await;

    assert_eq!(first.synced, 3);
    assert_eq!(second.synced, 3);
    assert_eq!(after_first.len(), 3);
    assert_eq!(stored_fingerprint(&after_first), stored_fingerprint(&after_second));
    assert_eq!(harness.store.count_decisions().await.unwrap(), 3);

    let record = &after_second[0];
    assert_eq!(record.external_id, "ext-1");
    assert_eq!(record.decision_type, DecisionType::Ama);
    assert_eq!(record.outcome, Some(Outcome::Denied));
    assert_eq!(record.sections["findings_of_fact"], "The Veteran served.");
    assert_eq!(record.sections["conclusion"], "Service connection is denied.");
}

#[tokio::test]
async fn skip_existing_avoids_detail_fetch_and_classification() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 3).await;
    mount_details(&harness.server, 1..=3).await;

    // Seed 23-0001 through a plain run restricted to one decision.
    let seed = SyncOptions {
        max_decisions: 1,
        ..Default::default()
    };
    harness.pipeline.run(&seed).await.expect("seed run");
    let detail_fetches_before = harness.requests_to("/decisions/23-0001").await;
    let classifications_before = harness.generator.calls_mentioning("23-0001");

    let options = SyncOptions {
        skip_existing: true,
        ..Default::default()
    };
    let summary = harness.pipeline.run(&options).await.expect("run");

    assert_eq!(summary.total, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.synced, 2);
    assert!(summary.errors.is_empty());
    assert_eq!(
        harness.requests_to("/decisions/23-0001").await,
        detail_fetches_before
    );
    assert_eq!(
        harness.generator.calls_mentioning("23-0001"),
        classifications_before
    );
}

#[tokio::test]
async fn max_decisions_stops_before_requesting_more_pages() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 250).await;
    mount_details(&harness.server, 1..=10).await;

    let options = SyncOptions {
        max_decisions: 5,
        ..Default::default()
    };
    let summary = harness.pipeline.run(&options).await.expect("run");

    assert_eq!(summary.total, 5);
    assert_eq!(summary.synced, 5);
    assert_eq!(harness.requests_to("/search").await, 1);
    assert_eq!(harness.generator.call_count(), 5);
    assert_eq!(harness.store.count_decisions().await.unwrap(), 5);
}

#[tokio::test]
async fn ceiling_at_page_boundary_does_not_fetch_next_page() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 250).await;
    mount_details(&harness.server, 1..=100).await;

    let options = SyncOptions {
        max_decisions: 100,
        extract_outcomes: false,
        ..Default::default()
    };
    let summary = harness.pipeline.run(&options).await.expect("run");

    assert_eq!(summary.total, 100);
    assert_eq!(harness.requests_to("/search").await, 1);
}

#[tokio::test]
async fn all_pages_are_walked_when_under_the_ceiling() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 230).await;
    mount_details(&harness.server, 1..=230).await;

    let options = SyncOptions {
        max_decisions: 1000,
        extract_outcomes: false,
        ..Default::default()
    };
    let summary = harness.pipeline.run(&options).await.expect("run");

    assert_eq!(summary.total, 230);
    assert_eq!(harness.requests_to("/search").await, 3);
}

#[tokio::test]
async fn malformed_classification_is_stored_as_unknown_and_counted_synced() {
    let generator = MockGenerator::new().with_response_for("23-0001", "this is not json");
    let harness = Harness::with_generator(generator).await;
    mount_upstream(&harness.server, 2).await;
    mount_details(&harness.server, 1..=2).await;

    let summary = harness.pipeline.run(&SyncOptions::default()).await.expect("run");

    assert_eq!(summary.synced, 2);
    assert!(summary.errors.is_empty());
    let degraded = harness.store.find_by_citation("23-0001").await.unwrap().unwrap();
    assert_eq!(degraded.outcome, Some(Outcome::Unknown));
    assert_eq!(degraded.confidence, Some(0.0));
    let classified = harness.store.find_by_citation("23-0002").await.unwrap().unwrap();
    assert_eq!(classified.outcome, Some(Outcome::Denied));
}

#[tokio::test]
async fn failing_classification_call_does_not_block_persistence() {
    let generator = MockGenerator::new().with_failure(decisync_core::DecisionError::generation(
        503,
        "model overloaded",
    ));
    let harness = Harness::with_generator(generator).await;
    mount_upstream(&harness.server, 1).await;
    mount_details(&harness.server, [1]).await;

    let summary = harness.pipeline.run(&SyncOptions::default()).await.expect("run");
    assert_eq!(summary.synced, 1);
    let record = harness.store.find_by_citation("23-0001").await.unwrap().unwrap();
    assert_eq!(record.outcome, Some(Outcome::Unknown));
}

#[tokio::test]
async fn detail_failure_is_isolated_to_its_item() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 3).await;
    mount_details(&harness.server, [1, 3]).await;
    Mock::given(method("GET"))
        .and(path("/decisions/23-0002"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&harness.server)
        .await;

    let summary = harness.pipeline.run(&SyncOptions::default()).await.expect("run");

    assert_eq!(summary.total, 3);
    assert_eq!(summary.synced, 2);
    assert_eq!(summary.errors.len(), 1);
    let error = &summary.errors[0];
    assert_eq!(error.citation_number, "23-0002");
    assert_eq!(error.decision_id, "ext-2");
    assert!(error.message.starts_with("fetch_detail:"), "{}", error.message);
    assert!(harness.store.find_by_citation("23-0003").await.unwrap().is_some());

    let meta = harness.store.sync_metadata().await.unwrap().expect("metadata");
    assert_eq!(meta.status, SyncStatus::CompletedWithErrors);
    assert_eq!(meta.total_synced, 2);
    assert!(meta.error_summary.expect("summary").contains("23-0002"));
}

#[tokio::test]
async fn missing_detail_is_recorded_not_thrown() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 1).await;
    Mock::given(method("GET"))
        .and(path("/decisions/23-0001"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.server)
        .await;

    let summary = harness.pipeline.run(&SyncOptions::default()).await.expect("run");
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].message.contains("not_found"));
    assert_eq!(harness.generator.call_count(), 0);
}

#[tokio::test]
async fn storage_failure_is_isolated_to_its_item() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 2).await;
    mount_details(&harness.server, 1..=2).await;
    harness.store.reject_citation("23-0001").await;

    let summary = harness.pipeline.run(&SyncOptions::default()).await.expect("run");
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].message.starts_with("upsert:"));
}

#[tokio::test]
async fn search_failure_aborts_with_finalized_summary() {
    let harness = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&harness.server)
        .await;

    let err = harness
        .pipeline
        .run(&SyncOptions::default())
        .await
        .expect_err("search down");
    assert_eq!(err.source.kind, ErrorKind::Api);
    assert_eq!(err.source.status, 503);
    assert_eq!(err.summary.total, 0);
    assert!(err.summary.finished_at.is_some());
    assert!(err.summary.duration_ms.is_some());
    assert_eq!(harness.store.metadata_writes().await, 0);
}

#[tokio::test]
async fn later_page_failure_keeps_items_already_synced() {
    let harness = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offset": 0,
            "limit": 100,
            "has_more": true,
            "count": 150,
            "decisions": [summary_json(1), summary_json(2)],
        })))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&harness.server)
        .await;
    mount_details(&harness.server, 1..=2).await;

    let err = harness
        .pipeline
        .run(&SyncOptions::default())
        .await
        .expect_err("second page fails");
    assert_eq!(err.summary.total, 2);
    assert_eq!(err.summary.synced, 2);
    assert_eq!(harness.store.count_decisions().await.unwrap(), 2);
}

#[tokio::test]
async fn outcomes_are_not_requested_when_extraction_is_off() {
    let harness = Harness::new().await;
    mount_upstream(&harness.server, 2).await;
    mount_details(&harness.server, 1..=2).await;

    let options = SyncOptions {
        extract_outcomes: false,
        ..Default::default()
    };
    let summary = harness.pipeline.run(&options).await.expect("run");
    assert_eq!(summary.synced, 2);
    assert_eq!(harness.generator.call_count(), 0);
    let record = harness.store.find_by_citation("23-0002").await.unwrap().unwrap();
    assert!(record.outcome.is_none());

    let meta = harness.store.sync_metadata().await.unwrap().expect("metadata");
    assert_eq!(meta.status, SyncStatus::Completed);
    assert!(meta.error_summary.is_none());
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use decisync_core::{
    CanonicalDecisionRecord, DecisionError, DecisionType, Outcome, Paragraph, SyncMetadata,
    SyncStatus, SYNC_METADATA_KEY,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{DecisionStore, UpsertOutcome};

const DECISION_COLUMNS: &str = "id, external_id, citation_number, decision_date, decision_type, \
     docket_numbers, source_url, filename, raw_text, paragraphs, sections, outcome, confidence, \
     synced_at, updated_at, vector_indexed";

#[derive(Debug, Clone)]
pub struct PgDecisionStore {
    pool: PgPool,
}

impl PgDecisionStore {
    pub async fn connect(database_url: &str) -> Result<Self, DecisionError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(storage_error("connecting to postgres"))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), DecisionError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DecisionError::storage(format!("running migrations: {e}")))?;
        info!("decision store migrations applied");
        Ok(())
    }
}

fn storage_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> DecisionError {
    move |err| DecisionError::storage(format!("{context}: {err}"))
}

fn record_from_row(row: &PgRow) -> Result<CanonicalDecisionRecord, DecisionError> {
    let decode = storage_error("decoding decision row");
    let read = || -> Result<CanonicalDecisionRecord, sqlx::Error> {
        let decision_type: String = row.try_get("decision_type")?;
        let outcome: Option<String> = row.try_get("outcome")?;
        let paragraphs: Json<Vec<Paragraph>> = row.try_get("paragraphs")?;
        let sections: Json<BTreeMap<String, String>> = row.try_get("sections")?;
        let decode_err = |e: DecisionError| sqlx::Error::Decode(Box::new(e));
        Ok(CanonicalDecisionRecord {
            id: row.try_get::<Uuid, _>("id")?,
            external_id: row.try_get("external_id")?,
            citation_number: row.try_get("citation_number")?,
            decision_date: row.try_get::<Option<NaiveDate>, _>("decision_date")?,
            decision_type: decision_type.parse::<DecisionType>().map_err(decode_err)?,
            docket_numbers: row.try_get("docket_numbers")?,
            source_url: row.try_get("source_url")?,
            filename: row.try_get("filename")?,
            raw_text: row.try_get("raw_text")?,
            paragraphs: paragraphs.0,
            sections: sections.0,
            outcome: outcome
                .map(|o| o.parse::<Outcome>())
                .transpose()
                .map_err(decode_err)?,
            confidence: row.try_get("confidence")?,
            synced_at: row.try_get::<DateTime<Utc>, _>("synced_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            vector_indexed: row.try_get("vector_indexed")?,
        })
    };
    read().map_err(decode)
}

#[async_trait]
impl DecisionStore for PgDecisionStore {
    async fn find_by_citation(
        &self,
        citation_number: &str,
    ) -> Result<Option<CanonicalDecisionRecord>, DecisionError> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE citation_number = $1");
        let row = sqlx::query(&sql)
            .bind(citation_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("looking up decision"))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert_decision(
        &self,
        record: &CanonicalDecisionRecord,
    ) -> Result<UpsertOutcome, DecisionError> {
        // xmax is zero only for a freshly inserted tuple.
        let row = sqlx::query(
            r#"
            INSERT INTO decisions (
                id, external_id, citation_number, decision_date, decision_type,
                docket_numbers, source_url, filename, raw_text, paragraphs, sections,
                outcome, confidence, synced_at, updated_at, vector_indexed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, FALSE)
            ON CONFLICT (citation_number) DO UPDATE SET
                external_id    = EXCLUDED.external_id,
                decision_date  = EXCLUDED.decision_date,
                decision_type  = EXCLUDED.decision_type,
                docket_numbers = EXCLUDED.docket_numbers,
                source_url     = EXCLUDED.source_url,
                filename       = EXCLUDED.filename,
                raw_text       = EXCLUDED.raw_text,
                paragraphs     = EXCLUDED.paragraphs,
                sections       = EXCLUDED.sections,
                outcome        = COALESCE(EXCLUDED.outcome, decisions.outcome),
                confidence     = COALESCE(EXCLUDED.confidence, decisions.confidence),
                updated_at     = EXCLUDED.updated_at,
                vector_indexed = FALSE
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(record.id)
        .bind(&record.external_id)
        .bind(&record.citation_number)
        .bind(record.decision_date)
        .bind(record.decision_type.as_str())
        .bind(&record.docket_numbers)
        .bind(&record.source_url)
        .bind(&record.filename)
        .bind(&record.raw_text)
        .bind(Json(&record.paragraphs))
        .bind(Json(&record.sections))
        .bind(record.outcome.map(Outcome::as_str))
        .bind(record.confidence)
        .bind(record.synced_at)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error("upserting decision"))?;

        let inserted: bool = row
            .try_get("inserted")
            .map_err(storage_error("reading upsert result"))?;
        debug!(citation_number = %record.citation_number, inserted, "decision upserted");
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn count_decisions(&self) -> Result<u64, DecisionError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM decisions")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("counting decisions"))?;
        Ok(count.max(0) as u64)
    }

    async fn put_sync_metadata(&self, metadata: &SyncMetadata) -> Result<(), DecisionError> {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (key, last_sync_at, total_synced, status, error_summary, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (key) DO UPDATE SET
                last_sync_at  = EXCLUDED.last_sync_at,
                total_synced  = EXCLUDED.total_synced,
                status        = EXCLUDED.status,
                error_summary = EXCLUDED.error_summary,
                updated_at    = now()
            "#,
        )
        .bind(SYNC_METADATA_KEY)
        .bind(metadata.last_sync_at)
        .bind(i64::try_from(metadata.total_synced).unwrap_or(i64::MAX))
        .bind(metadata.status.as_str())
        .bind(&metadata.error_summary)
        .execute(&self.pool)
        .await
        .map_err(storage_error("writing sync metadata"))?;
        Ok(())
    }

    async fn sync_metadata(&self) -> Result<Option<SyncMetadata>, DecisionError> {
        let row = sqlx::query(
            r#"
            SELECT last_sync_at, total_synced, status, error_summary
              FROM sync_metadata
             WHERE key = $1
            "#,
        )
        .bind(SYNC_METADATA_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error("reading sync metadata"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let read = || -> Result<(DateTime<Utc>, i64, String, Option<String>), sqlx::Error> {
            Ok((
                row.try_get("last_sync_at")?,
                row.try_get("total_synced")?,
                row.try_get("status")?,
                row.try_get("error_summary")?,
            ))
        };
        let (last_sync_at, total_synced, status, error_summary) =
            read().map_err(storage_error("decoding sync metadata"))?;
        Ok(Some(SyncMetadata {
            last_sync_at,
            total_synced: total_synced.max(0) as u64,
            status: status.parse::<SyncStatus>()?,
            error_summary,
        }))
    }
}

//! Repository over `raw_log_observations`, the read side the out-of-scope
//! log collector owns. The pipeline only claims batches and marks them
//! consumed.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::StoreResult;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawObservation {
    pub id: i64,
    pub source_database: String,
    pub raw_sql_text: String,
    pub duration_ms: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

pub struct LogObservationRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> LogObservationRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Claim up to `batch_size` unprocessed observations with
    /// `FOR UPDATE SKIP LOCKED` so concurrent aggregator processes never
    /// see the same row twice.
    pub async fn claim_batch(&self, batch_size: i64) -> StoreResult<Vec<RawObservation>> {
        let rows = sqlx::query_as::<_, RawObservation>(
            r#"
            select id, source_database, raw_sql_text, duration_ms, observed_at
            from raw_log_observations
            where not is_processed_for_analysis
            order by id
            limit $1
            for update skip locked
            "#,
        )
        .bind(batch_size)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Mark an observation consumed, recording the pattern hash it resolved
    /// to (or `None` when the fingerprinter rejected it).
    pub async fn mark_processed(&self, id: i64, sql_hash: Option<&str>) -> StoreResult<()> {
        sqlx::query(
            r#"
            update raw_log_observations
            set is_processed_for_analysis = true, normalised_sql_hash = $2
            where id = $1
            "#,
        )
        .bind(id)
        .bind(sql_hash)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record a fingerprinter rejection for operator review.
    pub async fn record_normalization_error(
        &self,
        raw_sql_text: &str,
        source_database: &str,
        reason: &str,
        observed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into normalization_errors (raw_sql_text, source_database, reason, observed_at)
            values ($1, $2, $3, $4)
            "#,
        )
        .bind(raw_sql_text)
        .bind(source_database)
        .bind(reason)
        .bind(observed_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

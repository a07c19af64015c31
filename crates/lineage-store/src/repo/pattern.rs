//! Repository over `sql_patterns`, the row each distinct SQL shape gets.
//!
//! `PatternStatus` mirrors §3's `llm_status` vocabulary (`PENDING`,
//! `IN_PROGRESS`, `COMPLETED_SUCCESS`, `COMPLETED_NO_LINEAGE`,
//! `FAILED_PARSE`, `FAILED_LLM`) plus one extra transient state,
//! `GraphBuildInProgress`, that exists purely so the lineage graph builder
//! can claim a batch with `FOR UPDATE SKIP LOCKED` the same way the
//! extractor does — it is not part of `llm_status` and always resolves
//! back to `CompletedSuccess` (§4.6's `loaded_to_graph` is a separate
//! boolean column, not a status). Every claim is a `FOR UPDATE SKIP
//! LOCKED` read in the same transaction as the status flip to the
//! in-progress marker, so parallel worker processes never contend on the
//! same pattern (§5).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternStatus {
    Pending,
    InProgress,
    CompletedSuccess,
    CompletedNoLineage,
    FailedParse,
    FailedLlm,
    /// Transient: claimed by the lineage graph builder, not part of
    /// `llm_status`. Always resolves back to `CompletedSuccess`.
    GraphBuildInProgress,
}

impl PatternStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::CompletedSuccess => "COMPLETED_SUCCESS",
            Self::CompletedNoLineage => "COMPLETED_NO_LINEAGE",
            Self::FailedParse => "FAILED_PARSE",
            Self::FailedLlm => "FAILED_LLM",
            Self::GraphBuildInProgress => "GRAPH_BUILD_IN_PROGRESS",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        Some(match raw {
            "PENDING" => Self::Pending,
            "IN_PROGRESS" => Self::InProgress,
            "COMPLETED_SUCCESS" => Self::CompletedSuccess,
            "COMPLETED_NO_LINEAGE" => Self::CompletedNoLineage,
            "FAILED_PARSE" => Self::FailedParse,
            "FAILED_LLM" => Self::FailedLlm,
            "GRAPH_BUILD_IN_PROGRESS" => Self::GraphBuildInProgress,
            _ => return None,
        })
    }

    /// `FAILED_*` per §3/§4.2 — the only statuses an operator reset (or the
    /// aggregator's `retry_failed` policy) may move back to `Pending`.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::FailedParse | Self::FailedLlm)
    }
}

#[derive(Debug, Clone)]
pub struct SqlPattern {
    pub sql_hash: String,
    pub normalized_sql: String,
    pub sample_raw_sql: String,
    pub source_database: String,
    pub occurrence_count: i64,
    pub status: PatternStatus,
    pub parsing_confidence: Option<f64>,
    pub lineage_document: Option<lineage_core::LineageDocument>,
    pub loaded_to_graph: bool,
}

#[derive(sqlx::FromRow)]
struct SqlPatternRow {
    sql_hash: String,
    normalized_sql: String,
    sample_raw_sql: String,
    source_database: String,
    occurrence_count: i64,
    status: String,
    parsing_confidence: Option<f64>,
    lineage_document: Option<serde_json::Value>,
    loaded_to_graph: bool,
}

impl TryFrom<SqlPatternRow> for SqlPattern {
    type Error = String;

    fn try_from(row: SqlPatternRow) -> Result<Self, Self::Error> {
        let status = PatternStatus::from_str(&row.status)
            .ok_or_else(|| format!("unknown pattern status {:?}", row.status))?;
        let lineage_document = row
            .lineage_document
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| format!("stored lineage_document failed to deserialize: {e}"))?;
        Ok(SqlPattern {
            sql_hash: row.sql_hash,
            normalized_sql: row.normalized_sql,
            sample_raw_sql: row.sample_raw_sql,
            source_database: row.source_database,
            occurrence_count: row.occurrence_count,
            status,
            parsing_confidence: row.parsing_confidence,
            lineage_document,
            loaded_to_graph: row.loaded_to_graph,
        })
    }
}

const PATTERN_COLUMNS: &str = r#"
    sql_hash, normalized_sql, sample_raw_sql, source_database, occurrence_count,
    status, parsing_confidence, lineage_document, loaded_to_graph
"#;

pub struct SqlPatternRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> SqlPatternRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new pattern or bump its execution stats. Conflict key is
    /// `sql_hash`, matching the aggregator's §4.2/§5 contract:
    /// `execution_count` is monotone non-decreasing and duration
    /// aggregates fold in every new observation.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_observation(
        &self,
        sql_hash: &str,
        normalized_sql: &str,
        sample_raw_sql: &str,
        source_database: &str,
        duration_ms: Option<f64>,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let duration = duration_ms.unwrap_or(0.0);
        sqlx::query(
            r#"
            insert into sql_patterns (
                sql_hash, normalized_sql, sample_raw_sql, source_database,
                first_seen_at, last_seen_at, occurrence_count,
                duration_total_ms, duration_avg_ms, duration_min_ms, duration_max_ms,
                status
            )
            values ($1, $2, $3, $4, $5, $5, 1, $6, $6, $6, $6, 'PENDING')
            on conflict (sql_hash) do update set
                last_seen_at = excluded.last_seen_at,
                occurrence_count = sql_patterns.occurrence_count + 1,
                duration_total_ms = sql_patterns.duration_total_ms + excluded.duration_total_ms,
                duration_avg_ms = (sql_patterns.duration_total_ms + excluded.duration_total_ms)
                    / (sql_patterns.occurrence_count + 1),
                duration_min_ms = least(sql_patterns.duration_min_ms, excluded.duration_min_ms),
                duration_max_ms = greatest(sql_patterns.duration_max_ms, excluded.duration_max_ms)
            "#,
        )
        .bind(sql_hash)
        .bind(normalized_sql)
        .bind(sample_raw_sql)
        .bind(source_database)
        .bind(seen_at)
        .bind(duration)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Claim up to `batch_size` patterns in `from_status`, atomically
    /// advancing them to `claimed_status` in the same transaction as the
    /// `FOR UPDATE SKIP LOCKED` read.
    pub async fn claim_batch(
        &self,
        from_status: PatternStatus,
        claimed_status: PatternStatus,
        batch_size: i64,
    ) -> StoreResult<Vec<SqlPattern>> {
        let mut txn = self.pool.begin().await?;
        let query = format!(
            r#"
            select {PATTERN_COLUMNS}
            from sql_patterns
            where status = $1
            order by occurrence_count desc
            limit $2
            for update skip locked
            "#
        );
        let rows: Vec<SqlPatternRow> = sqlx::query_as(&query)
            .bind(from_status.as_str())
            .bind(batch_size)
            .fetch_all(&mut *txn)
            .await?;

        let hashes: Vec<&str> = rows.iter().map(|r| r.sql_hash.as_str()).collect();
        if !hashes.is_empty() {
            sqlx::query(
                "update sql_patterns set status = $1, claimed_at = now() where sql_hash = any($2)",
            )
            .bind(claimed_status.as_str())
            .bind(&hashes)
            .execute(&mut *txn)
            .await?;
        }
        txn.commit().await?;

        rows.into_iter()
            .map(|r| SqlPattern::try_from(r).map_err(|_| crate::error::StoreError::MalformedGraphResponse))
            .collect()
    }

    /// Claim up to `batch_size` patterns with `llm_status = CompletedSuccess
    /// AND loaded_to_graph = false` for the lineage graph builder (§4.6,
    /// §5). Distinct from `claim_batch` because the claim predicate spans
    /// two columns, not one status value.
    pub async fn claim_unloaded_batch(&self, batch_size: i64) -> StoreResult<Vec<SqlPattern>> {
        let mut txn = self.pool.begin().await?;
        let query = format!(
            r#"
            select {PATTERN_COLUMNS}
            from sql_patterns
            where status = 'COMPLETED_SUCCESS' and not loaded_to_graph
            order by occurrence_count desc
            limit $1
            for update skip locked
            "#
        );
        let rows: Vec<SqlPatternRow> = sqlx::query_as(&query).bind(batch_size).fetch_all(&mut *txn).await?;

        let hashes: Vec<&str> = rows.iter().map(|r| r.sql_hash.as_str()).collect();
        if !hashes.is_empty() {
            sqlx::query(
                "update sql_patterns set status = 'GRAPH_BUILD_IN_PROGRESS', claimed_at = now() where sql_hash = any($1)",
            )
            .bind(&hashes)
            .execute(&mut *txn)
            .await?;
        }
        txn.commit().await?;

        rows.into_iter()
            .map(|r| SqlPattern::try_from(r).map_err(|_| crate::error::StoreError::MalformedGraphResponse))
            .collect()
    }

    /// Resolve a `GraphBuildInProgress` claim: status always returns to
    /// `CompletedSuccess`; `loaded_to_graph` is set `true` only on success
    /// (§4.6: "on success, sets loaded_to_graph = true; on failure, records
    /// the error and leaves the flag false").
    pub async fn resolve_graph_build(
        &self,
        sql_hash: &str,
        success: bool,
        error: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "update sql_patterns set status = 'COMPLETED_SUCCESS', loaded_to_graph = $2, graph_load_error = $3 where sql_hash = $1",
        )
        .bind(sql_hash)
        .bind(success)
        .bind(error)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_status(
        &self,
        sql_hash: &str,
        status: PatternStatus,
        parsing_confidence: Option<f64>,
        failure_reason: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "update sql_patterns set status = $2, parsing_confidence = coalesce($3, parsing_confidence), failure_reason = $4 where sql_hash = $1",
        )
        .bind(sql_hash)
        .bind(status.as_str())
        .bind(parsing_confidence)
        .bind(failure_reason)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Persist the validated extraction result alongside a status update,
    /// in one statement so a pattern is never left `IN_PROGRESS` without
    /// its document.
    pub async fn save_lineage_document(
        &self,
        sql_hash: &str,
        status: PatternStatus,
        document: &lineage_core::LineageDocument,
    ) -> StoreResult<()> {
        let json = serde_json::to_value(document)?;
        sqlx::query(
            "update sql_patterns set status = $2, parsing_confidence = $3, lineage_document = $4, last_llm_analysis_at = now() where sql_hash = $1",
        )
        .bind(sql_hash)
        .bind(status.as_str())
        .bind(document.parsing_confidence)
        .bind(json)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Operator-approved re-analysis sweep (§4.2, §9 open question: no
    /// automatic policy, but when `retry_failed` is set the aggregator
    /// calls this after draining a batch).
    pub async fn reset_failed_to_pending(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            "update sql_patterns set status = 'PENDING' where status in ('FAILED_PARSE', 'FAILED_LLM')",
        )
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Start-up sweep: no pattern should ever be left `IN_PROGRESS` or
    /// `GRAPH_BUILD_IN_PROGRESS` after an ungraceful shutdown (§5).
    /// `IN_PROGRESS` resets to `PENDING`; `GRAPH_BUILD_IN_PROGRESS` resets
    /// to `COMPLETED_SUCCESS` since extraction already completed for it.
    pub async fn reset_stuck_in_progress(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            update sql_patterns set status = case status
                when 'IN_PROGRESS' then 'PENDING'
                when 'GRAPH_BUILD_IN_PROGRESS' then 'COMPLETED_SUCCESS'
            end, claimed_at = null
            where status in ('IN_PROGRESS', 'GRAPH_BUILD_IN_PROGRESS')
            "#,
        )
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

//! Pattern aggregator: turns raw log observations into `sql_patterns` rows.
//!
//! Claims a batch of unprocessed observations, fingerprints each one, and
//! upserts the resulting pattern keyed by `sql_hash` (native Postgres
//! `ON CONFLICT`, since the control plane is plain relational Postgres —
//! the AGE dialect limitation only applies to the graph store). Rejected
//! (non-data-flow) observations are recorded in `normalization_errors`
//! instead of becoming a pattern, and every observation — accepted or
//! rejected — is marked processed so re-delivery is a no-op.

use chrono::Utc;
use lineage_core::fingerprint;
use lineage_store::repo::{LogObservationRepo, SqlPatternRepo};
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::config::AggregatorConfig;
use crate::error::PipelineError;

/// Summary of one `drain_observations` call, returned for CLI exit-code and
/// logging purposes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AggregatorReport {
    pub claimed: usize,
    pub patterns_upserted: usize,
    pub rejected: usize,
}

#[tracing::instrument(skip(pool, cfg))]
pub async fn drain_observations(
    pool: &PgPool,
    cfg: &AggregatorConfig,
) -> Result<AggregatorReport, PipelineError> {
    let observations = LogObservationRepo::new(pool).claim_batch(cfg.batch_size).await?;
    let mut report = AggregatorReport {
        claimed: observations.len(),
        ..Default::default()
    };

    for obs in &observations {
        match fingerprint::fingerprint(&obs.raw_sql_text, &obs.source_database) {
            Ok(fp) => {
                SqlPatternRepo::new(pool)
                    .upsert_observation(
                        &fp.sql_hash,
                        &fp.normalized_sql,
                        &obs.raw_sql_text,
                        &obs.source_database,
                        obs.duration_ms,
                        Utc::now(),
                    )
                    .await?;
                LogObservationRepo::new(pool)
                    .mark_processed(obs.id, Some(&fp.sql_hash))
                    .await?;
                report.patterns_upserted += 1;
                debug!(sql_hash = %fp.sql_hash, observation_id = obs.id, "upserted pattern");
            }
            Err(reason) => {
                LogObservationRepo::new(pool)
                    .record_normalization_error(
                        &obs.raw_sql_text,
                        &obs.source_database,
                        &reason.to_string(),
                        Utc::now(),
                    )
                    .await?;
                LogObservationRepo::new(pool).mark_processed(obs.id, None).await?;
                report.rejected += 1;
                warn!(observation_id = obs.id, %reason, "rejected non-data-flow observation");
            }
        }
    }

    if cfg.retry_failed {
        reset_failed_patterns(pool).await?;
    }

    Ok(report)
}

/// Moves operator-approved `FAILED_*` patterns back to `PENDING` so the
/// next pipeline pass retries extraction. Only the aggregator does this —
/// the graph builders never implicitly retry a failure.
async fn reset_failed_patterns(pool: &PgPool) -> Result<(), PipelineError> {
    let reset = SqlPatternRepo::new(pool).reset_failed_to_pending().await?;
    if reset > 0 {
        debug!(reset, "reset failed patterns to pending for retry");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_defaults_to_zero() {
        let report = AggregatorReport::default();
        assert_eq!(report.claimed, 0);
        assert_eq!(report.patterns_upserted, 0);
        assert_eq!(report.rejected, 0);
    }
}

//! Async orchestration layer for the lineage pipeline: pattern aggregation,
//! context assembly, LLM extraction, and the two graph builders. Stage
//! functions are generic over a `sqlx::PgPool` and take an explicit
//! `PipelineConfig`, so they're runtime-agnostic and unit-testable without a
//! process-global scheduler.

pub mod aggregator;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod lineage_graph;
pub mod metadata_graph;

pub use aggregator::{drain_observations, AggregatorReport};
pub use config::{AggregatorConfig, ContextConfig, ExtractorConfig, GraphBuilderConfig, PipelineConfig};
pub use context::{assemble_context, AssembledContext};
pub use error::{LlmTransportError, PipelineError};
pub use extractor::client::{LlmClient, ReqwestLlmClient};
pub use extractor::{ExtractionOutcome, Extractor};
pub use lineage_graph::{build_lineage_graph, LineageGraphReport};
pub use metadata_graph::{build_metadata_graph, MetadataGraphReport};

use std::sync::Arc;

use lineage_store::repo::{PatternStatus, SqlPatternRepo};
use lineage_store::GraphClient;
use sqlx::PgPool;

/// Drives one pattern from `PENDING` through extraction: claim it, assemble
/// its catalog context, call the extractor, and persist the outcome. This
/// is the orchestration glue `lineage-cli`'s `extract` subcommand calls in
/// a loop; it's kept separate from `Extractor` itself so `Extractor` stays
/// unit-testable against a `MockLlmClient` with no database.
pub async fn run_extraction_batch(
    pool: &PgPool,
    extractor: &Extractor,
    cfg: &PipelineConfig,
) -> Result<AggregatorReport, PipelineError> {
    let repo = SqlPatternRepo::new(pool);
    let claimed = repo
        .claim_batch(
            PatternStatus::Pending,
            PatternStatus::InProgress,
            cfg.extractor.max_concurrent_requests as i64 * 4,
        )
        .await?;

    let mut report = AggregatorReport {
        claimed: claimed.len(),
        ..Default::default()
    };

    for pattern in claimed {
        let assembled = assemble_context(pool, &cfg.context, &pattern.normalized_sql, &pattern.source_database)
            .await
            .unwrap_or_default();

        // A transport error (§7 LLMTransport / §5 timeout) only ever affects
        // this one pattern; it's marked FAILED_LLM and the batch continues,
        // rather than propagating via `?` and leaving every other claimed
        // pattern stuck IN_PROGRESS. A store error means the database itself
        // is unreachable, so it still propagates and aborts the batch.
        let outcome = match extractor
            .extract(&pattern.sql_hash, &pattern.source_database, &pattern.normalized_sql, &assembled.render())
            .await
        {
            Ok(outcome) => outcome,
            Err(PipelineError::LlmTransport(e)) => {
                repo.mark_status(&pattern.sql_hash, PatternStatus::FailedLlm, None, Some(&e.to_string()))
                    .await?;
                report.rejected += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        match outcome {
            ExtractionOutcome::Extracted(doc) => {
                repo.save_lineage_document(&pattern.sql_hash, PatternStatus::CompletedSuccess, &doc).await?;
                report.patterns_upserted += 1;
            }
            ExtractionOutcome::NoLineage(doc) => {
                repo.save_lineage_document(&pattern.sql_hash, PatternStatus::CompletedNoLineage, &doc).await?;
                report.rejected += 1;
            }
            ExtractionOutcome::Failed(reason) => {
                // Invalid/schema-violating JSON after the reprompt budget is
                // exhausted is FAILED_PARSE, not FAILED_LLM (§4.4/§7) —
                // FAILED_LLM is reserved for transport/auth/quota failures.
                repo.mark_status(&pattern.sql_hash, PatternStatus::FailedParse, None, Some(&reason))
                    .await?;
                report.rejected += 1;
            }
        }
    }

    Ok(report)
}

/// Builds a `GraphClient` bound to the graph name in `cfg`.
pub fn graph_client(pool: PgPool, cfg: &PipelineConfig) -> GraphClient {
    GraphClient::new(pool, cfg.graph_name.clone())
}

/// Constructs an `Extractor` backed by the real HTTP transport.
pub fn reqwest_extractor(cfg: &PipelineConfig) -> Extractor {
    let client: Arc<dyn LlmClient> = Arc::new(ReqwestLlmClient::new(&cfg.extractor));
    Extractor::new(client, cfg.extractor.clone())
}

//! lineage CLI - scheduler-invoked driver for the query-log lineage
//! pipeline. One subcommand per stage; `run` drives all four in order.

mod cli;
mod config;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use lineage_pipeline::{build_lineage_graph, build_metadata_graph, drain_observations, reqwest_extractor, run_extraction_batch};
use lineage_store::repo::SqlPatternRepo;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use cli::{Args, Command, LogFormat};

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("lineage: failed to start async runtime: {e:#}");
            return ExitCode::from(66);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::PartialFailure) => ExitCode::from(1),
        Err(e) => {
            eprintln!("lineage: error: {e:#}");
            ExitCode::from(66)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let subscriber = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    );
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

/// Whether a stage run completed cleanly or with entity/pattern-level
/// failures that were logged and skipped (§4.5/§4.6) rather than aborting
/// the process. A `PipelineError` propagating out of `run` instead signals
/// a total failure (config or connection error).
enum Outcome {
    Success,
    PartialFailure,
}

async fn run(args: Args) -> Result<Outcome> {
    let cfg = config::load(args.config.as_deref()).context("failed to load pipeline configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await
        .context("failed to connect to the control-plane database")?;

    if matches!(args.command, Command::Migrate) {
        lineage_store::migrate(&pool).await.context("failed to run migrations")?;
        info!("migrations applied");
        return Ok(Outcome::Success);
    }

    let mut partial_failure = false;

    match args.command {
        Command::Migrate => unreachable!("handled above"),
        Command::Aggregate => {
            let report = drain_observations(&pool, &cfg.aggregator).await?;
            info!(?report, "aggregation complete");
        }
        Command::Extract => {
            let extractor = reqwest_extractor(&cfg);
            let report = run_extraction_batch(&pool, &extractor, &cfg).await?;
            info!(?report, "extraction complete");
        }
        Command::BuildMetadataGraph => {
            let graph = lineage_pipeline::graph_client(pool.clone(), &cfg);
            let report = build_metadata_graph(&pool, &graph, &cfg.graph_builder).await?;
            info!(?report, "metadata graph build complete");
            if report.sources_failed > 0 {
                warn!(failed = report.sources_failed, "some data sources failed to project");
                partial_failure = true;
            }
        }
        Command::BuildLineageGraph => {
            let graph = lineage_pipeline::graph_client(pool.clone(), &cfg);
            let report = build_lineage_graph(&pool, &graph, &cfg.graph_builder).await?;
            info!(?report, "lineage graph build complete");
            if report.failed > 0 {
                warn!(failed = report.failed, "some patterns failed to load into the graph");
                partial_failure = true;
            }
        }
        Command::ResetStuck => {
            let reset = SqlPatternRepo::new(&pool).reset_stuck_in_progress().await?;
            info!(reset, "reset stuck patterns to their pre-claim status");
        }
        Command::Run => {
            let report = drain_observations(&pool, &cfg.aggregator).await?;
            info!(?report, "aggregation complete");

            let extractor = reqwest_extractor(&cfg);
            let report = run_extraction_batch(&pool, &extractor, &cfg).await?;
            info!(?report, "extraction complete");

            let graph = lineage_pipeline::graph_client(pool.clone(), &cfg);
            let report = build_metadata_graph(&pool, &graph, &cfg.graph_builder).await?;
            info!(?report, "metadata graph build complete");
            if report.sources_failed > 0 {
                partial_failure = true;
            }

            let report = build_lineage_graph(&pool, &graph, &cfg.graph_builder).await?;
            info!(?report, "lineage graph build complete");
            if report.failed > 0 {
                partial_failure = true;
            }
        }
    }

    Ok(if partial_failure {
        Outcome::PartialFailure
    } else {
        Outcome::Success
    })
}

//! CLI argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// lineage - PostgreSQL query-log lineage extraction pipeline
#[derive(Parser, Debug)]
#[command(name = "lineage")]
#[command(about = "Extract column-level data lineage from PostgreSQL query logs", long_about = None)]
#[command(version)]
pub struct Args {
    /// TOML config file overriding environment-variable defaults
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Structured log output format
    #[arg(long, default_value = "pretty", value_enum, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the embedded control-plane and graph migrations
    Migrate,
    /// Drain raw log observations into fingerprinted sql_patterns rows
    Aggregate,
    /// Claim PENDING patterns and run them through the LLM extractor
    Extract,
    /// Project the catalog metadata tables into the graph store
    BuildMetadataGraph,
    /// Apply extracted lineage documents as graph mutations
    BuildLineageGraph,
    /// Reset patterns stuck IN_PROGRESS / GRAPH_BUILD_IN_PROGRESS after an
    /// ungraceful shutdown
    ResetStuck,
    /// Run aggregate, extract, build-metadata-graph, build-lineage-graph in
    /// order (§2's data-flow order)
    Run,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extract() {
        let args = Args::parse_from(["lineage", "extract"]);
        assert!(matches!(args.command, Command::Extract));
        assert_eq!(args.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_run_with_global_flags() {
        let args = Args::parse_from(["lineage", "--log-format", "json", "--config", "cfg.toml", "run"]);
        assert!(matches!(args.command, Command::Run));
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.config.unwrap().to_str().unwrap(), "cfg.toml");
    }
}

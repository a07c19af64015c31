//! Loads a `lineage_pipeline::PipelineConfig` from environment variables
//! with an optional TOML override file, per the "one explicit config
//! struct, never a global" rule the pipeline crate follows.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use lineage_pipeline::{AggregatorConfig, ContextConfig, ExtractorConfig, GraphBuilderConfig, PipelineConfig};
use serde::Deserialize;

/// Mirrors `PipelineConfig` but with every field optional, so a TOML file
/// only needs to set the values it wants to override.
#[derive(Debug, Default, Deserialize)]
struct FileOverrides {
    database_url: Option<String>,
    graph_name: Option<String>,
    aggregator_batch_size: Option<i64>,
    aggregator_retry_failed: Option<bool>,
    context_max_tokens: Option<usize>,
    extractor_api_base_url: Option<String>,
    extractor_model: Option<String>,
    extractor_max_reprompts: Option<u8>,
    extractor_requests_per_minute: Option<u32>,
    extractor_tokens_per_minute: Option<u32>,
    extractor_max_concurrent_requests: Option<usize>,
    extractor_request_timeout_secs: Option<u64>,
    graph_builder_batch_size: Option<i64>,
}

/// Loads configuration: environment variables first, then `config_path` (if
/// given and present) overrides, then whatever the struct defaults supply.
/// `LINEAGE_DATABASE_URL` and `LINEAGE_LLM_API_KEY` are the only variables
/// required to be set; everything else has a sane default.
pub fn load(config_path: Option<&Path>) -> Result<PipelineConfig> {
    let overrides = match config_path {
        Some(path) if path.exists() => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        _ => FileOverrides::default(),
    };

    let database_url = std::env::var("LINEAGE_DATABASE_URL")
        .ok()
        .or(overrides.database_url)
        .context("LINEAGE_DATABASE_URL must be set (env var or config file)")?;

    let api_key = std::env::var("LINEAGE_LLM_API_KEY").unwrap_or_default();

    let mut extractor = ExtractorConfig::default();
    if let Some(v) = overrides.extractor_api_base_url {
        extractor.api_base_url = v;
    }
    extractor.api_key = api_key;
    if let Some(v) = overrides.extractor_model {
        extractor.model = v;
    }
    if let Some(v) = overrides.extractor_max_reprompts {
        extractor.max_reprompts = v;
    }
    if let Some(v) = overrides.extractor_requests_per_minute {
        extractor.requests_per_minute = v;
    }
    if let Some(v) = overrides.extractor_tokens_per_minute {
        extractor.tokens_per_minute = v;
    }
    if let Some(v) = overrides.extractor_max_concurrent_requests {
        extractor.max_concurrent_requests = v;
    }
    if let Some(v) = overrides.extractor_request_timeout_secs {
        extractor.request_timeout = Duration::from_secs(v);
    }

    let mut aggregator = AggregatorConfig::default();
    if let Some(v) = overrides.aggregator_batch_size {
        aggregator.batch_size = v;
    }
    if let Some(v) = overrides.aggregator_retry_failed {
        aggregator.retry_failed = v;
    }

    let mut context = ContextConfig::default();
    if let Some(v) = overrides.context_max_tokens {
        context.max_context_tokens = v;
    }

    let mut graph_builder = GraphBuilderConfig::default();
    if let Some(v) = overrides.graph_builder_batch_size {
        graph_builder.batch_size = v;
    }

    Ok(PipelineConfig {
        database_url,
        graph_name: overrides.graph_name.unwrap_or_else(|| "lineage_graph".to_string()),
        aggregator,
        context,
        extractor,
        graph_builder,
    })
}

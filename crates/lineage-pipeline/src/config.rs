//! Explicit pipeline configuration. No stage reads environment variables or
//! globals directly — everything flows through a `PipelineConfig` built
//! once at startup and passed by reference into every stage driver.

use std::time::Duration;

/// Configuration for one pipeline run. Constructed by `lineage-cli` from
/// environment variables plus an optional TOML override file and threaded
/// through every stage function.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,
    pub graph_name: String,
    pub aggregator: AggregatorConfig,
    pub context: ContextConfig,
    pub extractor: ExtractorConfig,
    pub graph_builder: GraphBuilderConfig,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub batch_size: i64,
    /// When true, `FAILED_*` patterns are reset to `PENDING` instead of
    /// being left for manual operator review.
    pub retry_failed: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            retry_failed: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Approximate characters per LLM token, used to trim assembled context
    /// to `max_context_tokens` without depending on a real tokenizer.
    pub chars_per_token: f64,
    pub max_context_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            chars_per_token: 4.0,
            max_context_tokens: 6_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_reprompts: u8,
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    /// `parsing_confidence` below this, or an empty `column_level_lineage`,
    /// is recorded as `COMPLETED_NO_LINEAGE` rather than written to the
    /// graph.
    pub min_confidence: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_reprompts: 2,
            requests_per_minute: 60,
            tokens_per_minute: 90_000,
            max_concurrent_requests: 4,
            request_timeout: Duration::from_secs(60),
            min_confidence: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphBuilderConfig {
    pub batch_size: i64,
}

impl Default for GraphBuilderConfig {
    fn default() -> Self {
        Self { batch_size: 200 }
    }
}

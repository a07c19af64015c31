//! LLM extractor: turns one SQL pattern plus its assembled catalog context
//! into a validated `LineageDocument`.
//!
//! Protocol: a system prompt describing the `LineageDocument` schema, a
//! user prompt carrying the normalized SQL and context, temperature 0 for
//! determinism, fenced-code-block stripping on the response, and up to
//! `max_reprompts` additional attempts (each appending the validation
//! failure to the conversation) before giving up. A response with
//! `parsing_confidence` below the configured floor or no column lineage is
//! still accepted, but is recorded as `COMPLETED_NO_LINEAGE` rather than
//! written to the graph.

pub mod client;
pub mod mock;
pub mod rate_limit;

use std::sync::Arc;

use lineage_core::lineage_doc::LineageDocument;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::error::PipelineError;
use client::{ChatMessage, ChatRequest, LlmClient};
use rate_limit::RateLimiter;

/// Bounds how many extraction calls run concurrently and how fast they're
/// issued, independent of how many patterns the caller hands in at once.
pub struct Extractor {
    client: Arc<dyn LlmClient>,
    limiter: RateLimiter,
    semaphore: Semaphore,
    cfg: ExtractorConfig,
}

/// Outcome of extracting lineage for a single pattern.
pub enum ExtractionOutcome {
    Extracted(LineageDocument),
    NoLineage(LineageDocument),
    Failed(String),
}

impl Extractor {
    pub fn new(client: Arc<dyn LlmClient>, cfg: ExtractorConfig) -> Self {
        let limiter = RateLimiter::new(cfg.requests_per_minute, cfg.tokens_per_minute);
        let semaphore = Semaphore::new(cfg.max_concurrent_requests);
        Self {
            client,
            limiter,
            semaphore,
            cfg,
        }
    }

    #[tracing::instrument(skip(self, normalized_sql, context))]
    pub async fn extract(
        &self,
        sql_hash: &str,
        source_database: &str,
        normalized_sql: &str,
        context: &str,
    ) -> Result<ExtractionOutcome, PipelineError> {
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

        let mut messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: system_prompt(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user_prompt(sql_hash, source_database, normalized_sql, context),
            },
        ];

        let mut last_error = String::new();
        for attempt in 0..=self.cfg.max_reprompts {
            self.limiter.acquire(estimate_tokens(&messages)).await;

            let request = ChatRequest {
                model: self.cfg.model.clone(),
                messages: messages.clone(),
                temperature: 0.0,
            };
            let response = self.client.complete(request).await?;
            let raw = response.first_content().unwrap_or_default();
            let stripped = strip_fenced_code(raw);

            match serde_json::from_str::<LineageDocument>(&stripped)
                .map_err(|e| e.to_string())
                .and_then(|doc| doc.validate().map(|_| doc).map_err(|e| e.to_string()))
            {
                Ok(doc) if doc.is_empty_result() => {
                    debug!(sql_hash, attempt, "extraction produced no usable lineage");
                    return Ok(ExtractionOutcome::NoLineage(doc));
                }
                Ok(doc) => {
                    debug!(sql_hash, attempt, "extraction succeeded");
                    return Ok(ExtractionOutcome::Extracted(doc));
                }
                Err(e) => {
                    warn!(sql_hash, attempt, error = %e, "schema validation failed");
                    last_error = e.clone();
                    messages.push(ChatMessage {
                        role: "assistant".to_string(),
                        content: raw.to_string(),
                    });
                    messages.push(ChatMessage {
                        role: "user".to_string(),
                        content: format!(
                            "That response failed schema validation: {e}. Reply again with only the corrected JSON document."
                        ),
                    });
                }
            }
        }

        Ok(ExtractionOutcome::Failed(last_error))
    }
}

fn system_prompt() -> String {
    "You extract column-level data lineage from a single PostgreSQL statement. \
     Respond with exactly one JSON object matching the LineageDocument schema: \
     sql_pattern_hash, source_database_name, target_object, column_level_lineage, \
     referenced_objects, parsing_confidence. Each column_level_lineage entry's \
     derivation_type must be one of DIRECT_MAPPING, FUNCTION_CALL, AGGREGATION, \
     UNION_MERGE, CONDITIONAL_LOGIC, LITERAL_ASSIGNMENT, EXPRESSION; a source's \
     source_column is null only for LITERAL_ASSIGNMENT. object_type is TABLE, \
     VIEW, or TEMP_TABLE; access_mode is READ or WRITE. No prose, no markdown fences."
        .to_string()
}

fn user_prompt(sql_hash: &str, source_database: &str, normalized_sql: &str, context: &str) -> String {
    format!(
        "sql_pattern_hash: {sql_hash}\nsource_database_name: {source_database}\n\nSQL:\n{normalized_sql}\n\nSchema context:\n{context}"
    )
}

/// Strips a single leading/trailing fenced code block (```` ```json ... ``` ````
/// or plain ``` ```) around the model's response, if present.
fn strip_fenced_code(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(body) = rest.strip_suffix("```") {
            return body.trim().to_string();
        }
    }
    trimmed.to_string()
}

fn estimate_tokens(messages: &[ChatMessage]) -> u32 {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    (chars / 4).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::MockLlmClient;

    fn valid_document_json() -> String {
        serde_json::json!({
            "sql_pattern_hash": "abc",
            "source_database_name": "db",
            "target_object": {"schema": "public", "name": "t", "type": "TABLE"},
            "column_level_lineage": [{
                "target_column": "x",
                "target_object_name": "t",
                "target_object_schema": "public",
                "derivation_type": "DIRECT_MAPPING",
                "sources": [{
                    "source_object": {"schema": "public", "name": "s", "type": "TABLE"},
                    "source_column": "y",
                    "transformation_logic": "passthrough"
                }]
            }],
            "referenced_objects": [
                {"schema": "public", "name": "t", "type": "TABLE", "access_mode": "WRITE"},
                {"schema": "public", "name": "s", "type": "TABLE", "access_mode": "READ"}
            ],
            "parsing_confidence": 0.9
        })
        .to_string()
    }

    #[test]
    fn test_strip_fenced_code_json_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_fenced_code(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fenced_code_plain_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_fenced_code(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fenced_code_no_fence() {
        assert_eq!(strip_fenced_code("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_extract_succeeds_first_try() {
        let client = Arc::new(MockLlmClient::new(vec![valid_document_json()]));
        let extractor = Extractor::new(client.clone(), ExtractorConfig::default());
        let outcome = extractor
            .extract("abc", "db", "select 1", "")
            .await
            .unwrap();
        assert!(matches!(outcome, ExtractionOutcome::Extracted(_)));
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_extract_reprompts_on_invalid_json() {
        let client = Arc::new(MockLlmClient::new(vec![
            "not json".to_string(),
            valid_document_json(),
        ]));
        let extractor = Extractor::new(client.clone(), ExtractorConfig::default());
        let outcome = extractor
            .extract("abc", "db", "select 1", "")
            .await
            .unwrap();
        assert!(matches!(outcome, ExtractionOutcome::Extracted(_)));
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_extract_fails_after_budget_exhausted() {
        let client = Arc::new(MockLlmClient::new(vec!["still not json".to_string()]));
        let mut cfg = ExtractorConfig::default();
        cfg.max_reprompts = 1;
        let extractor = Extractor::new(client.clone(), cfg);
        let outcome = extractor
            .extract("abc", "db", "select 1", "")
            .await
            .unwrap();
        assert!(matches!(outcome, ExtractionOutcome::Failed(_)));
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_extract_low_confidence_is_no_lineage() {
        let doc = serde_json::json!({
            "sql_pattern_hash": "abc",
            "source_database_name": "db",
            "column_level_lineage": [],
            "referenced_objects": [],
            "parsing_confidence": 0.05
        })
        .to_string();
        let client = Arc::new(MockLlmClient::new(vec![doc]));
        let extractor = Extractor::new(client, ExtractorConfig::default());
        let outcome = extractor
            .extract("abc", "db", "select 1", "")
            .await
            .unwrap();
        assert!(matches!(outcome, ExtractionOutcome::NoLineage(_)));
    }
}

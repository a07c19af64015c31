//! Error types for the pipeline's async stage drivers.

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] lineage_store::StoreError),
    #[error("LLM transport error: {0}")]
    LlmTransport(#[from] LlmTransportError),
    #[error("LLM response failed schema validation after {attempts} attempt(s): {last_error}")]
    SchemaViolation { attempts: u8, last_error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LlmTransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM endpoint returned status {status}: {body}")]
    BadStatus { status: u16, body: String },
    #[error("response body was not valid JSON: {0}")]
    InvalidJson(String),
}

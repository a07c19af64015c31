//! Relational control-plane repositories and the Apache AGE graph client
//! backing the lineage pipeline. All I/O for the pipeline lives here;
//! `lineage-core` stays pure.

pub mod error;
pub mod graph;
pub mod repo;
pub mod seams;

pub use error::{StoreError, StoreResult};
pub use graph::{GraphClient, Props};
pub use repo::{LogObservationRepo, MetadataRepo, PatternStatus, SqlPattern, SqlPatternRepo};
pub use seams::{CatalogMetadataSource, GraphReadHandle, LogObservationSource};

/// Run the embedded control-plane and graph migrations against `pool`.
pub async fn migrate(pool: &sqlx::PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

//! Boundaries to collaborators this crate does not implement: the catalog
//! collector that populates `data_sources`/`object_metadata`/
//! `column_metadata`/`function_metadata`, the log collector that populates
//! `raw_log_observations`, and the HTTP query API that would read the graph.
//! Expressed as traits/type aliases so the pipeline depends on a contract
//! rather than a concrete collector implementation, none of which exists in
//! this workspace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::StoreResult;
use crate::repo::metadata::{ColumnInfo, DataSourceInfo, FunctionInfo, MetadataRepo, ObjectInfo};
use crate::repo::observation::{LogObservationRepo, RawObservation};

/// Read-only view over whatever the catalog collector has written. The
/// pipeline's context assembler and metadata graph builder depend on this
/// trait, not on `MetadataRepo` directly, so a different catalog source
/// could be substituted without touching either.
#[async_trait]
pub trait CatalogMetadataSource: Send + Sync {
    async fn data_sources(&self) -> StoreResult<Vec<DataSourceInfo>>;
    async fn search_path(&self, database_name: &str) -> StoreResult<Vec<String>>;
    async fn find_object(
        &self,
        database_name: &str,
        schema_name: &str,
        object_name: &str,
    ) -> StoreResult<Option<ObjectInfo>>;
    async fn objects_for_source(&self, source_id: i64) -> StoreResult<Vec<ObjectInfo>>;
    async fn functions_for_source(&self, source_id: i64) -> StoreResult<Vec<FunctionInfo>>;
    async fn columns_for_object_id(&self, object_id: i64) -> StoreResult<Vec<ColumnInfo>>;
}

#[async_trait]
impl<'a> CatalogMetadataSource for MetadataRepo<'a> {
    async fn data_sources(&self) -> StoreResult<Vec<DataSourceInfo>> {
        MetadataRepo::data_sources(self).await
    }

    async fn search_path(&self, database_name: &str) -> StoreResult<Vec<String>> {
        MetadataRepo::search_path(self, database_name).await
    }

    async fn find_object(
        &self,
        database_name: &str,
        schema_name: &str,
        object_name: &str,
    ) -> StoreResult<Option<ObjectInfo>> {
        MetadataRepo::find_object(self, database_name, schema_name, object_name).await
    }

    async fn objects_for_source(&self, source_id: i64) -> StoreResult<Vec<ObjectInfo>> {
        MetadataRepo::objects_for_source(self, source_id).await
    }

    async fn functions_for_source(&self, source_id: i64) -> StoreResult<Vec<FunctionInfo>> {
        MetadataRepo::functions_for_source(self, source_id).await
    }

    async fn columns_for_object_id(&self, object_id: i64) -> StoreResult<Vec<ColumnInfo>> {
        MetadataRepo::columns_for_object_id(self, object_id).await
    }
}

/// Read-only view over whatever the log collector has written to
/// `raw_log_observations`. The aggregator depends on this trait rather than
/// on `LogObservationRepo` directly.
#[async_trait]
pub trait LogObservationSource: Send + Sync {
    async fn claim_batch(&self, batch_size: i64) -> StoreResult<Vec<RawObservation>>;
    async fn mark_processed(&self, id: i64, sql_hash: Option<&str>) -> StoreResult<()>;
    async fn record_normalization_error(
        &self,
        raw_sql_text: &str,
        source_database: &str,
        reason: &str,
        observed_at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

#[async_trait]
impl<'a> LogObservationSource for LogObservationRepo<'a> {
    async fn claim_batch(&self, batch_size: i64) -> StoreResult<Vec<RawObservation>> {
        LogObservationRepo::claim_batch(self, batch_size).await
    }

    async fn mark_processed(&self, id: i64, sql_hash: Option<&str>) -> StoreResult<()> {
        LogObservationRepo::mark_processed(self, id, sql_hash).await
    }

    async fn record_normalization_error(
        &self,
        raw_sql_text: &str,
        source_database: &str,
        reason: &str,
        observed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        LogObservationRepo::record_normalization_error(
            self,
            raw_sql_text,
            source_database,
            reason,
            observed_at,
        )
        .await
    }
}

/// Seam the out-of-scope HTTP query API would consume: a connection plus
/// the graph name it should run read queries against. No HTTP routes are
/// implemented here; this is the handle such routes would be built on.
#[derive(Clone)]
pub struct GraphReadHandle {
    pub pool: PgPool,
    pub graph_name: String,
}

impl GraphReadHandle {
    pub fn new(pool: PgPool, graph_name: impl Into<String>) -> Self {
        Self {
            pool,
            graph_name: graph_name.into(),
        }
    }
}

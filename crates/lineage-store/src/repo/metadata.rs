//! Read-side repository over the catalog metadata tables (`data_sources`,
//! `object_metadata`, `column_metadata`, `function_metadata`). Populated by
//! the out-of-scope catalog collector; the pipeline reads these to resolve
//! identifiers during context assembly and to project structural nodes in
//! the metadata graph builder.

use sqlx::PgPool;

use crate::error::StoreResult;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub ordinal_position: i32,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub fk_schema: Option<String>,
    pub fk_table: Option<String>,
    pub fk_column: Option<String>,
    pub fk_constraint_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ObjectInfo {
    pub id: i64,
    pub schema_name: String,
    pub object_name: String,
    pub object_type: String,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub definition_sql: Option<String>,
    pub row_count_estimate: Option<i64>,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FunctionInfo {
    pub schema_name: String,
    pub function_name: String,
    pub function_type: String,
    pub parameter_type_list: String,
    pub return_type: Option<String>,
    pub body_sql: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DataSourceInfo {
    pub id: i64,
    pub source_name: String,
    pub database_name: String,
    pub search_path: Vec<String>,
}

pub struct MetadataRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> MetadataRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn search_path(&self, database_name: &str) -> StoreResult<Vec<String>> {
        let row: Option<(Vec<String>,)> =
            sqlx::query_as("select search_path from data_sources where database_name = $1")
                .bind(database_name)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(|(p,)| p).unwrap_or_else(|| vec!["public".to_string()]))
    }

    pub async fn data_sources(&self) -> StoreResult<Vec<DataSourceInfo>> {
        let rows = sqlx::query_as::<_, DataSourceInfo>(
            "select id, source_name, database_name, search_path from data_sources order by id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Resolves the `source_name` a raw log's `database_name` belongs to,
    /// for building the `Database` FQN (`{source_name}.{db_name}`, §3) from
    /// a `LineageDocument`, which only ever carries the bare database name.
    /// Falls back to `database_name` itself when no data source is
    /// registered yet, so a lineage edge is never blocked on catalog
    /// collector lag (§9 catalog-drift policy).
    pub async fn source_name_for_database(&self, database_name: &str) -> StoreResult<String> {
        let row: Option<(String,)> =
            sqlx::query_as("select source_name from data_sources where database_name = $1 order by id limit 1")
                .bind(database_name)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(|(s,)| s).unwrap_or_else(|| database_name.to_string()))
    }

    pub async fn find_object(
        &self,
        database_name: &str,
        schema_name: &str,
        object_name: &str,
    ) -> StoreResult<Option<ObjectInfo>> {
        let row = sqlx::query_as::<_, ObjectInfo>(
            r#"
            select id, schema_name, object_name, object_type, owner, description,
                   definition_sql, row_count_estimate, properties
            from object_metadata
            where database_name = $1 and schema_name = $2 and object_name = $3
            "#,
        )
        .bind(database_name)
        .bind(schema_name)
        .bind(object_name)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn objects_for_source(&self, source_id: i64) -> StoreResult<Vec<ObjectInfo>> {
        let rows = sqlx::query_as::<_, ObjectInfo>(
            r#"
            select id, schema_name, object_name, object_type, owner, description,
                   definition_sql, row_count_estimate, properties
            from object_metadata
            where source_id = $1
            order by schema_name, object_name
            "#,
        )
        .bind(source_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn functions_for_source(&self, source_id: i64) -> StoreResult<Vec<FunctionInfo>> {
        let rows = sqlx::query_as::<_, FunctionInfo>(
            r#"
            select schema_name, function_name, function_type, parameter_type_list,
                   return_type, body_sql, language, description
            from function_metadata
            where source_id = $1
            order by schema_name, function_name
            "#,
        )
        .bind(source_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn columns_for_object(
        &self,
        database_name: &str,
        schema_name: &str,
        object_name: &str,
    ) -> StoreResult<Vec<ColumnInfo>> {
        let rows = sqlx::query_as::<_, ColumnInfo>(
            r#"
            select cm.column_name, cm.data_type, cm.ordinal_position, cm.is_nullable,
                   cm.column_default, cm.is_primary_key, cm.is_unique,
                   cm.fk_schema, cm.fk_table, cm.fk_column, cm.fk_constraint_name,
                   cm.description
            from column_metadata cm
            join object_metadata om on om.id = cm.object_id
            where om.database_name = $1 and om.schema_name = $2 and om.object_name = $3
            order by cm.ordinal_position
            "#,
        )
        .bind(database_name)
        .bind(schema_name)
        .bind(object_name)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn columns_for_object_id(&self, object_id: i64) -> StoreResult<Vec<ColumnInfo>> {
        let rows = sqlx::query_as::<_, ColumnInfo>(
            r#"
            select column_name, data_type, ordinal_position, is_nullable,
                   column_default, is_primary_key, is_unique,
                   fk_schema, fk_table, fk_column, fk_constraint_name, description
            from column_metadata
            where object_id = $1
            order by ordinal_position
            "#,
        )
        .bind(object_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

//! Metadata graph builder: projects the relational catalog tables
//! (`data_sources`, `object_metadata`, `column_metadata`, `function_metadata`)
//! into AGE as `Database` / `Schema` / `Table`|`View`|`MaterializedView` /
//! `Column` / `Function` vertices connected by `HAS_SCHEMA` / `HAS_OBJECT` /
//! `HAS_COLUMN` / `HAS_FUNCTION` containment edges and `REFERENCES_COLUMN`
//! foreign-key edges (§3, §4.5).
//!
//! Runs one transaction per data source, iterating Database → Schema →
//! Object → Column → Function → FK in that fixed order (§4.5), so a failure
//! partway through one database's catalog never leaves another database's
//! projection half-written. The lineage graph builder converges on the same
//! vertices by fully-qualified name — no locking is needed between the two
//! builders because each only ever creates a vertex it doesn't find, and
//! structural attributes (owner, description, definition, row count) are
//! only ever written here via `set_props`, never by the lineage builder.

use std::collections::HashMap;

use chrono::Utc;
use lineage_store::graph::{GraphClient, Props};
use lineage_store::repo::metadata::{ColumnInfo, MetadataRepo, ObjectInfo};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{error, info};

use crate::config::GraphBuilderConfig;
use crate::error::PipelineError;

#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataGraphReport {
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub objects_upserted: usize,
    pub columns_upserted: usize,
    pub functions_upserted: usize,
}

/// Maps an `object_type` catalog string to the graph's `kind` property and
/// vertex label (§3: "stored with a `kind` property carrying the specific
/// label").
fn object_label(object_type: &str) -> &'static str {
    match object_type.to_ascii_uppercase().as_str() {
        "VIEW" => "View",
        "MATERIALIZED_VIEW" => "MaterializedView",
        _ => "Table",
    }
}

#[tracing::instrument(skip(pool, graph, _cfg))]
pub async fn build_metadata_graph(
    pool: &PgPool,
    graph: &GraphClient,
    _cfg: &GraphBuilderConfig,
) -> Result<MetadataGraphReport, PipelineError> {
    let metadata = MetadataRepo::new(pool);
    let sources = metadata.data_sources().await?;

    let mut report = MetadataGraphReport::default();

    for source in sources {
        match project_source(pool, graph, &metadata, &source.source_name, &source.database_name, source.id).await {
            Ok((objects, columns, functions)) => {
                report.sources_processed += 1;
                report.objects_upserted += objects;
                report.columns_upserted += columns;
                report.functions_upserted += functions;
                info!(source = %source.source_name, database = %source.database_name, "metadata graph projected");
            }
            Err(e) => {
                // §9 entity-level failure policy: a catalog projection
                // failure is logged and skipped, never a process abort —
                // other data sources still get refreshed.
                error!(source = %source.source_name, error = %e, "failed to project metadata graph for data source");
                report.sources_failed += 1;
            }
        }
    }

    Ok(report)
}

async fn project_source(
    pool: &PgPool,
    graph: &GraphClient,
    metadata: &MetadataRepo<'_>,
    source_name: &str,
    database_name: &str,
    source_id: i64,
) -> Result<(usize, usize, usize), PipelineError> {
    let objects = metadata.objects_for_source(source_id).await?;
    let functions = metadata.functions_for_source(source_id).await?;

    let mut txn = pool.begin().await.map_err(lineage_store::StoreError::from)?;
    let now = Utc::now();

    let db_fqn = format!("{source_name}.{database_name}");
    let mut db_create = Props::new();
    db_create.insert("name".to_string(), Value::from(database_name.to_string()));
    db_create.insert("source_name".to_string(), Value::from(source_name.to_string()));
    db_create.insert("created_at".to_string(), Value::from(now.to_rfc3339()));
    let mut db_set = Props::new();
    db_set.insert("updated_at".to_string(), Value::from(now.to_rfc3339()));
    graph
        .upsert_vertex(&mut txn, "Database", "fqn", &db_fqn, &db_create, &db_set)
        .await?;

    let mut schema_fqns: HashMap<String, String> = HashMap::new();
    let mut object_count = 0usize;
    let mut column_count = 0usize;

    // object_id -> (schema_name, object_name, column fqn by name), used to
    // resolve FK targets after every object/column vertex exists.
    let mut object_index: HashMap<i64, (String, String)> = HashMap::new();

    for object in &objects {
        let schema_fqn = schema_fqns
            .entry(object.schema_name.clone())
            .or_insert_with(|| format!("{db_fqn}.{}", object.schema_name))
            .clone();

        let mut schema_create = Props::new();
        schema_create.insert("name".to_string(), Value::from(object.schema_name.clone()));
        schema_create.insert("created_at".to_string(), Value::from(now.to_rfc3339()));
        let mut schema_set = Props::new();
        schema_set.insert("updated_at".to_string(), Value::from(now.to_rfc3339()));
        graph
            .upsert_vertex(&mut txn, "Schema", "fqn", &schema_fqn, &schema_create, &schema_set)
            .await?;
        graph
            .upsert_edge(
                &mut txn,
                "HAS_SCHEMA",
                "fqn",
                &db_fqn,
                "fqn",
                &schema_fqn,
                &Props::new(),
                &Props::new(),
                &Props::new(),
            )
            .await?;

        let object_fqn = format!("{schema_fqn}.{}", object.object_name);
        upsert_object_vertex(graph, &mut txn, &object_fqn, object, now).await?;
        graph
            .upsert_edge(
                &mut txn,
                "HAS_OBJECT",
                "fqn",
                &schema_fqn,
                "fqn",
                &object_fqn,
                &Props::new(),
                &Props::new(),
                &Props::new(),
            )
            .await?;
        object_count += 1;
        object_index.insert(object.id, (object_fqn.clone(), object.object_name.clone()));

        let columns = metadata.columns_for_object_id(object.id).await?;
        for column in &columns {
            let column_fqn = format!("{object_fqn}.{}", column.column_name);
            upsert_column_vertex(graph, &mut txn, &column_fqn, column, now).await?;
            graph
                .upsert_edge(
                    &mut txn,
                    "HAS_COLUMN",
                    "fqn",
                    &object_fqn,
                    "fqn",
                    &column_fqn,
                    &Props::new(),
                    &Props::new(),
                    &Props::new(),
                )
                .await?;
            column_count += 1;
        }
    }

    // Foreign keys reference (schema, table, column) directly rather than
    // an object id, so resolve them against already-created column FQNs in
    // a second pass once every column in this source exists.
    for object in &objects {
        let Some((object_fqn, _)) = object_index.get(&object.id) else {
            continue;
        };
        let columns = metadata.columns_for_object_id(object.id).await?;
        for column in &columns {
            let (Some(fk_schema), Some(fk_table), Some(fk_column)) =
                (&column.fk_schema, &column.fk_table, &column.fk_column)
            else {
                continue;
            };
            let from_fqn = format!("{object_fqn}.{}", column.column_name);
            let to_fqn = format!("{db_fqn}.{fk_schema}.{fk_table}.{fk_column}");
            let mut edge_set = Props::new();
            if let Some(name) = &column.fk_constraint_name {
                edge_set.insert("constraint_name".to_string(), Value::from(name.clone()));
            }
            graph
                .upsert_edge(
                    &mut txn,
                    "REFERENCES_COLUMN",
                    "fqn",
                    &from_fqn,
                    "fqn",
                    &to_fqn,
                    &Props::new(),
                    &Props::new(),
                    &edge_set,
                )
                .await?;
        }
    }

    let mut function_count = 0usize;
    for function in &functions {
        let schema_fqn = schema_fqns
            .entry(function.schema_name.clone())
            .or_insert_with(|| format!("{db_fqn}.{}", function.schema_name))
            .clone();
        let mut schema_create = Props::new();
        schema_create.insert("name".to_string(), Value::from(function.schema_name.clone()));
        schema_create.insert("created_at".to_string(), Value::from(now.to_rfc3339()));
        let mut schema_set = Props::new();
        schema_set.insert("updated_at".to_string(), Value::from(now.to_rfc3339()));
        graph
            .upsert_vertex(&mut txn, "Schema", "fqn", &schema_fqn, &schema_create, &schema_set)
            .await?;

        let function_fqn = format!(
            "{schema_fqn}.{}({})",
            function.function_name, function.parameter_type_list
        );
        let mut fn_create = Props::new();
        fn_create.insert("name".to_string(), Value::from(function.function_name.clone()));
        fn_create.insert("function_type".to_string(), Value::from(function.function_type.clone()));
        fn_create.insert("created_at".to_string(), Value::from(now.to_rfc3339()));
        let mut fn_set = Props::new();
        fn_set.insert("updated_at".to_string(), Value::from(now.to_rfc3339()));
        if let Some(v) = &function.return_type {
            fn_set.insert("return_type".to_string(), Value::from(v.clone()));
        }
        if let Some(v) = &function.body_sql {
            fn_set.insert("definition".to_string(), Value::from(v.clone()));
        }
        if let Some(v) = &function.language {
            fn_set.insert("language".to_string(), Value::from(v.clone()));
        }
        if let Some(v) = &function.description {
            fn_set.insert("description".to_string(), Value::from(v.clone()));
        }
        graph
            .upsert_vertex(&mut txn, "Function", "fqn", &function_fqn, &fn_create, &fn_set)
            .await?;
        graph
            .upsert_edge(
                &mut txn,
                "HAS_FUNCTION",
                "fqn",
                &schema_fqn,
                "fqn",
                &function_fqn,
                &Props::new(),
                &Props::new(),
                &Props::new(),
            )
            .await?;
        function_count += 1;
    }

    txn.commit().await.map_err(lineage_store::StoreError::from)?;
    Ok((object_count, column_count, function_count))
}

async fn upsert_object_vertex(
    graph: &GraphClient,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    object_fqn: &str,
    object: &ObjectInfo,
    now: chrono::DateTime<Utc>,
) -> Result<bool, PipelineError> {
    let label = object_label(&object.object_type);
    let mut create_props = Props::new();
    create_props.insert("name".to_string(), Value::from(object.object_name.clone()));
    create_props.insert("kind".to_string(), Value::from(label.to_string()));
    create_props.insert("created_at".to_string(), Value::from(now.to_rfc3339()));

    let mut set_props = Props::new();
    set_props.insert("updated_at".to_string(), Value::from(now.to_rfc3339()));
    if let Some(owner) = &object.owner {
        set_props.insert("owner".to_string(), Value::from(owner.clone()));
    }
    if let Some(description) = &object.description {
        set_props.insert("description".to_string(), Value::from(description.clone()));
    }
    if let Some(definition) = &object.definition_sql {
        set_props.insert("definition".to_string(), Value::from(definition.clone()));
    }
    if let Some(row_count) = object.row_count_estimate {
        set_props.insert("row_count_estimate".to_string(), Value::from(row_count));
    }
    if object.properties != Value::Null {
        set_props.insert("properties".to_string(), object.properties.clone());
    }

    Ok(graph
        .upsert_vertex(txn, label, "fqn", object_fqn, &create_props, &set_props)
        .await?)
}

async fn upsert_column_vertex(
    graph: &GraphClient,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    column_fqn: &str,
    column: &ColumnInfo,
    now: chrono::DateTime<Utc>,
) -> Result<bool, PipelineError> {
    let mut create_props = Props::new();
    create_props.insert("name".to_string(), Value::from(column.column_name.clone()));
    create_props.insert("ordinal_position".to_string(), Value::from(column.ordinal_position));
    create_props.insert("created_at".to_string(), Value::from(now.to_rfc3339()));

    let mut set_props = Props::new();
    set_props.insert("updated_at".to_string(), Value::from(now.to_rfc3339()));
    set_props.insert("data_type".to_string(), Value::from(column.data_type.clone()));
    set_props.insert("is_nullable".to_string(), Value::from(column.is_nullable));
    set_props.insert("is_primary_key".to_string(), Value::from(column.is_primary_key));
    set_props.insert("is_unique".to_string(), Value::from(column.is_unique));
    if let Some(default) = &column.column_default {
        set_props.insert("column_default".to_string(), Value::from(default.clone()));
    }
    if let Some(description) = &column.description {
        set_props.insert("description".to_string(), Value::from(description.clone()));
    }

    Ok(graph
        .upsert_vertex(txn, "Column", "fqn", column_fqn, &create_props, &set_props)
        .await?)
}

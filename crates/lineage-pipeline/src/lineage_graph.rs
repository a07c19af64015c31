//! Lineage graph builder: turns each extracted pattern's `LineageDocument`
//! into `DATA_FLOW` edges between column vertices, `GENERATES_FLOW` edges
//! from the `SqlPattern` node, and `READS_FROM` / `WRITES_TO` edges from the
//! pattern to the objects it touches — converging on the same
//! fully-qualified-name vertices the metadata graph builder creates (§3,
//! §4.6).
//!
//! Per pattern: claim it (`FOR UPDATE SKIP LOCKED`, `COMPLETED_SUCCESS ∧
//! loaded_to_graph=false` → `GRAPH_BUILD_IN_PROGRESS`), materialise every
//! referenced object/column endpoint before any edge is written (§4.6 step
//! 1 ordering rule), then apply steps 2-5 in one transaction, then resolve
//! the claim: `loaded_to_graph = true` on success, or `graph_load_error` set
//! and the flag left `false` on failure (§4.6 contract, §9 catalog-drift
//! policy — a missing catalog object never fails the pattern, it gets a
//! `TempTable`/`TempColumn` stub instead).

use chrono::{DateTime, Utc};
use lineage_core::lineage_doc::{AccessMode, ColumnLineage, LineageDocument, ObjectType, ReferencedObject};
use lineage_store::graph::{GraphClient, Props};
use lineage_store::repo::metadata::MetadataRepo;
use lineage_store::repo::{PatternStatus, SqlPattern, SqlPatternRepo};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{error, info};

use crate::config::GraphBuilderConfig;
use crate::error::PipelineError;

#[derive(Debug, Default, Clone, Copy)]
pub struct LineageGraphReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}

#[tracing::instrument(skip(pool, graph, cfg))]
pub async fn build_lineage_graph(
    pool: &PgPool,
    graph: &GraphClient,
    cfg: &GraphBuilderConfig,
) -> Result<LineageGraphReport, PipelineError> {
    let repo = SqlPatternRepo::new(pool);
    let patterns = repo.claim_unloaded_batch(cfg.batch_size).await?;

    let mut report = LineageGraphReport {
        claimed: patterns.len(),
        ..Default::default()
    };

    for pattern in patterns {
        let Some(document) = pattern.lineage_document.clone() else {
            error!(sql_hash = %pattern.sql_hash, "pattern claimed as COMPLETED_SUCCESS has no lineage_document");
            repo.resolve_graph_build(&pattern.sql_hash, false, Some("missing lineage_document"))
                .await?;
            report.failed += 1;
            continue;
        };

        match apply_document(pool, graph, &pattern, &document).await {
            Ok(()) => {
                repo.resolve_graph_build(&pattern.sql_hash, true, None).await?;
                report.completed += 1;
                info!(sql_hash = %pattern.sql_hash, "lineage graph updated");
            }
            Err(e) => {
                error!(sql_hash = %pattern.sql_hash, error = %e, "failed to apply lineage document");
                repo.resolve_graph_build(&pattern.sql_hash, false, Some(&e.to_string()))
                    .await?;
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

async fn apply_document(
    pool: &PgPool,
    graph: &GraphClient,
    pattern: &SqlPattern,
    document: &LineageDocument,
) -> Result<(), PipelineError> {
    let sql_hash = pattern.sql_hash.as_str();
    let now = Utc::now();
    let metadata = MetadataRepo::new(pool);
    let source_name = metadata.source_name_for_database(&document.source_database_name).await?;
    let db_fqn = format!("{source_name}.{}", document.source_database_name);

    let mut txn = pool.begin().await.map_err(lineage_store::StoreError::from)?;

    // Step 1: endpoint materialisation, strictly before any edge write.
    for column in &document.column_level_lineage {
        ensure_object_and_column(
            &metadata,
            graph,
            &mut txn,
            &db_fqn,
            &column.target_object_schema,
            &column.target_object_name,
            ObjectType::Table,
            Some(&column.target_column),
        )
        .await?;
        for source in &column.sources {
            ensure_object_and_column(
                &metadata,
                graph,
                &mut txn,
                &db_fqn,
                &source.source_object.schema,
                &source.source_object.name,
                source.source_object.object_type,
                source.source_column.as_deref(),
            )
            .await?;
        }
    }
    for referenced in &document.referenced_objects {
        ensure_object_and_column(
            &metadata,
            graph,
            &mut txn,
            &db_fqn,
            &referenced.schema,
            &referenced.name,
            referenced.object_type,
            None,
        )
        .await?;
    }

    // Step 2: pattern node, keyed by sql_hash (§3). Sample SQL, statistics,
    // and `last_seen_at` are updated every run; `created_at` only on create.
    let mut pattern_create = Props::new();
    pattern_create.insert("sql_hash".to_string(), Value::from(sql_hash.to_string()));
    pattern_create.insert("created_at".to_string(), Value::from(now.to_rfc3339()));
    let mut pattern_set = Props::new();
    pattern_set.insert("sample_sql".to_string(), Value::from(pattern.sample_raw_sql.clone()));
    pattern_set.insert("occurrence_count".to_string(), Value::from(pattern.occurrence_count));
    pattern_set.insert("last_seen_at".to_string(), Value::from(now.to_rfc3339()));
    graph
        .upsert_vertex(&mut txn, "SqlPattern", "sql_hash", sql_hash, &pattern_create, &pattern_set)
        .await?;

    // Steps 2-3: DATA_FLOW edges, one per (target column, source) pair.
    for column in &document.column_level_lineage {
        write_data_flow_edges(graph, &mut txn, &db_fqn, sql_hash, now, column).await?;
    }

    // Step 5: READS_FROM / WRITES_TO from the pattern to referenced objects.
    for referenced in &document.referenced_objects {
        write_access_edge(graph, &mut txn, &db_fqn, sql_hash, now, referenced).await?;
    }

    txn.commit().await.map_err(lineage_store::StoreError::from)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn ensure_object_and_column(
    metadata: &MetadataRepo<'_>,
    graph: &GraphClient,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    db_fqn: &str,
    schema: &str,
    object_name: &str,
    object_type: ObjectType,
    column_name: Option<&str>,
) -> Result<(), PipelineError> {
    let db_database_name = db_fqn.rsplit_once('.').map(|(_, d)| d).unwrap_or(db_fqn);
    let catalog_object = metadata.find_object(db_database_name, schema, object_name).await?;

    let resolved_type = catalog_object.as_ref().map(|o| o.object_type.clone());
    let is_temp = object_type == ObjectType::TempTable || catalog_object.is_none();
    let object_label = if is_temp {
        "TempTable"
    } else {
        match resolved_type.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("VIEW") => "View",
            Some("MATERIALIZED_VIEW") => "MaterializedView",
            _ => "Table",
        }
    };

    let schema_fqn = format!("{db_fqn}.{schema}");
    let object_fqn = format!("{schema_fqn}.{object_name}");

    let mut object_create = Props::new();
    object_create.insert("name".to_string(), Value::from(object_name.to_string()));
    object_create.insert("sourced_by".to_string(), Value::from("lineage"));
    if is_temp {
        object_create.insert("kind".to_string(), Value::from(object_label.to_string()));
    }
    graph
        .upsert_vertex(txn, object_label, "fqn", &object_fqn, &object_create, &Props::new())
        .await?;

    if let Some(name) = column_name {
        let column_fqn = format!("{object_fqn}.{name}");
        let column_label = if is_temp { "TempColumn" } else { "Column" };
        let mut column_create = Props::new();
        column_create.insert("name".to_string(), Value::from(name.to_string()));
        column_create.insert("sourced_by".to_string(), Value::from("lineage"));
        graph
            .upsert_vertex(txn, column_label, "fqn", &column_fqn, &column_create, &Props::new())
            .await?;
        if !is_temp {
            graph
                .upsert_edge(
                    txn,
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
        }
    }

    Ok(())
}

fn object_fqn(db_fqn: &str, schema: &str, name: &str) -> String {
    format!("{db_fqn}.{schema}.{name}")
}

fn column_fqn(db_fqn: &str, schema: &str, object_name: &str, column_name: &str) -> String {
    format!("{}.{}", object_fqn(db_fqn, schema, object_name), column_name)
}

/// `DATA_FLOW` edge key per §4.6 step 3: `(source_fqn, target_fqn,
/// sql_hash)`. Also identifies the `GENERATES_FLOW` edge targeting it
/// (§4.6 step 4, "flow_edge_key").
fn flow_edge_key(source_fqn: &str, target_fqn: &str, sql_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_fqn.as_bytes());
    hasher.update(b"\0");
    hasher.update(target_fqn.as_bytes());
    hasher.update(b"\0");
    hasher.update(sql_hash.as_bytes());
    hex::encode(hasher.finalize())
}

async fn write_data_flow_edges(
    graph: &GraphClient,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    db_fqn: &str,
    sql_hash: &str,
    now: DateTime<Utc>,
    column: &ColumnLineage,
) -> Result<(), PipelineError> {
    let target_fqn = column_fqn(
        db_fqn,
        &column.target_object_schema,
        &column.target_object_name,
        &column.target_column,
    );

    for source in &column.sources {
        // When `source_column` is null (literal/expression case, §4.4), the
        // edge originates from the source object node itself.
        let source_fqn = match &source.source_column {
            Some(col) => column_fqn(db_fqn, &source.source_object.schema, &source.source_object.name, col),
            None => object_fqn(db_fqn, &source.source_object.schema, &source.source_object.name),
        };

        // Edge key is (source_fqn, target_fqn, sql_hash), §3/§4.6 step 3 —
        // `sql_hash` goes in `extra_match` so two patterns mapping the same
        // columns still produce distinct edges rather than collapsing into
        // one whose `sql_hash` is frozen to the first writer.
        let mut edge_key = Props::new();
        edge_key.insert("sql_hash".to_string(), Value::from(sql_hash.to_string()));

        let mut create_props = Props::new();
        create_props.insert("created_at".to_string(), Value::from(now.to_rfc3339()));
        let mut set_props = Props::new();
        set_props.insert(
            "derivation_type".to_string(),
            serde_json::to_value(column.derivation_type).unwrap_or(Value::Null),
        );
        set_props.insert(
            "transformation_logic".to_string(),
            Value::from(source.transformation_logic.clone()),
        );
        set_props.insert("last_seen_at".to_string(), Value::from(now.to_rfc3339()));

        graph
            .upsert_edge(
                txn,
                "DATA_FLOW",
                "fqn",
                &source_fqn,
                "fqn",
                &target_fqn,
                &edge_key,
                &create_props,
                &set_props,
            )
            .await?;

        // GENERATES_FLOW: property graphs here can't express an edge whose
        // endpoint is another edge, so this models reachability as
        // SqlPattern -> target column, carrying `flow_edge_key` to identify
        // exactly which DATA_FLOW edge it stands for (§4.6 step 4, §3
        // "every DATA_FLOW edge is reachable from a SqlPattern via
        // GENERATES_FLOW"). Keyed on (sql_hash, flow_edge_key) so two
        // DATA_FLOW edges from the same pattern into the same target column
        // (distinct sources) get distinct GENERATES_FLOW edges too.
        let key = flow_edge_key(&source_fqn, &target_fqn, sql_hash);
        let mut flow_key = Props::new();
        flow_key.insert("flow_edge_key".to_string(), Value::from(key.clone()));
        let mut flow_create = Props::new();
        flow_create.insert("sql_hash".to_string(), Value::from(sql_hash.to_string()));
        flow_create.insert("flow_edge_key".to_string(), Value::from(key));
        graph
            .upsert_edge(
                txn,
                "GENERATES_FLOW",
                "sql_hash",
                sql_hash,
                "fqn",
                &target_fqn,
                &flow_key,
                &flow_create,
                &Props::new(),
            )
            .await?;
    }

    Ok(())
}

async fn write_access_edge(
    graph: &GraphClient,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    db_fqn: &str,
    sql_hash: &str,
    now: DateTime<Utc>,
    referenced: &ReferencedObject,
) -> Result<(), PipelineError> {
    let target_fqn = object_fqn(db_fqn, &referenced.schema, &referenced.name);
    let edge_label = match referenced.access_mode {
        AccessMode::Read => "READS_FROM",
        AccessMode::Write => "WRITES_TO",
    };
    let mut set_props = Props::new();
    set_props.insert("last_seen_at".to_string(), Value::from(now.to_rfc3339()));
    graph
        .upsert_edge(
            txn,
            edge_label,
            "sql_hash",
            sql_hash,
            "fqn",
            &target_fqn,
            &Props::new(),
            &Props::new(),
            &set_props,
        )
        .await?;
    Ok(())
}

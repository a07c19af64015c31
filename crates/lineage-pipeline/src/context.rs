//! Context assembler: resolves the identifiers a pattern references against
//! catalog metadata and trims the result to fit the LLM's token budget.
//!
//! Walks the statement's table references (via `lineage_core::extractors`),
//! resolves each one against the data source's `search_path` when it isn't
//! schema-qualified, fetches column metadata for every resolved object, and
//! renders a compact `CREATE TABLE`-style description per object. Objects
//! are ranked by how directly they're referenced (schema-qualified first,
//! then search-path resolved, then unresolved) and trimmed from the back
//! until the whole assembled context fits the configured token budget.

use lineage_core::extractors::extract_tables;
use lineage_core::parser::parse_sql;
use lineage_store::repo::MetadataRepo;
use sqlx::PgPool;

use crate::config::ContextConfig;
use crate::error::PipelineError;

/// One object's rendered schema, ready to drop into the LLM prompt.
#[derive(Debug, Clone)]
pub struct ObjectContext {
    pub qualified_name: String,
    pub rendered: String,
    /// Lower is more directly referenced; used to decide what to trim
    /// first when the assembled context exceeds the token budget.
    pub relevance_rank: u8,
}

/// The assembled, budget-trimmed catalog context for one SQL pattern.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub objects: Vec<ObjectContext>,
    pub truncated: bool,
}

impl AssembledContext {
    pub fn render(&self) -> String {
        self.objects
            .iter()
            .map(|o| o.rendered.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[tracing::instrument(skip(pool, cfg, normalized_sql))]
pub async fn assemble_context(
    pool: &PgPool,
    cfg: &ContextConfig,
    normalized_sql: &str,
    source_database: &str,
) -> Result<AssembledContext, PipelineError> {
    let statements = parse_sql(normalized_sql).unwrap_or_default();
    let references = extract_tables(&statements);

    let repo = MetadataRepo::new(pool);
    let search_path = repo.search_path(source_database).await?;

    let mut objects = Vec::new();
    for reference in references {
        let (schema, name, rank) = resolve_reference(&reference, &search_path);
        let Some(object) = repo.find_object(source_database, &schema, &name).await? else {
            continue;
        };
        let columns = repo.columns_for_object(source_database, &schema, &name).await?;
        let rendered = render_object(&object.schema_name, &object.object_name, &object.object_type, &columns);
        objects.push(ObjectContext {
            qualified_name: format!("{schema}.{name}"),
            rendered,
            relevance_rank: rank,
        });
    }

    objects.sort_by_key(|o| o.relevance_rank);

    let budget_chars = (cfg.max_context_tokens as f64 * cfg.chars_per_token) as usize;
    let mut truncated = false;
    let mut total = 0usize;
    let mut kept = Vec::new();
    for object in objects {
        let len = object.rendered.len();
        if total + len > budget_chars && !kept.is_empty() {
            truncated = true;
            break;
        }
        total += len;
        kept.push(object);
    }

    Ok(AssembledContext {
        objects: kept,
        truncated,
    })
}

/// `0` = schema-qualified in the query text, `1` = resolved via search
/// path, `2` = unqualified and left to the first search-path entry as a
/// best-effort guess.
fn resolve_reference(reference: &str, search_path: &[String]) -> (String, String, u8) {
    if let Some((schema, name)) = reference.split_once('.') {
        return (schema.to_string(), name.to_string(), 0);
    }
    let schema = search_path.first().cloned().unwrap_or_else(|| "public".to_string());
    let rank = if search_path.is_empty() { 2 } else { 1 };
    (schema, reference.to_string(), rank)
}

fn render_object(
    schema: &str,
    name: &str,
    object_type: &str,
    columns: &[lineage_store::repo::metadata::ColumnInfo],
) -> String {
    let mut out = format!("-- {object_type} {schema}.{name}\ncreate table {schema}.{name} (\n");
    for (idx, col) in columns.iter().enumerate() {
        let comma = if idx + 1 == columns.len() { "" } else { "," };
        out.push_str(&format!("  {} {}{}\n", col.column_name, col.data_type, comma));
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reference_schema_qualified() {
        let (schema, name, rank) = resolve_reference("public.users", &[]);
        assert_eq!((schema.as_str(), name.as_str(), rank), ("public", "users", 0));
    }

    #[test]
    fn test_resolve_reference_search_path() {
        let (schema, name, rank) = resolve_reference("users", &["analytics".to_string()]);
        assert_eq!((schema.as_str(), name.as_str(), rank), ("analytics", "users", 1));
    }

    #[test]
    fn test_resolve_reference_no_search_path_defaults_public() {
        let (schema, _, rank) = resolve_reference("users", &[]);
        assert_eq!(schema, "public");
        assert_eq!(rank, 2);
    }

    #[test]
    fn test_render_object_has_header_and_columns() {
        let columns = vec![lineage_store::repo::metadata::ColumnInfo {
            column_name: "id".to_string(),
            data_type: "bigint".to_string(),
            ordinal_position: 1,
            is_nullable: false,
            column_default: None,
            is_primary_key: true,
            is_unique: true,
            fk_schema: None,
            fk_table: None,
            fk_column: None,
            fk_constraint_name: None,
            description: None,
        }];
        let rendered = render_object("public", "users", "table", &columns);
        assert!(rendered.contains("create table public.users"));
        assert!(rendered.contains("id bigint"));
    }
}

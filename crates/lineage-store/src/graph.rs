//! Apache AGE graph client shared by the metadata and lineage graph
//! builders.
//!
//! AGE stores a vertex/edge's logical type as a `label` property, not as a
//! native Cypher label (every vertex AGE creates through this client is a
//! plain `(:Entity)`), and its `cypher()` SQL function doesn't support a
//! `MERGE ... ON MATCH SET ... ON CREATE SET` branching clause. Every
//! upsert here is therefore decomposed into match, conditional create, and
//! unconditional set, run as three statements inside one transaction
//! (§4.5/§9).
//!
//! Every data *value* (keys, property values) travels through AGE's
//! `cypher(graph, query, params)` third argument, a bound `agtype` map, and
//! is referenced in the query text as `$paramname` — never interpolated
//! into the Cypher string. Only identifiers the caller controls in Rust
//! source (labels, property names) are spliced into the query text, and
//! those go through `sanitize_identifier` first.

use std::collections::BTreeMap;

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{StoreError, StoreResult};

/// A property bag keyed by `BTreeMap` so generated Cypher param maps are
/// stable across runs, which keeps AGE round-trip tests and logs diffable.
pub type Props = BTreeMap<String, Value>;

/// Thin wrapper over a `sqlx::PgPool` that issues Cypher through AGE's
/// `cypher()` SQL function against a fixed graph.
#[derive(Clone)]
pub struct GraphClient {
    pool: PgPool,
    graph: String,
}

impl GraphClient {
    pub fn new(pool: PgPool, graph: impl Into<String>) -> Self {
        Self {
            pool,
            graph: graph.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Upsert a vertex identified by `(label, key_prop, key_value)`.
    ///
    /// `create_props` are written only the first time the vertex is
    /// created (e.g. `created_at`, `sourced_by`) — on a later call against
    /// an existing vertex they are silently skipped, so a producer that
    /// doesn't own an attribute can never clobber it. `set_props` are
    /// written unconditionally every call (e.g. `updated_at`, mutable
    /// catalog attributes). Returns `true` iff this call created the
    /// vertex.
    #[tracing::instrument(skip(self, txn, create_props, set_props))]
    pub async fn upsert_vertex(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        label: &str,
        key_prop: &str,
        key_value: &str,
        create_props: &Props,
        set_props: &Props,
    ) -> StoreResult<bool> {
        let label = sanitize_identifier(label);
        let key_prop = sanitize_identifier(key_prop);

        let mut match_params = Props::new();
        match_params.insert("key".to_string(), Value::from(key_value));

        let find = format!("MATCH (n:Entity {{{key_prop}: $key}}) RETURN n");
        let created = self.run_cypher(txn, &find, &match_params).await?.is_empty();

        if created {
            let mut create_params = match_params.clone();
            create_params.insert("label".to_string(), Value::from(label));
            let mut assigns = vec![format!("{key_prop}: $key"), "label: $label".to_string()];
            for key in create_props.keys() {
                let pk = sanitize_identifier(key);
                assigns.push(format!("{pk}: $c_{pk}"));
            }
            for (key, value) in create_props {
                let pk = sanitize_identifier(key);
                create_params.insert(format!("c_{pk}"), value.clone());
            }
            let create_cypher = format!("CREATE (n:Entity {{{}}}) RETURN n", assigns.join(", "));
            self.run_cypher(txn, &create_cypher, &create_params).await?;
        }

        if !set_props.is_empty() {
            let mut set_params = match_params;
            let mut assigns = Vec::with_capacity(set_props.len());
            for (key, value) in set_props {
                let pk = sanitize_identifier(key);
                set_params.insert(format!("s_{pk}"), value.clone());
                assigns.push(format!("n.{pk} = $s_{pk}"));
            }
            let set_cypher =
                format!("MATCH (n:Entity {{{key_prop}: $key}}) SET {} RETURN n", assigns.join(", "));
            self.run_cypher(txn, &set_cypher, &set_params).await?;
        }

        Ok(created)
    }

    /// Upsert a directed edge between two vertices already matched by
    /// `(from_key_prop, from_key_value)` / `(to_key_prop, to_key_value)`.
    /// `extra_match` widens the edge's identity beyond `(from, label, to)` —
    /// e.g. a `DATA_FLOW` edge is keyed on `(source_fqn, target_fqn,
    /// sql_hash)`, not just the endpoints, so two patterns producing the
    /// same column mapping still get distinct edges. Entries in
    /// `extra_match` are written as part of the edge's properties on
    /// create, the same as `create_props`; pass an empty `Props` when the
    /// endpoints alone already identify the edge. Same match /
    /// conditional-create / unconditional-set decomposition and
    /// create-vs-set property split as `upsert_vertex`. Returns `true` iff
    /// this call created the edge.
    #[tracing::instrument(skip(self, txn, extra_match, create_props, set_props))]
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_edge(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        edge_label: &str,
        from_key_prop: &str,
        from_key_value: &str,
        to_key_prop: &str,
        to_key_value: &str,
        extra_match: &Props,
        create_props: &Props,
        set_props: &Props,
    ) -> StoreResult<bool> {
        let from_key_prop = sanitize_identifier(from_key_prop);
        let to_key_prop = sanitize_identifier(to_key_prop);
        let label = sanitize_identifier(edge_label);

        let mut match_params = Props::new();
        match_params.insert("from".to_string(), Value::from(from_key_value));
        match_params.insert("to".to_string(), Value::from(to_key_value));
        match_params.insert("label".to_string(), Value::from(label.clone()));

        let mut rel_match_assigns = vec!["label: $label".to_string()];
        for key in extra_match.keys() {
            let pk = sanitize_identifier(key);
            rel_match_assigns.push(format!("{pk}: $m_{pk}"));
        }
        for (key, value) in extra_match {
            let pk = sanitize_identifier(key);
            match_params.insert(format!("m_{pk}"), value.clone());
        }
        let rel_match = rel_match_assigns.join(", ");

        let find = format!(
            "MATCH (a:Entity {{{from_key_prop}: $from}})-[r:Rel {{{rel_match}}}]->(b:Entity {{{to_key_prop}: $to}}) RETURN r",
        );
        let created = self.run_cypher(txn, &find, &match_params).await?.is_empty();

        if created {
            let mut create_params = match_params.clone();
            let mut assigns = rel_match_assigns.clone();
            for key in create_props.keys() {
                let pk = sanitize_identifier(key);
                assigns.push(format!("{pk}: $c_{pk}"));
            }
            for (key, value) in create_props {
                let pk = sanitize_identifier(key);
                create_params.insert(format!("c_{pk}"), value.clone());
            }
            let create = format!(
                "MATCH (a:Entity {{{from_key_prop}: $from}}), (b:Entity {{{to_key_prop}: $to}}) CREATE (a)-[r:Rel {{{}}}]->(b) RETURN r",
                assigns.join(", "),
            );
            self.run_cypher(txn, &create, &create_params).await?;
        }

        if !set_props.is_empty() {
            let mut set_params = match_params;
            let mut assigns = Vec::with_capacity(set_props.len());
            for (key, value) in set_props {
                let pk = sanitize_identifier(key);
                set_params.insert(format!("s_{pk}"), value.clone());
                assigns.push(format!("r.{pk} = $s_{pk}"));
            }
            let set_cypher = format!(
                "MATCH (a:Entity {{{from_key_prop}: $from}})-[r:Rel {{{rel_match}}}]->(b:Entity {{{to_key_prop}: $to}}) SET {} RETURN r",
                assigns.join(", "),
            );
            self.run_cypher(txn, &set_cypher, &set_params).await?;
        }

        Ok(created)
    }

    /// Execute a Cypher statement against this client's graph inside an
    /// existing transaction, binding `params` as AGE's `agtype` parameter
    /// map (referenced in `cypher` as `$name`), and return the raw
    /// `agtype` rows.
    pub async fn run_cypher(
        &self,
        txn: &mut Transaction<'_, Postgres>,
        cypher: &str,
        params: &Props,
    ) -> StoreResult<Vec<String>> {
        let sql = "SELECT * FROM cypher($1::text, $2::text, $3::agtype) AS (v agtype)";
        let params_json = serde_json::to_string(params).map_err(StoreError::from)?;
        let rows: Vec<(String,)> = sqlx::query_as(sql)
            .bind(&self.graph)
            .bind(cypher)
            .bind(params_json)
            .fetch_all(&mut **txn)
            .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }
}

/// Strips anything but ASCII alphanumerics and `_` so a caller-provided
/// label or property name can't break out of the generated Cypher. Only
/// applied to identifiers that are spliced into query text; every data
/// value flows through a bound parameter instead.
fn sanitize_identifier(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier_strips_punctuation() {
        assert_eq!(sanitize_identifier("my-label; DROP TABLE x"), "mylabelDROPTABLEx");
    }

    #[test]
    fn test_sanitize_identifier_empty_falls_back() {
        assert_eq!(sanitize_identifier("!!!"), "unnamed");
    }

    #[test]
    fn test_sanitize_identifier_rejects_dollar_quote_breakout() {
        // A label containing AGE's cypher() dollar-quote delimiter must
        // never reach the query text unsanitized (§9).
        assert_eq!(sanitize_identifier("Table$$ }) DETACH DELETE (n) //"), "TableDETACHDELETEn");
    }
}

//! SQL fingerprinting: raw SQL in, a stable `(normalised_sql, sql_hash)` pair
//! or a classified rejection reason out.
//!
//! Normalisation is parse-based, not textual: we parse with the PostgreSQL
//! dialect, rewrite every literal value to a typed placeholder, collapse
//! constant `IN (...)` lists, and re-serialize through `sqlparser`'s own
//! `Display` impl. Re-serializing an AST already drops comments and
//! whitespace; what's left is lowercasing keywords while leaving identifier
//! case and quoting untouched, which we do with a second tokenizer pass over
//! the re-serialized text.

use std::ops::ControlFlow;

use sha2::{Digest, Sha256};
use sqlparser::ast::{Expr, Statement, Value, ValueWithSpan, VisitMut, VisitorMut};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::parser::parse_sql;

/// The normalised form and content hash of a single SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Canonical, literal-redacted, keyword-lowercased SQL text.
    pub normalized_sql: String,
    /// Hex-encoded SHA-256 of `normalized_sql`.
    pub sql_hash: String,
    /// Always `true` for a returned `Fingerprint` — kept on the struct so
    /// callers that log both success and failure paths have one shape.
    pub dialect_parse_ok: bool,
}

/// Why a statement was rejected before it ever became a `SqlPattern` row.
///
/// Rejections are recorded for operator review but never create a pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    #[error("empty statement")]
    Empty,
    #[error("not a data-flow statement: {0}")]
    NotDataFlow(#[from] NonDataFlowReason),
    #[error("batch contains {0} statements; fingerprinting expects exactly one")]
    MultipleStatements(usize),
    #[error("failed to parse SQL: {0}")]
    Unparseable(String),
}

/// Classification of why a statement carries no column-level data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NonDataFlowReason {
    #[error("session/variable statement (SET/SHOW)")]
    SessionVariable,
    #[error("transaction control statement (BEGIN/COMMIT/ROLLBACK/SAVEPOINT)")]
    TransactionControl,
    #[error("maintenance statement (VACUUM/ANALYZE)")]
    Maintenance,
    #[error("DDL statement with no associated query")]
    DdlOnly,
    #[error("permission/grant statement")]
    Grant,
    #[error("explain statement")]
    Explain,
}

/// Fingerprint one raw SQL statement.
///
/// `source_database` is accepted for symmetry with the rest of the
/// pipeline's contracts (it does not affect normalisation in the MVP
/// Postgres-only dialect) and is reserved for future multi-catalog
/// disambiguation.
pub fn fingerprint(sql: &str, _source_database: &str) -> Result<Fingerprint, FingerprintError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(FingerprintError::Empty);
    }

    if let Some(reason) = classify_unparseable_maintenance(trimmed) {
        return Err(FingerprintError::NotDataFlow(reason));
    }

    let mut statements = parse_sql(trimmed).map_err(|e| FingerprintError::Unparseable(e.to_string()))?;
    if statements.is_empty() {
        return Err(FingerprintError::Empty);
    }
    if statements.len() > 1 {
        return Err(FingerprintError::MultipleStatements(statements.len()));
    }

    let statement = &statements[0];
    if let Some(reason) = classify_statement(statement) {
        return Err(FingerprintError::NotDataFlow(reason));
    }

    let mut redactor = LiteralRedactor;
    let _ = statements[0].visit(&mut redactor);

    let canonical = statements[0].to_string();
    let normalized_sql = lowercase_keywords(&canonical);

    let mut hasher = Sha256::new();
    hasher.update(normalized_sql.as_bytes());
    let sql_hash = hex::encode(hasher.finalize());

    Ok(Fingerprint {
        normalized_sql,
        sql_hash,
        dialect_parse_ok: true,
    })
}

/// `VACUUM`/`ANALYZE` (bare, table-targeted forms) aren't part of
/// `sqlparser`'s grammar, so they fail to parse entirely. Classify them
/// from the leading keyword before attempting a full parse.
fn classify_unparseable_maintenance(sql: &str) -> Option<NonDataFlowReason> {
    let mut tokenizer = Tokenizer::new(&PostgreSqlDialect {}, sql);
    let tokens = tokenizer.tokenize().ok()?;
    let first_word = tokens.iter().find_map(|t| match t {
        Token::Word(w) => Some(w.value.to_ascii_uppercase()),
        Token::Whitespace(_) => None,
        _ => None,
    })?;

    match first_word.as_str() {
        "VACUUM" | "ANALYZE" | "ANALYSE" | "REINDEX" | "CLUSTER" => {
            Some(NonDataFlowReason::Maintenance)
        }
        _ => None,
    }
}

fn classify_statement(statement: &Statement) -> Option<NonDataFlowReason> {
    match statement {
        Statement::Query(_) => None,
        Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) => None,
        Statement::Merge { .. } => None,
        Statement::CreateTable(ct) => {
            if ct.query.is_some() {
                None
            } else {
                Some(NonDataFlowReason::DdlOnly)
            }
        }
        Statement::CreateView { .. } => None,
        Statement::SetVariable { .. } | Statement::SetNames { .. } | Statement::SetNamesDefault { .. } => {
            Some(NonDataFlowReason::SessionVariable)
        }
        Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowStatus { .. } => Some(NonDataFlowReason::SessionVariable),
        Statement::StartTransaction { .. }
        | Statement::SetTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. }
        | Statement::ReleaseSavepoint { .. } => Some(NonDataFlowReason::TransactionControl),
        Statement::Grant { .. } | Statement::Revoke { .. } => Some(NonDataFlowReason::Grant),
        Statement::Explain { .. } | Statement::ExplainTable { .. } => {
            Some(NonDataFlowReason::Explain)
        }
        Statement::Truncate { .. }
        | Statement::Drop { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::CreateIndex(_)
        | Statement::CreateSchema { .. }
        | Statement::CreateFunction(_) => Some(NonDataFlowReason::DdlOnly),
        // Anything else (CALL, COPY, LISTEN/NOTIFY, ...) carries no
        // column-level data flow we can extract in the MVP.
        _ => Some(NonDataFlowReason::DdlOnly),
    }
}

/// Rewrites every scalar literal to a typed placeholder and collapses
/// constant-only `IN (...)` lists to a single placeholder element.
struct LiteralRedactor;

impl VisitorMut for LiteralRedactor {
    type Break = ();

    fn pre_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        if let Expr::InList {
            expr: _, list, ..
        } = expr
        {
            if !list.is_empty() && list.iter().all(is_literal) {
                if let Expr::Value(ValueWithSpan { span, .. }) = &list[0] {
                    let span = *span;
                    *list = vec![Expr::Value(ValueWithSpan {
                        value: Value::Placeholder(":list".to_string()),
                        span,
                    })];
                }
                return ControlFlow::Continue(());
            }
        }

        if let Expr::Value(value_with_span) = expr {
            if let Some(placeholder) = placeholder_for(&value_with_span.value) {
                value_with_span.value = Value::Placeholder(placeholder);
            }
        }

        ControlFlow::Continue(())
    }
}

fn is_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Value(vws) if placeholder_for(&vws.value).is_some())
}

fn placeholder_for(value: &Value) -> Option<String> {
    match value {
        Value::Number(_, _) => Some(":num".to_string()),
        Value::SingleQuotedString(_)
        | Value::DoubleQuotedString(_)
        | Value::EscapedStringLiteral(_)
        | Value::NationalStringLiteral(_)
        | Value::DollarQuotedString(_)
        | Value::HexStringLiteral(_)
        | Value::SingleQuotedByteStringLiteral(_)
        | Value::DoubleQuotedByteStringLiteral(_) => Some(":str".to_string()),
        Value::Boolean(_) => Some(":bool".to_string()),
        Value::Null => Some(":null".to_string()),
        _ => None,
    }
}

/// Re-tokenizes already-canonical SQL text and lowercases reserved-keyword
/// tokens while leaving identifiers (quoted or not), literals, and
/// punctuation untouched.
fn lowercase_keywords(sql: &str) -> String {
    let mut tokenizer = Tokenizer::new(&PostgreSqlDialect {}, sql);
    let tokens = match tokenizer.tokenize() {
        Ok(tokens) => tokens,
        Err(_) => return sql.to_string(),
    };

    let mut out = String::with_capacity(sql.len());
    for token in tokens {
        match &token {
            Token::Word(w) if w.keyword != Keyword::NoKeyword && w.quote_style.is_none() => {
                out.push_str(&w.value.to_ascii_lowercase());
            }
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_determinism() {
        let a = fingerprint("SELECT id FROM users WHERE active = true", "db").unwrap();
        let b = fingerprint("SELECT id FROM users WHERE active = true", "db").unwrap();
        assert_eq!(a.sql_hash, b.sql_hash);
    }

    #[test]
    fn test_literal_insensitivity() {
        let a = fingerprint("SELECT id FROM users WHERE age > 21", "db").unwrap();
        let b = fingerprint("select id from users where age > 99", "db").unwrap();
        assert_eq!(a.sql_hash, b.sql_hash);
    }

    #[test]
    fn test_whitespace_and_case_insensitivity() {
        let a = fingerprint("SELECT id FROM users WHERE age > 21", "db").unwrap();
        let b = fingerprint("select   id\nfrom users\nwhere age>21", "db").unwrap();
        assert_eq!(a.sql_hash, b.sql_hash);
    }

    #[test]
    fn test_comment_insensitivity() {
        let a = fingerprint("SELECT id FROM users", "db").unwrap();
        let b = fingerprint("SELECT id /* comment */ FROM users -- trailing", "db").unwrap();
        assert_eq!(a.sql_hash, b.sql_hash);
    }

    #[test]
    fn test_in_list_collapses() {
        let a = fingerprint("SELECT id FROM users WHERE id IN (1, 2, 3)", "db").unwrap();
        let b = fingerprint("SELECT id FROM users WHERE id IN (4, 5)", "db").unwrap();
        assert_eq!(a.sql_hash, b.sql_hash);
        assert!(a.normalized_sql.contains(":list"));
    }

    #[test]
    fn test_identifier_case_preserved() {
        let fp = fingerprint(r#"SELECT "MixedCase" FROM "Users""#, "db").unwrap();
        assert!(fp.normalized_sql.contains("\"MixedCase\""));
        assert!(fp.normalized_sql.contains("\"Users\""));
    }

    #[test]
    fn test_discrimination_different_identifier() {
        let a = fingerprint("SELECT id FROM users", "db").unwrap();
        let b = fingerprint("SELECT id FROM accounts", "db").unwrap();
        assert_ne!(a.sql_hash, b.sql_hash);
    }

    #[test]
    fn test_discrimination_different_join() {
        let a = fingerprint("SELECT u.id FROM users u JOIN orders o ON u.id = o.user_id", "db")
            .unwrap();
        let b = fingerprint(
            "SELECT u.id FROM users u LEFT JOIN orders o ON u.id = o.user_id",
            "db",
        )
        .unwrap();
        assert_ne!(a.sql_hash, b.sql_hash);
    }

    #[rstest]
    #[case("SET search_path = public", NonDataFlowReason::SessionVariable)]
    #[case("BEGIN", NonDataFlowReason::TransactionControl)]
    #[case("COMMIT", NonDataFlowReason::TransactionControl)]
    #[case("VACUUM ANALYZE users", NonDataFlowReason::Maintenance)]
    #[case("CREATE TABLE users (id int)", NonDataFlowReason::DdlOnly)]
    #[case("GRANT SELECT ON users TO reporting", NonDataFlowReason::Grant)]
    #[case("EXPLAIN SELECT id FROM users", NonDataFlowReason::Explain)]
    fn test_rejects_non_data_flow_statements(#[case] sql: &str, #[case] expected: NonDataFlowReason) {
        let err = fingerprint(sql, "db").unwrap_err();
        assert!(matches!(err, FingerprintError::NotDataFlow(reason) if reason == expected));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            fingerprint("   ", "db").unwrap_err(),
            FingerprintError::Empty
        ));
    }

    #[test]
    fn test_accepts_create_table_as() {
        assert!(fingerprint("CREATE TABLE backup AS SELECT * FROM users", "db").is_ok());
    }

    #[test]
    fn test_survives_recursive_cte() {
        let sql = "WITH RECURSIVE t(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM t WHERE n < 10) SELECT n FROM t";
        assert!(fingerprint(sql, "db").is_ok());
    }

    #[test]
    fn test_survives_window_function() {
        let sql = "SELECT id, row_number() OVER (PARTITION BY dept ORDER BY id) FROM employees";
        assert!(fingerprint(sql, "db").is_ok());
    }

    #[test]
    fn test_survives_union() {
        assert!(fingerprint("SELECT id FROM a UNION SELECT id FROM b", "db").is_ok());
    }
}

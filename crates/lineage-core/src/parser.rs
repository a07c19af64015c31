//! SQL parsing entry point.
//!
//! The pipeline targets PostgreSQL only (cross-engine dialect portability is
//! an explicit non-goal), so this wraps `sqlparser`'s `PostgreSqlDialect`
//! directly rather than carrying a dialect-selection layer.

use crate::error::ParseError;
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Parse `sql` as one or more PostgreSQL statements.
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>, ParseError> {
    Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_select() {
        let statements = parse_sql("SELECT * FROM users").unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_parse_invalid_sql() {
        assert!(parse_sql("SELECT * FROM").is_err());
    }

    #[test]
    fn test_parse_multiple_statements() {
        let statements = parse_sql("SELECT * FROM users; SELECT * FROM orders;").unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_parse_postgres_operators() {
        assert!(parse_sql("SELECT usage ? 'key' FROM events").is_ok());
        assert!(parse_sql("SELECT id::text FROM events").is_ok());
        assert!(parse_sql("SELECT payload ->> 'a' FROM events").is_ok());
    }

    #[test]
    fn test_parse_cte() {
        let sql = r#"
            WITH active_users AS (
                SELECT * FROM users WHERE active = true
            )
            SELECT * FROM active_users
        "#;
        assert!(parse_sql(sql).is_ok());
    }

    #[test]
    fn test_parse_recursive_cte() {
        let sql = r#"
            WITH RECURSIVE t(n) AS (
                SELECT 1
                UNION ALL
                SELECT n + 1 FROM t WHERE n < 10
            )
            SELECT n FROM t
        "#;
        assert!(parse_sql(sql).is_ok());
    }

    #[test]
    fn test_parse_insert_select() {
        assert!(parse_sql("INSERT INTO archive SELECT * FROM users WHERE deleted = true").is_ok());
    }

    #[test]
    fn test_parse_create_table_as() {
        assert!(parse_sql("CREATE TABLE users_backup AS SELECT * FROM users").is_ok());
    }

    #[test]
    fn test_parse_create_materialized_view() {
        assert!(parse_sql("CREATE MATERIALIZED VIEW mv AS SELECT * FROM users").is_ok());
    }

    #[test]
    fn test_parse_union() {
        assert!(parse_sql("SELECT id FROM users UNION ALL SELECT id FROM admins").is_ok());
    }

    #[test]
    fn test_parse_window_function() {
        let sql = "SELECT id, row_number() OVER (PARTITION BY dept ORDER BY id) FROM employees";
        assert!(parse_sql(sql).is_ok());
    }

    #[test]
    fn test_parse_lateral_join() {
        let sql = "SELECT * FROM users u, LATERAL (SELECT * FROM orders o WHERE o.user_id = u.id) sub";
        assert!(parse_sql(sql).is_ok());
    }
}

use lineage_core::fingerprint::fingerprint;
use proptest::prelude::*;

proptest! {
    /// Determinism (§8): fingerprinting the same statement twice always
    /// produces the same hash, for any pair of distinct literal values
    /// substituted into an otherwise-fixed query shape.
    #[test]
    fn fingerprint_is_deterministic_across_literals(
        table in "[a-z]{1,8}",
        literal_a in 0i64..10_000,
        literal_b in 0i64..10_000,
    ) {
        let sql = format!("SELECT id FROM {table} WHERE age > {literal_a}");
        let a = fingerprint(&sql, "db").unwrap();
        let b = fingerprint(&sql, "db").unwrap();
        prop_assert_eq!(&a.sql_hash, &b.sql_hash);

        // Swapping in a different literal must not change the hash either.
        let sql_b = format!("SELECT id FROM {table} WHERE age > {literal_b}");
        let c = fingerprint(&sql_b, "db").unwrap();
        prop_assert_eq!(a.sql_hash, c.sql_hash);
    }

    /// Discrimination (§8): two statements differing only in the table they
    /// scan never collapse to the same pattern.
    #[test]
    fn fingerprint_discriminates_on_table_identifier(
        table_a in "[a-z]{1,8}",
        table_b in "[a-z]{1,8}",
    ) {
        prop_assume!(table_a != table_b);

        let a = fingerprint(&format!("SELECT id FROM {table_a}"), "db").unwrap();
        let b = fingerprint(&format!("SELECT id FROM {table_b}"), "db").unwrap();
        prop_assert_ne!(a.sql_hash, b.sql_hash);
    }

    /// Whitespace is never significant: padding a statement with extra
    /// blank lines and spaces must not perturb the hash.
    #[test]
    fn fingerprint_ignores_extra_whitespace(
        table in "[a-z]{1,8}",
        pad in 0usize..5,
    ) {
        let padding = "\n".repeat(pad);
        let sql = format!("SELECT id FROM {table}");
        let padded = format!("{padding}SELECT   id{padding}FROM {table}{padding}");
        let a = fingerprint(&sql, "db").unwrap();
        let b = fingerprint(&padded, "db").unwrap();
        prop_assert_eq!(a.sql_hash, b.sql_hash);
    }
}

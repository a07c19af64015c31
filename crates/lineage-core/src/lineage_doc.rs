//! `LineageDocument`: the strict JSON schema the LLM extractor is asked to
//! produce for a single SQL pattern, and the validator that decides whether
//! a parsed response is acceptable or needs a re-prompt.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Column-and-object-level lineage extracted from one SQL pattern.
///
/// This is the wire and storage shape produced by the LLM extractor and
/// consumed by both graph builders. `#[serde(deny_unknown_fields)]` is
/// deliberately *not* set: extra keys a future prompt revision introduces
/// should be ignored, not treated as a schema violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineageDocument {
    /// The `sql_hash` of the pattern this document describes.
    pub sql_pattern_hash: String,
    /// The database the statement executed against.
    pub source_database_name: String,
    /// The primary object the statement writes to, if any (absent for
    /// read-only statements).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_object: Option<TargetObject>,
    /// Per-column derivations, one entry per written column.
    #[serde(default)]
    pub column_level_lineage: Vec<ColumnLineage>,
    /// Every object the statement reads or writes, including the target.
    #[serde(default)]
    pub referenced_objects: Vec<ReferencedObject>,
    /// The model's self-reported confidence in this extraction, in `[0, 1]`.
    /// Advisory only: persisted for audit, but only `is_empty_result`
    /// (§4.4/§9 "LLM as an unreliable oracle") gates whether it loads.
    pub parsing_confidence: f64,
}

/// The object a statement ultimately writes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TargetObject {
    pub schema: String,
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

/// One target column and everything it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnLineage {
    pub target_column: String,
    pub target_object_name: String,
    pub target_object_schema: String,
    #[serde(default)]
    pub sources: Vec<ColumnSource>,
    pub derivation_type: DerivationType,
}

/// One contributing source for a target column. `source_column` is `None`
/// for the literal/expression case (§4.4): a constant or a pure expression
/// over no column has no source column, only a source object to anchor the
/// `DATA_FLOW` edge's origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSource {
    pub source_object: SourceObjectRef,
    #[serde(default)]
    pub source_column: Option<String>,
    /// Free-text description of the expression that produced the target
    /// column from this source (e.g. `"SUM(amount)"`, `"TO_CHAR(d_date, 'YYYY-MM')"`).
    pub transformation_logic: String,
}

/// Schema-qualified reference to the object a `ColumnSource` was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceObjectRef {
    pub schema: String,
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

/// An object read or written by the statement, independent of whether any
/// column of it participates in `column_level_lineage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReferencedObject {
    pub schema: String,
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub access_mode: AccessMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Table,
    View,
    TempTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessMode {
    Read,
    Write,
}

/// How a target column's value relates to its source(s). Exactly the
/// enumeration of §4.4 — any other value fails schema validation and
/// triggers a re-prompt rather than silently widening the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DerivationType {
    /// Copied through unchanged (`SELECT a.x AS y`).
    DirectMapping,
    /// Produced by a scalar function call (`TO_CHAR(...)`, `UPPER(...)`).
    FunctionCall,
    /// Produced by an aggregate (`SUM`, `COUNT`, window functions).
    Aggregation,
    /// Assembled from a `UNION`/`INTERSECT`/`EXCEPT` branch.
    UnionMerge,
    /// Contributed via a `CASE`/`COALESCE`-style conditional.
    ConditionalLogic,
    /// A constant with no source column at all.
    LiteralAssignment,
    /// Any other scalar expression over one or more source columns.
    Expression,
}

/// Why a `LineageDocument` was rejected and should be re-prompted (up to
/// the extractor's retry budget) rather than written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("parsing_confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("column_level_lineage[{0}] references unknown target object {1}.{2}")]
    DanglingTargetColumn(usize, String, String),
    #[error("column_level_lineage[{0}] derivation_type LITERAL_ASSIGNMENT has a source with a non-null source_column")]
    LiteralWithSourceColumn(usize),
    #[error("sql_pattern_hash is empty")]
    EmptyPatternHash,
}

impl LineageDocument {
    /// Structural validation beyond what `serde` already enforces: confidence
    /// bounds, that every `column_level_lineage` entry's target object
    /// actually appears in `referenced_objects` as a write, and that a
    /// `LITERAL_ASSIGNMENT` derivation never carries a source column (§4.4:
    /// "`source_column` (nullable for literals/expressions)").
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sql_pattern_hash.trim().is_empty() {
            return Err(ValidationError::EmptyPatternHash);
        }
        if !(0.0..=1.0).contains(&self.parsing_confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(self.parsing_confidence));
        }
        for (idx, col) in self.column_level_lineage.iter().enumerate() {
            let known = self.referenced_objects.iter().any(|obj| {
                obj.schema == col.target_object_schema
                    && obj.name == col.target_object_name
                    && obj.access_mode == AccessMode::Write
            });
            if !known {
                return Err(ValidationError::DanglingTargetColumn(
                    idx,
                    col.target_object_schema.clone(),
                    col.target_object_name.clone(),
                ));
            }
            if col.derivation_type == DerivationType::LiteralAssignment
                && col.sources.iter().any(|s| s.source_column.is_some())
            {
                return Err(ValidationError::LiteralWithSourceColumn(idx));
            }
        }
        Ok(())
    }

    /// True when the document carries no usable lineage and should be
    /// recorded as `COMPLETED_NO_LINEAGE` rather than populating the graph.
    pub fn is_empty_result(&self) -> bool {
        self.parsing_confidence < 0.2 || self.column_level_lineage.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LineageDocument {
        LineageDocument {
            sql_pattern_hash: "abc123".to_string(),
            source_database_name: "analytics".to_string(),
            target_object: Some(TargetObject {
                schema: "public".to_string(),
                name: "orders_summary".to_string(),
                object_type: ObjectType::Table,
            }),
            column_level_lineage: vec![ColumnLineage {
                target_column: "total".to_string(),
                target_object_name: "orders_summary".to_string(),
                target_object_schema: "public".to_string(),
                sources: vec![ColumnSource {
                    source_object: SourceObjectRef {
                        schema: "public".to_string(),
                        name: "orders".to_string(),
                        object_type: ObjectType::Table,
                    },
                    source_column: Some("amount".to_string()),
                    transformation_logic: "SUM(amount)".to_string(),
                }],
                derivation_type: DerivationType::Aggregation,
            }],
            referenced_objects: vec![
                ReferencedObject {
                    schema: "public".to_string(),
                    name: "orders_summary".to_string(),
                    object_type: ObjectType::Table,
                    access_mode: AccessMode::Write,
                },
                ReferencedObject {
                    schema: "public".to_string(),
                    name: "orders".to_string(),
                    object_type: ObjectType::Table,
                    access_mode: AccessMode::Read,
                },
            ],
            parsing_confidence: 0.92,
        }
    }

    #[test]
    fn test_valid_document_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_rejects_confidence_out_of_range() {
        let mut doc = sample();
        doc.parsing_confidence = 1.5;
        assert!(matches!(
            doc.validate(),
            Err(ValidationError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn test_rejects_dangling_target_column() {
        let mut doc = sample();
        doc.referenced_objects.retain(|o| o.access_mode != AccessMode::Write);
        assert!(matches!(
            doc.validate(),
            Err(ValidationError::DanglingTargetColumn(..))
        ));
    }

    #[test]
    fn test_rejects_literal_assignment_with_source_column() {
        let mut doc = sample();
        doc.column_level_lineage[0].derivation_type = DerivationType::LiteralAssignment;
        assert!(matches!(
            doc.validate(),
            Err(ValidationError::LiteralWithSourceColumn(0))
        ));
    }

    #[test]
    fn test_accepts_literal_assignment_with_null_source_column() {
        let mut doc = sample();
        doc.column_level_lineage[0].derivation_type = DerivationType::LiteralAssignment;
        doc.column_level_lineage[0].sources[0].source_column = None;
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_pattern_hash() {
        let mut doc = sample();
        doc.sql_pattern_hash = "  ".to_string();
        assert!(matches!(doc.validate(), Err(ValidationError::EmptyPatternHash)));
    }

    #[test]
    fn test_is_empty_result_low_confidence() {
        let mut doc = sample();
        doc.parsing_confidence = 0.1;
        assert!(doc.is_empty_result());
    }

    #[test]
    fn test_is_empty_result_no_columns() {
        let mut doc = sample();
        doc.column_level_lineage.clear();
        assert!(doc.is_empty_result());
    }

    #[test]
    fn test_not_empty_result() {
        assert!(!sample().is_empty_result());
    }

    #[test]
    fn test_deserializes_ignoring_unknown_fields() {
        let json = serde_json::json!({
            "sql_pattern_hash": "abc",
            "source_database_name": "db",
            "referenced_objects": [],
            "column_level_lineage": [],
            "parsing_confidence": 0.5,
            "future_field": "ignored"
        });
        let doc: LineageDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.sql_pattern_hash, "abc");
    }

    #[test]
    fn test_derivation_type_serializes_screaming_snake_case() {
        let value = serde_json::to_value(DerivationType::FunctionCall).unwrap();
        assert_eq!(value, serde_json::json!("FUNCTION_CALL"));
        let value = serde_json::to_value(DerivationType::UnionMerge).unwrap();
        assert_eq!(value, serde_json::json!("UNION_MERGE"));
    }

    #[test]
    fn test_object_type_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value(ObjectType::TempTable).unwrap(),
            serde_json::json!("TEMP_TABLE")
        );
    }
}

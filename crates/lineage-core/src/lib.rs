//! Pure, synchronous SQL analysis for the lineage pipeline: PostgreSQL
//! parsing, pattern fingerprinting, table-reference extraction, and the
//! `LineageDocument` schema shared by the LLM extractor and both graph
//! builders. No I/O lives in this crate.

pub mod error;
pub mod extractors;
pub mod fingerprint;
pub mod lineage_doc;
pub mod parser;

pub use error::ParseError;
pub use extractors::extract_tables;
pub use fingerprint::{Fingerprint, FingerprintError, NonDataFlowReason};
pub use lineage_doc::{
    AccessMode, ColumnLineage, ColumnSource, DerivationType, LineageDocument, ObjectType,
    ReferencedObject, SourceObjectRef, TargetObject, ValidationError,
};
pub use parser::parse_sql;

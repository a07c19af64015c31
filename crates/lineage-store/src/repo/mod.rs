pub mod metadata;
pub mod observation;
pub mod pattern;

pub use metadata::MetadataRepo;
pub use observation::LogObservationRepo;
pub use pattern::{PatternStatus, SqlPattern, SqlPatternRepo};

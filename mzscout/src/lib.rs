pub mod annotation;
pub mod data_sources;
pub mod errors;
pub mod models;
pub mod parsing;
pub mod storage;
pub mod utils;

pub use annotation::{
    AnnotationMatcher,
    AnnotationSettings,
    SimilarityOracle,
    SimilarityScore,
};
pub use data_sources::{
    Peaktable,
    PeaktableFormat,
};
pub use models::{
    FeatureRecord,
    LibraryEntry,
    Match,
    RunStats,
    SampleRecord,
    Spectrum,
};
pub use parsing::{
    ParsedRun,
    PeaktableParser,
};
pub use storage::Repository;

mod matcher;
mod oracle;

pub use matcher::{
    AnnotationMatcher,
    AnnotationSettings,
};
pub use oracle::{
    QuerySpectrum,
    SimilarityOracle,
    SimilarityScore,
};

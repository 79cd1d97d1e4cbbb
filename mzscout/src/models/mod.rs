mod feature;
mod sample;
mod set_field;
mod spectrum;
mod stats;

pub use feature::{
    FeatureBuilder,
    FeatureRecord,
    Match,
};
pub use sample::{
    SampleBuilder,
    SampleRecord,
};
pub use set_field::SetField;
pub use spectrum::{
    LibraryEntry,
    Spectrum,
};
pub use stats::{
    FilterSettings,
    RunStats,
};

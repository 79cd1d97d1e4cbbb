mod directors;
mod parser;

pub use directors::{
    GeneralFeatureDirector,
    SampleMaxima,
    SamplesDirector,
    SpecificFeatureDirector,
};
pub use parser::{
    ParsedRun,
    PeaktableParser,
};

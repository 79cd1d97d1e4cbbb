use mzscout::models::FilterSettings;
use mzscout::{
    AnnotationSettings,
    PeaktableFormat,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

/// Run configuration, read from a JSON file passed on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    #[serde(default)]
    pub filters: FilterSettings,
    #[serde(default)]
    pub annotation: AnnotationSettings,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Feature table exported by the upstream peak picker.
    pub peaktable: PathBuf,
    #[serde(default = "default_format")]
    pub format: PeaktableFormat,
    /// MGF file with MS2 spectra keyed by feature id.
    pub spectra: Option<PathBuf>,
    /// MGF spectral library for annotation.
    pub library: Option<PathBuf>,
    /// JSON file with precomputed similarity scores against the library.
    pub scores: Option<PathBuf>,
}

fn default_format() -> PeaktableFormat {
    PeaktableFormat::Mzmine3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

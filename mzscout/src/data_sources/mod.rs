pub mod library;
pub mod mgf;
pub mod peaktable;

pub use library::read_library_path;
pub use mgf::{
    TaggedSpectrum,
    attach_spectra,
    read_mgf_path,
};
pub use peaktable::{
    DETECTED,
    Peaktable,
    PeaktableFormat,
    PeaktableRow,
    SampleMeasurement,
};

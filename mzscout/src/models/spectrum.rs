use serde::{
    Deserialize,
    Serialize,
};

/// A fragmentation spectrum: parallel m/z and intensity arrays plus the
/// precursor m/z it was recorded for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
    pub precursor_mz: f64,
}

impl Spectrum {
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>, precursor_mz: f64) -> Self {
        assert_eq!(
            mz.len(),
            intensity.len(),
            "Spectrum arrays must have the same length, got {} mz and {} intensity values",
            mz.len(),
            intensity.len(),
        );
        Self {
            mz,
            intensity,
            precursor_mz,
        }
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }
}

/// One reference spectrum of the spectral library, with known compound
/// identity. Libraries are kept in file order; that order is the stable
/// tie-break when candidate scores are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: String,
    pub name: String,
    pub exact_mass: f64,
    pub spectrum: Spectrum,
}

use crate::models::{
    LibraryEntry,
    Spectrum,
};
use serde::{
    Deserialize,
    Serialize,
};

/// A feature's spectrum, tagged with the feature id so scores can be
/// written back to the right store key.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpectrum {
    pub f_id: u32,
    pub spectrum: Spectrum,
}

/// One query-vs-library-entry similarity result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    /// Similarity in [0, 1].
    pub score: f64,
    /// Number of fragment peaks aligned within the tolerance.
    pub matched_peaks: usize,
}

/// The external spectral-similarity scorer. The mathematics live outside
/// this crate; the matcher only relies on this contract:
///
/// - the outer vector aligns with the query list,
/// - each inner vector aligns with the library input order,
/// - scores are finite values in [0, 1].
///
/// A shape mismatch is a contract violation and is not defended against.
pub trait SimilarityOracle {
    /// Tag stamped on every match this oracle produces,
    /// e.g. `"modified cosine"`.
    fn algorithm(&self) -> &str;

    /// Score every query against every library entry with the given
    /// fragment m/z tolerance. One blocking call per annotation run.
    fn score_batch(
        &self,
        queries: &[QuerySpectrum],
        library: &[LibraryEntry],
        fragment_tol: f64,
    ) -> Vec<Vec<SimilarityScore>>;
}

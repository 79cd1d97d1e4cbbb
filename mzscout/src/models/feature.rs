use super::set_field::SetField;
use super::spectrum::Spectrum;
use crate::errors::BuilderError;
use crate::utils::{
    round2,
    round4,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeSet;

/// An accepted library-to-feature annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub compound_id: String,
    pub compound_name: String,
    /// Provenance: path of the library file the hit came from.
    pub library: String,
    /// Tag of the similarity algorithm that produced the score.
    pub algorithm: String,
    /// Similarity score in [0, 1], rounded to 2 decimals.
    pub score: f64,
    pub query_mz: f64,
    /// |query precursor mz - library precursor mz|, rounded to 4 decimals.
    pub mz_diff: f64,
}

impl Match {
    pub fn new(
        compound_id: impl Into<String>,
        compound_name: impl Into<String>,
        library: impl Into<String>,
        algorithm: impl Into<String>,
        score: f64,
        query_mz: f64,
        mz_diff: f64,
    ) -> Self {
        Self {
            compound_id: compound_id.into(),
            compound_name: compound_name.into(),
            library: library.into(),
            algorithm: algorithm.into(),
            score: round2(score),
            query_mz,
            mz_diff: round4(mz_diff),
        }
    }

    /// Two matches with the same provenance refer to the same library hit,
    /// regardless of score. Used to keep re-annotation idempotent.
    pub fn same_provenance(&self, other: &Match) -> bool {
        self.compound_id == other.compound_id
            && self.library == other.library
            && self.algorithm == other.algorithm
    }
}

/// A detected peak, either cross-sample ("general") or per-sample
/// ("specific"). Specific records carry an fwhm and relative metrics
/// normalized against their sample's maxima; general records normalize
/// against the run-wide maxima.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub f_id: u32,
    pub mz: f64,
    pub rt: f64,
    pub rt_start: f64,
    pub rt_stop: f64,
    pub rt_range: f64,
    pub fwhm: Option<f64>,
    pub intensity: f64,
    pub rel_intensity: f64,
    pub area: f64,
    pub rel_area: f64,
    /// Ids of the samples this feature was detected in.
    pub samples: BTreeSet<String>,
    pub spectrum: Option<Spectrum>,
    /// Created lazily on the first accepted match.
    pub annotations: Option<Vec<Match>>,
}

impl FeatureRecord {
    pub fn push_annotation(&mut self, m: Match) {
        self.annotations.get_or_insert_with(Vec::new).push(m);
    }

    pub fn has_annotation(&self, m: &Match) -> bool {
        match &self.annotations {
            Some(existing) => existing.iter().any(|x| x.same_provenance(m)),
            None => false,
        }
    }
}

fn check_finite_non_negative(field: &'static str, value: f64) -> Result<f64, BuilderError> {
    if !value.is_finite() || value < 0.0 {
        return Err(BuilderError::ValueOutOfRange {
            field,
            value,
            allowed: "finite and >= 0",
        });
    }
    Ok(value)
}

/// Fluent, single-use, order-validated accumulator for [`FeatureRecord`].
///
/// Every setter checks its input and fails immediately; derived-value
/// setters (`rel_intensity`, `rel_area`, `rt_range`) additionally require
/// their prerequisites to be set beforehand. `get_result` consumes the
/// builder, so a spent builder cannot produce a second record.
#[derive(Debug, Default)]
pub struct FeatureBuilder {
    f_id: SetField<u32>,
    mz: SetField<f64>,
    rt: SetField<f64>,
    rt_start: SetField<f64>,
    rt_stop: SetField<f64>,
    rt_range: SetField<f64>,
    fwhm: SetField<f64>,
    intensity: SetField<f64>,
    rel_intensity: SetField<f64>,
    area: SetField<f64>,
    rel_area: SetField<f64>,
    samples: SetField<BTreeSet<String>>,
    spectrum: SetField<Spectrum>,
}

impl FeatureBuilder {
    pub fn f_id(mut self, f_id: u32) -> Result<Self, BuilderError> {
        if f_id == 0 {
            return Err(BuilderError::ValueOutOfRange {
                field: "f_id",
                value: 0.0,
                allowed: "positive integer",
            });
        }
        self.f_id = SetField::Some(f_id);
        Ok(self)
    }

    pub fn mz(mut self, mz: f64) -> Result<Self, BuilderError> {
        if !mz.is_finite() || mz <= 0.0 {
            return Err(BuilderError::ValueOutOfRange {
                field: "mz",
                value: mz,
                allowed: "finite and > 0",
            });
        }
        self.mz = SetField::Some(mz);
        Ok(self)
    }

    pub fn rt(mut self, rt: f64) -> Result<Self, BuilderError> {
        self.rt = SetField::Some(check_finite_non_negative("rt", rt)?);
        Ok(self)
    }

    pub fn rt_start(mut self, rt_start: f64) -> Result<Self, BuilderError> {
        self.rt_start = SetField::Some(check_finite_non_negative("rt_start", rt_start)?);
        Ok(self)
    }

    pub fn rt_stop(mut self, rt_stop: f64) -> Result<Self, BuilderError> {
        check_finite_non_negative("rt_stop", rt_stop)?;
        if let SetField::Some(start) = self.rt_start {
            if rt_stop < start {
                return Err(BuilderError::ValueOutOfRange {
                    field: "rt_stop",
                    value: rt_stop,
                    allowed: ">= rt_start",
                });
            }
        }
        self.rt_stop = SetField::Some(rt_stop);
        Ok(self)
    }

    /// Derived: `round2(rt_stop - rt_start)`. Requires `rt_start` and
    /// `rt_stop`.
    pub fn rt_range(mut self) -> Result<Self, BuilderError> {
        let start = self.rt_start.expect_some("rt_start", "rt_range")?;
        let stop = self.rt_stop.expect_some("rt_stop", "rt_range")?;
        self.rt_range = SetField::Some(round2(stop - start));
        Ok(self)
    }

    pub fn fwhm(mut self, fwhm: f64) -> Result<Self, BuilderError> {
        self.fwhm = SetField::Some(check_finite_non_negative("fwhm", fwhm)?);
        Ok(self)
    }

    pub fn intensity(mut self, intensity: f64) -> Result<Self, BuilderError> {
        self.intensity = SetField::Some(check_finite_non_negative("intensity", intensity)?);
        Ok(self)
    }

    /// Derived: `round2(intensity / max_intensity)`. Requires `intensity`;
    /// the result must land in [0, 1].
    pub fn rel_intensity(mut self, max_intensity: f64) -> Result<Self, BuilderError> {
        let intensity = self.intensity.expect_some("intensity", "rel_intensity")?;
        if !max_intensity.is_finite() || max_intensity <= 0.0 {
            return Err(BuilderError::ValueOutOfRange {
                field: "max_intensity",
                value: max_intensity,
                allowed: "finite and > 0",
            });
        }
        let rel = round2(intensity / max_intensity);
        if rel > 1.0 {
            return Err(BuilderError::ValueOutOfRange {
                field: "rel_intensity",
                value: rel,
                allowed: "within [0, 1]",
            });
        }
        self.rel_intensity = SetField::Some(rel);
        Ok(self)
    }

    pub fn area(mut self, area: f64) -> Result<Self, BuilderError> {
        self.area = SetField::Some(check_finite_non_negative("area", area)?);
        Ok(self)
    }

    /// Derived: `round2(area / max_area)`. Requires `area`; the result
    /// must land in [0, 1].
    pub fn rel_area(mut self, max_area: f64) -> Result<Self, BuilderError> {
        let area = self.area.expect_some("area", "rel_area")?;
        if !max_area.is_finite() || max_area <= 0.0 {
            return Err(BuilderError::ValueOutOfRange {
                field: "max_area",
                value: max_area,
                allowed: "finite and > 0",
            });
        }
        let rel = round2(area / max_area);
        if rel > 1.0 {
            return Err(BuilderError::ValueOutOfRange {
                field: "rel_area",
                value: rel,
                allowed: "within [0, 1]",
            });
        }
        self.rel_area = SetField::Some(rel);
        Ok(self)
    }

    pub fn samples(mut self, samples: BTreeSet<String>) -> Self {
        self.samples = SetField::Some(samples);
        self
    }

    pub fn spectrum(mut self, spectrum: Spectrum) -> Self {
        self.spectrum = SetField::Some(spectrum);
        self
    }

    /// Finalize, consuming the builder. Fails if a required field was
    /// never set or the rt ordering invariant does not hold.
    pub fn get_result(self) -> Result<FeatureRecord, BuilderError> {
        let rt = self.rt.expect_some("rt", "get_result")?;
        let rt_start = self.rt_start.expect_some("rt_start", "get_result")?;
        let rt_stop = self.rt_stop.expect_some("rt_stop", "get_result")?;
        if rt < rt_start || rt > rt_stop {
            return Err(BuilderError::ValueOutOfRange {
                field: "rt",
                value: rt,
                allowed: "within [rt_start, rt_stop]",
            });
        }
        Ok(FeatureRecord {
            f_id: self.f_id.expect_some("f_id", "get_result")?,
            mz: self.mz.expect_some("mz", "get_result")?,
            rt,
            rt_start,
            rt_stop,
            rt_range: self.rt_range.expect_some("rt_range", "get_result")?,
            fwhm: self.fwhm.into_option(),
            intensity: self.intensity.expect_some("intensity", "get_result")?,
            rel_intensity: self
                .rel_intensity
                .expect_some("rel_intensity", "get_result")?,
            area: self.area.expect_some("area", "get_result")?,
            rel_area: self.rel_area.expect_some("rel_area", "get_result")?,
            samples: self.samples.expect_some("samples", "get_result")?,
            spectrum: self.spectrum.into_option(),
            annotations: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_valid() -> Result<FeatureRecord, BuilderError> {
        FeatureBuilder::default()
            .f_id(1)?
            .mz(100.1)?
            .rt(5.1)?
            .rt_start(4.9)?
            .rt_stop(5.2)?
            .rt_range()?
            .intensity(100.0)?
            .rel_intensity(1000.0)?
            .area(200.0)?
            .rel_area(400.0)?
            .samples(BTreeSet::from(["s1".to_string()]))
            .get_result()
    }

    #[test]
    fn test_full_build() {
        let feature = build_valid().unwrap();
        assert_eq!(feature.f_id, 1);
        assert_eq!(feature.rt_range, 0.3);
        assert_eq!(feature.rel_intensity, 0.1);
        assert_eq!(feature.rel_area, 0.5);
        assert_eq!(feature.fwhm, None);
        assert!(feature.annotations.is_none());
    }

    #[test]
    fn test_rel_intensity_requires_intensity() {
        let err = FeatureBuilder::default().rel_intensity(1000.0).unwrap_err();
        assert_eq!(
            err,
            BuilderError::ExpectedSetField {
                field: "intensity",
                context: "rel_intensity",
            }
        );
    }

    #[test]
    fn test_rt_range_requires_both_bounds() {
        let err = FeatureBuilder::default()
            .rt_start(4.9)
            .unwrap()
            .rt_range()
            .unwrap_err();
        assert_eq!(
            err,
            BuilderError::ExpectedSetField {
                field: "rt_stop",
                context: "rt_range",
            }
        );
    }

    #[test]
    fn test_degenerate_rt_window() {
        let feature = FeatureBuilder::default()
            .f_id(2)
            .unwrap()
            .mz(50.0)
            .unwrap()
            .rt(1.0)
            .unwrap()
            .rt_start(1.0)
            .unwrap()
            .rt_stop(1.0)
            .unwrap()
            .rt_range()
            .unwrap()
            .intensity(10.0)
            .unwrap()
            .rel_intensity(10.0)
            .unwrap()
            .area(1.0)
            .unwrap()
            .rel_area(1.0)
            .unwrap()
            .samples(BTreeSet::new())
            .get_result()
            .unwrap();
        assert_eq!(feature.rt_range, 0.0);
        assert_eq!(feature.rel_intensity, 1.0);
    }

    #[test]
    fn test_rt_outside_window_rejected() {
        let err = FeatureBuilder::default()
            .f_id(3)
            .unwrap()
            .mz(50.0)
            .unwrap()
            .rt(6.0)
            .unwrap()
            .rt_start(4.9)
            .unwrap()
            .rt_stop(5.2)
            .unwrap()
            .rt_range()
            .unwrap()
            .intensity(10.0)
            .unwrap()
            .rel_intensity(10.0)
            .unwrap()
            .area(1.0)
            .unwrap()
            .rel_area(1.0)
            .unwrap()
            .samples(BTreeSet::new())
            .get_result()
            .unwrap_err();
        assert!(matches!(
            err,
            BuilderError::ValueOutOfRange { field: "rt", .. }
        ));
    }

    #[test]
    fn test_zero_f_id_rejected() {
        assert!(FeatureBuilder::default().f_id(0).is_err());
    }

    #[test]
    fn test_intensity_above_max_rejected() {
        let err = FeatureBuilder::default()
            .intensity(2000.0)
            .unwrap()
            .rel_intensity(1000.0)
            .unwrap_err();
        assert!(matches!(
            err,
            BuilderError::ValueOutOfRange {
                field: "rel_intensity",
                ..
            }
        ));
    }

    #[test]
    fn test_rt_stop_before_start_rejected() {
        let err = FeatureBuilder::default()
            .rt_start(5.0)
            .unwrap()
            .rt_stop(4.0)
            .unwrap_err();
        assert!(matches!(
            err,
            BuilderError::ValueOutOfRange {
                field: "rt_stop",
                ..
            }
        ));
    }

    #[test]
    fn test_match_provenance() {
        let a = Match::new("lib0", "quercetin", "lib.mgf", "modified cosine", 0.911, 100.0, 0.00004);
        let b = Match::new("lib0", "quercetin", "lib.mgf", "modified cosine", 0.7, 100.0, 0.2);
        assert_eq!(a.score, 0.91);
        assert_eq!(a.mz_diff, 0.0);
        assert!(a.same_provenance(&b));
    }
}

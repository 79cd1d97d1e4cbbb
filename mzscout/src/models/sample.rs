use super::feature::FeatureRecord;
use super::set_field::SetField;
use crate::errors::BuilderError;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    BTreeMap,
    BTreeSet,
};

/// One analyzed specimen: its per-sample ("specific") features plus the
/// intensity/area maxima aggregated over its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub s_id: String,
    pub features: BTreeMap<u32, FeatureRecord>,
    pub max_intensity: f64,
    pub max_area: f64,
    /// Derived from `features`; kept as its own set for cheap membership
    /// checks downstream.
    pub feature_ids: BTreeSet<u32>,
}

/// Fluent, single-use, order-validated accumulator for [`SampleRecord`].
///
/// `feature_ids` is derived from the feature map and therefore requires
/// `features` to be set first. `get_result` consumes the builder.
#[derive(Debug, Default)]
pub struct SampleBuilder {
    s_id: SetField<String>,
    features: SetField<BTreeMap<u32, FeatureRecord>>,
    max_intensity: SetField<f64>,
    max_area: SetField<f64>,
    feature_ids: SetField<BTreeSet<u32>>,
}

impl SampleBuilder {
    pub fn s_id(mut self, s_id: impl Into<String>) -> Result<Self, BuilderError> {
        let s_id = s_id.into();
        if s_id.is_empty() {
            return Err(BuilderError::EmptyField { field: "s_id" });
        }
        self.s_id = SetField::Some(s_id);
        Ok(self)
    }

    /// The per-sample feature map. May be empty: a sample whose every row
    /// was filtered out is still a valid specimen.
    pub fn features(mut self, features: BTreeMap<u32, FeatureRecord>) -> Self {
        self.features = SetField::Some(features);
        self
    }

    /// Derived: the key set of `features`. Requires `features`.
    pub fn feature_ids(mut self) -> Result<Self, BuilderError> {
        let ids = match &self.features {
            SetField::Some(features) => features.keys().copied().collect(),
            SetField::None => {
                return Err(BuilderError::ExpectedSetField {
                    field: "features",
                    context: "feature_ids",
                });
            }
        };
        self.feature_ids = SetField::Some(ids);
        Ok(self)
    }

    pub fn max_intensity(mut self, max_intensity: f64) -> Result<Self, BuilderError> {
        if !max_intensity.is_finite() || max_intensity < 0.0 {
            return Err(BuilderError::ValueOutOfRange {
                field: "max_intensity",
                value: max_intensity,
                allowed: "finite and >= 0",
            });
        }
        self.max_intensity = SetField::Some(max_intensity);
        Ok(self)
    }

    pub fn max_area(mut self, max_area: f64) -> Result<Self, BuilderError> {
        if !max_area.is_finite() || max_area < 0.0 {
            return Err(BuilderError::ValueOutOfRange {
                field: "max_area",
                value: max_area,
                allowed: "finite and >= 0",
            });
        }
        self.max_area = SetField::Some(max_area);
        Ok(self)
    }

    pub fn get_result(self) -> Result<SampleRecord, BuilderError> {
        Ok(SampleRecord {
            s_id: self.s_id.expect_some("s_id", "get_result")?,
            features: self.features.expect_some("features", "get_result")?,
            max_intensity: self
                .max_intensity
                .expect_some("max_intensity", "get_result")?,
            max_area: self.max_area.expect_some("max_area", "get_result")?,
            feature_ids: self.feature_ids.expect_some("feature_ids", "get_result")?,
        })
    }
}

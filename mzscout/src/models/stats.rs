use super::spectrum::LibraryEntry;
use crate::data_sources::peaktable::Peaktable;
use crate::errors::TableReadingError;
use crate::utils::round2;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Window applied to the run-relative intensity and area of every row
/// before anything else sees it. Rows outside the window never become
/// features. Both windows are inclusive and default to "keep everything".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub rel_intensity_range: (f64, f64),
    pub rel_area_range: (f64, f64),
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            rel_intensity_range: (0.0, 1.0),
            rel_area_range: (0.0, 1.0),
        }
    }
}

/// Run-wide aggregates, derived once per parse by a full table scan and
/// mutated afterwards only by the filtering stages (which narrow
/// `active_features` and fill the bookkeeping sets).
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub rt_min: f64,
    pub rt_max: f64,
    pub rt_range: f64,
    /// Global row maxima; normalization base for the general features and
    /// for the initial window filter.
    pub max_intensity: f64,
    pub max_area: f64,
    pub samples: BTreeSet<String>,
    /// Feature ids retained by the initial relative-intensity/area window.
    pub features: BTreeSet<u32>,
    /// Subset of `features` still eligible for expensive annotation.
    /// Starts equal to `features`.
    pub active_features: BTreeSet<u32>,
    pub spectral_library: Vec<LibraryEntry>,
    pub groups: BTreeSet<String>,
    pub cliques: BTreeSet<String>,
    pub phenotypes: BTreeSet<String>,
    pub blank: BTreeSet<u32>,
    pub int_removed: BTreeSet<u32>,
    pub annot_removed: BTreeSet<u32>,
}

fn ratio(value: f64, max: f64) -> f64 {
    if max > 0.0 { value / max } else { 0.0 }
}

fn within(value: f64, range: (f64, f64)) -> bool {
    value >= range.0 && value <= range.1
}

impl RunStats {
    pub fn from_table(
        table: &Peaktable,
        filters: &FilterSettings,
    ) -> Result<Self, TableReadingError> {
        if table.rows.is_empty() {
            return Err(TableReadingError::EmptyTable);
        }

        let mut rt_min = f64::INFINITY;
        let mut rt_max = f64::NEG_INFINITY;
        let mut max_intensity: f64 = 0.0;
        let mut max_area: f64 = 0.0;
        for row in &table.rows {
            rt_min = rt_min.min(row.rt_start);
            rt_max = rt_max.max(row.rt_stop);
            max_intensity = max_intensity.max(row.height);
            max_area = max_area.max(row.area);
        }

        let mut features = BTreeSet::new();
        for row in &table.rows {
            let rel_intensity = ratio(row.height, max_intensity);
            let rel_area = ratio(row.area, max_area);
            if within(rel_intensity, filters.rel_intensity_range)
                && within(rel_area, filters.rel_area_range)
            {
                features.insert(row.id);
            } else {
                debug!(
                    "feature {} outside the relative intensity/area window, dropped",
                    row.id
                );
            }
        }

        Ok(Self {
            rt_min,
            rt_max,
            rt_range: round2(rt_max - rt_min),
            max_intensity,
            max_area,
            samples: table.samples.iter().cloned().collect(),
            active_features: features.clone(),
            features,
            ..Self::default()
        })
    }
}

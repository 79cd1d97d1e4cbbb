use crate::data_sources::peaktable::{
    Peaktable,
    PeaktableRow,
    SampleMeasurement,
};
use crate::errors::BuilderError;
use crate::models::{
    FeatureBuilder,
    FeatureRecord,
    RunStats,
    SampleBuilder,
    SampleRecord,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Fixed recipe for the cross-sample ("general") feature of one row.
/// Relative metrics are normalized against the run-wide maxima carried in
/// [`RunStats`].
pub struct GeneralFeatureDirector;

impl GeneralFeatureDirector {
    pub fn direct(row: &PeaktableRow, stats: &RunStats) -> Result<FeatureRecord, BuilderError> {
        let samples = row
            .detected_samples()
            .map(|s| s.to_string())
            .collect();
        FeatureBuilder::default()
            .f_id(row.id)?
            .mz(row.mz)?
            .rt(row.rt)?
            .rt_start(row.rt_start)?
            .rt_stop(row.rt_stop)?
            .rt_range()?
            .intensity(row.height)?
            .rel_intensity(stats.max_intensity)?
            .area(row.area)?
            .rel_area(stats.max_area)?
            .samples(samples)
            .get_result()
    }
}

/// Per-sample intensity/area maxima: the pass-1 aggregate that every
/// specific feature of that sample is normalized against. Specific
/// construction takes this by reference, so pass 2 cannot start before
/// pass 1 produced the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleMaxima {
    pub max_intensity: f64,
    pub max_area: f64,
}

impl SampleMaxima {
    /// Pass 1: scan all of a sample's detected rows. Runs over the
    /// unfiltered table, so every ratio computed in pass 2 lands in [0, 1].
    pub fn scan(table: &Peaktable, s_id: &str) -> Self {
        let mut max_intensity: f64 = 0.0;
        let mut max_area: f64 = 0.0;
        for row in &table.rows {
            if let Some(m) = row.measurement(s_id) {
                if m.is_detected() {
                    max_intensity = max_intensity.max(m.intensity);
                    max_area = max_area.max(m.area);
                }
            }
        }
        Self {
            max_intensity,
            max_area,
        }
    }
}

/// Fixed recipe for the per-sample ("specific") feature of one row.
pub struct SpecificFeatureDirector;

impl SpecificFeatureDirector {
    pub fn direct(
        row: &PeaktableRow,
        s_id: &str,
        measurement: &SampleMeasurement,
        maxima: &SampleMaxima,
    ) -> Result<FeatureRecord, BuilderError> {
        FeatureBuilder::default()
            .f_id(row.id)?
            .mz(row.mz)?
            .rt(measurement.rt)?
            .rt_start(measurement.rt_start)?
            .rt_stop(measurement.rt_stop)?
            .rt_range()?
            .fwhm(measurement.fwhm)?
            .intensity(measurement.intensity)?
            .rel_intensity(maxima.max_intensity)?
            .area(measurement.area)?
            .rel_area(maxima.max_area)?
            .samples([s_id.to_string()].into())
            .get_result()
    }
}

/// Fixed recipe for one sample: pass 1 (maxima) strictly before pass 2
/// (per-row specific features), then assembly through [`SampleBuilder`].
pub struct SamplesDirector;

impl SamplesDirector {
    pub fn direct(
        table: &Peaktable,
        s_id: &str,
        stats: &RunStats,
    ) -> Result<SampleRecord, BuilderError> {
        let maxima = SampleMaxima::scan(table, s_id);

        let mut features: BTreeMap<u32, FeatureRecord> = BTreeMap::new();
        for row in &table.rows {
            if !stats.features.contains(&row.id) {
                debug!("row {} not in the retained feature set, skipping", row.id);
                continue;
            }
            let Some(measurement) = row.measurement(s_id) else {
                continue;
            };
            if !measurement.is_detected() {
                debug!("feature {} not detected in sample {}, skipping", row.id, s_id);
                continue;
            }
            let specific = SpecificFeatureDirector::direct(row, s_id, measurement, &maxima)?;
            features.insert(row.id, specific);
        }

        SampleBuilder::default()
            .s_id(s_id)?
            .features(features)
            .feature_ids()?
            .max_intensity(maxima.max_intensity)?
            .max_area(maxima.max_area)?
            .get_result()
    }
}

use super::directors::{
    GeneralFeatureDirector,
    SamplesDirector,
};
use crate::data_sources::peaktable::{
    Peaktable,
    PeaktableFormat,
};
use crate::errors::Result;
use crate::models::{
    FeatureRecord,
    FilterSettings,
    RunStats,
    SampleRecord,
};
use crate::storage::Repository;
use tracing::{
    debug,
    info,
};

/// Everything one parse produces: the run aggregates plus the two stores.
#[derive(Debug)]
pub struct ParsedRun {
    pub stats: RunStats,
    pub features: Repository<u32, FeatureRecord>,
    pub samples: Repository<String, SampleRecord>,
}

/// Top-level two-pass orchestration over one peaktable.
pub struct PeaktableParser<'a> {
    table: &'a Peaktable,
    filters: &'a FilterSettings,
}

impl<'a> PeaktableParser<'a> {
    pub fn new(table: &'a Peaktable, filters: &'a FilterSettings) -> Self {
        Self { table, filters }
    }

    pub fn parse(&self, format: PeaktableFormat) -> Result<ParsedRun> {
        match format {
            PeaktableFormat::Mzmine3 => self.parse_mzmine3(),
        }
    }

    fn parse_mzmine3(&self) -> Result<ParsedRun> {
        // Scan 1: run-wide aggregates and the retained feature-id set.
        let stats = RunStats::from_table(self.table, self.filters)?;

        // Scan 2: general features, only for retained rows.
        let mut features = Repository::new();
        for row in &self.table.rows {
            if !stats.features.contains(&row.id) {
                debug!("row {} dropped by the initial window filter", row.id);
                continue;
            }
            features.add(row.id, GeneralFeatureDirector::direct(row, &stats)?)?;
        }

        // Scan 3: one sample record per sample id, each with its own
        // maxima pass strictly before its per-row pass.
        let mut samples = Repository::new();
        for s_id in &stats.samples {
            samples.add(s_id.clone(), SamplesDirector::direct(self.table, s_id, &stats)?)?;
        }

        info!(
            "parsed peaktable: {} features, {} samples, rt span {:.2}-{:.2}",
            features.len(),
            samples.len(),
            stats.rt_min,
            stats.rt_max,
        );
        Ok(ParsedRun {
            stats,
            features,
            samples,
        })
    }
}

use super::config::{
    Config,
    OutputConfig,
};
use super::errors::CliError;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use mzscout::annotation::{
    QuerySpectrum,
    SimilarityOracle,
    SimilarityScore,
};
use mzscout::data_sources::{
    attach_spectra,
    read_library_path,
    read_mgf_path,
};
use mzscout::errors::MzScoutError;
use mzscout::models::LibraryEntry;
use mzscout::{
    AnnotationMatcher,
    FeatureRecord,
    ParsedRun,
    Peaktable,
    PeaktableParser,
    Repository,
    RunStats,
    SampleRecord,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
    Write,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{
    info,
    warn,
};

fn default_algorithm() -> String {
    "modified cosine".to_string()
}

/// Similarity scores produced by an external scorer, keyed by feature id.
/// Each score list aligns with the entry order of the library file the
/// scorer was run against, so the two files must come from the same run.
/// Features without an entry score zero against the whole library.
#[derive(Debug, Deserialize)]
pub struct PrecomputedScores {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    pub scores: HashMap<u32, Vec<SimilarityScore>>,
}

impl PrecomputedScores {
    pub fn from_path(path: &Path) -> Result<Self, MzScoutError> {
        let file = File::open(path).map_err(|e| MzScoutError::Io {
            source: e,
            path: Some(path.to_path_buf()),
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

impl SimilarityOracle for PrecomputedScores {
    fn algorithm(&self) -> &str {
        &self.algorithm
    }

    fn score_batch(
        &self,
        queries: &[QuerySpectrum],
        library: &[LibraryEntry],
        _fragment_tol: f64,
    ) -> Vec<Vec<SimilarityScore>> {
        queries
            .iter()
            .map(|query| match self.scores.get(&query.f_id) {
                Some(scores) => scores.clone(),
                None => {
                    vec![
                        SimilarityScore {
                            score: 0.0,
                            matched_peaks: 0,
                        };
                        library.len()
                    ]
                }
            })
            .collect()
    }
}

pub fn process_run(config: &Config, output: &OutputConfig) -> Result<(), CliError> {
    let start = Instant::now();

    let table =
        Peaktable::from_csv_path(&config.input.peaktable).map_err(MzScoutError::from)?;
    info!(
        "Read peaktable with {} samples and {} rows from {:?}",
        table.samples.len(),
        table.rows.len(),
        config.input.peaktable
    );

    let parsed = PeaktableParser::new(&table, &config.filters).parse(config.input.format)?;
    let ParsedRun {
        mut stats,
        mut features,
        samples,
    } = parsed;
    info!(
        "Retained {} of {} features across {} samples",
        stats.active_features.len(),
        stats.features.len(),
        stats.samples.len()
    );

    if let Some(spectra_path) = &config.input.spectra {
        let spectra = read_mgf_path(spectra_path).map_err(MzScoutError::from)?;
        attach_spectra(&mut features, spectra)?;
    }

    let features = match (&config.input.library, &config.input.scores) {
        (Some(library_path), Some(scores_path)) => {
            stats.spectral_library =
                read_library_path(library_path).map_err(MzScoutError::from)?;
            info!(
                "Read {} library entries from {:?}",
                stats.spectral_library.len(),
                library_path
            );
            let oracle = Arc::new(PrecomputedScores::from_path(scores_path)?);
            let mut settings = config.annotation.clone();
            settings.library = library_path.to_string_lossy().to_string();
            let matcher = AnnotationMatcher::new(settings)?;
            matcher.annotate(oracle, &stats, features)?
        }
        (None, None) => {
            info!("No spectral library configured, skipping annotation");
            features
        }
        _ => {
            warn!(
                "Annotation needs both a library and a scores file, skipping annotation"
            );
            features
        }
    };

    write_outputs(&output.directory, &stats, &features, &samples)?;
    println!(
        "Processed {} features and {} samples in {:?}",
        features.len(),
        samples.len(),
        start.elapsed()
    );
    Ok(())
}

fn write_outputs(
    directory: &Path,
    stats: &RunStats,
    features: &Repository<u32, FeatureRecord>,
    samples: &Repository<String, SampleRecord>,
) -> Result<(), CliError> {
    let io_err = |path: &Path| {
        let path = path.to_string_lossy().to_string();
        move |e: std::io::Error| CliError::Io {
            source: e.to_string(),
            path: Some(path.clone()),
        }
    };

    // One feature per line so downstream tools can stream the file.
    let features_path = directory.join("features.ndjson");
    let file = File::create(&features_path).map_err(io_err(&features_path))?;
    let mut writer = BufWriter::new(file);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}",
    )
    .unwrap();
    let bar = ProgressBar::new(features.len() as u64).with_style(style);
    for (_, feature) in features.iter() {
        serde_json::to_writer(&mut writer, feature).map_err(MzScoutError::from)?;
        writer.write_all(b"\n").map_err(io_err(&features_path))?;
        bar.inc(1);
    }
    bar.finish_and_clear();
    writer.flush().map_err(io_err(&features_path))?;

    let samples_path = directory.join("samples.json");
    let file = File::create(&samples_path).map_err(io_err(&samples_path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), samples)
        .map_err(MzScoutError::from)?;

    let stats_path = directory.join("stats.json");
    let file = File::create(&stats_path).map_err(io_err(&stats_path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), stats).map_err(MzScoutError::from)?;

    info!("Wrote outputs to {:?}", directory);
    Ok(())
}

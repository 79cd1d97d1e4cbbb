use crate::errors::{
    MzScoutError,
    SpectraReadingError,
};
use crate::models::{
    FeatureRecord,
    Spectrum,
};
use crate::storage::Repository;
use std::collections::{
    BTreeMap,
    HashSet,
};
use std::io::{
    BufRead,
    BufReader,
    Read,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::{
    debug,
    info,
};

/// A fragmentation spectrum tagged with the feature id it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedSpectrum {
    pub f_id: u32,
    pub spectrum: Spectrum,
}

/// One `BEGIN IONS` / `END IONS` block: uppercased `KEY=value` tags plus
/// the peak list.
pub(crate) struct MgfBlock {
    pub tags: BTreeMap<String, String>,
    pub peaks_mz: Vec<f64>,
    pub peaks_intensity: Vec<f64>,
    pub index: usize,
}

impl MgfBlock {
    /// `PEPMASS` lines may carry "mass intensity"; only the mass counts.
    pub fn precursor_mz(&self) -> Result<f64, SpectraReadingError> {
        let raw = self
            .tags
            .get("PEPMASS")
            .ok_or(SpectraReadingError::MissingTag {
                tag: "PEPMASS",
                block: self.index,
            })?;
        let first = raw.split_whitespace().next().unwrap_or_default();
        first
            .parse::<f64>()
            .map_err(|_| SpectraReadingError::MalformedTag {
                tag: "PEPMASS",
                block: self.index,
                value: raw.clone(),
            })
    }

    pub fn into_spectrum(self, precursor_mz: f64) -> Spectrum {
        Spectrum::new(self.peaks_mz, self.peaks_intensity, precursor_mz)
    }
}

pub(crate) fn read_blocks<R: BufRead>(reader: R) -> Result<Vec<MgfBlock>, SpectraReadingError> {
    let mut blocks: Vec<MgfBlock> = Vec::new();
    let mut current: Option<MgfBlock> = None;

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SpectraReadingError::Io {
            source: e,
            path: PathBuf::new(),
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "BEGIN IONS" {
            current = Some(MgfBlock {
                tags: BTreeMap::new(),
                peaks_mz: Vec::new(),
                peaks_intensity: Vec::new(),
                index: blocks.len(),
            });
            continue;
        }
        if line == "END IONS" {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            continue;
        }
        // Anything outside a block (file headers, comments) is ignored.
        let Some(block) = current.as_mut() else {
            continue;
        };
        if let Some((key, value)) = line.split_once('=') {
            block
                .tags
                .insert(key.trim().to_uppercase(), value.trim().to_string());
            continue;
        }
        let mut parts = line.split_whitespace();
        let mz = parts.next().and_then(|x| x.parse::<f64>().ok());
        let intensity = parts.next().and_then(|x| x.parse::<f64>().ok());
        match (mz, intensity) {
            (Some(mz), Some(intensity)) => {
                block.peaks_mz.push(mz);
                block.peaks_intensity.push(intensity);
            }
            _ => {
                return Err(SpectraReadingError::MalformedPeak {
                    line: line_idx + 1,
                    value: line.to_string(),
                });
            }
        }
    }

    Ok(blocks)
}

/// Read feature-tagged fragmentation spectra. Each block must carry a
/// `FEATURE_ID` (or `SCANS`) tag and a `PEPMASS`; at most one spectrum
/// per feature id.
pub fn read_mgf<R: Read>(reader: R) -> Result<Vec<TaggedSpectrum>, SpectraReadingError> {
    let blocks = read_blocks(BufReader::new(reader))?;
    let mut spectra = Vec::with_capacity(blocks.len());
    let mut seen: HashSet<u32> = HashSet::new();

    for block in blocks {
        let raw_id = block
            .tags
            .get("FEATURE_ID")
            .or_else(|| block.tags.get("SCANS"))
            .ok_or(SpectraReadingError::MissingTag {
                tag: "FEATURE_ID",
                block: block.index,
            })?;
        let f_id = match raw_id.parse::<u32>() {
            Ok(id) if id > 0 => id,
            _ => {
                return Err(SpectraReadingError::MalformedTag {
                    tag: "FEATURE_ID",
                    block: block.index,
                    value: raw_id.clone(),
                });
            }
        };
        if !seen.insert(f_id) {
            return Err(SpectraReadingError::DuplicateSpectrum { f_id });
        }
        let precursor_mz = block.precursor_mz()?;
        spectra.push(TaggedSpectrum {
            f_id,
            spectrum: block.into_spectrum(precursor_mz),
        });
    }

    Ok(spectra)
}

pub fn read_mgf_path(path: &Path) -> Result<Vec<TaggedSpectrum>, SpectraReadingError> {
    let file = std::fs::File::open(path).map_err(|e| SpectraReadingError::Io {
        source: e,
        path: PathBuf::from(path),
    })?;
    read_mgf(file)
}

/// Attach spectra to their owning features through the checkout/checkin
/// discipline. Spectra whose feature id is not in the store were dropped
/// by the initial filtering; skipping them is deliberate, not an error.
pub fn attach_spectra(
    features: &mut Repository<u32, FeatureRecord>,
    spectra: Vec<TaggedSpectrum>,
) -> Result<usize, MzScoutError> {
    let mut attached = 0;
    for tagged in spectra {
        if !features.contains(&tagged.f_id) {
            debug!(
                "spectrum for feature {} has no retained feature, skipping",
                tagged.f_id
            );
            continue;
        }
        let mut feature = features.get(&tagged.f_id)?;
        if feature.spectrum.is_some() {
            return Err(SpectraReadingError::DuplicateSpectrum { f_id: tagged.f_id }.into());
        }
        feature.spectrum = Some(tagged.spectrum);
        features.modify(tagged.f_id, feature)?;
        attached += 1;
    }
    info!("attached {} fragmentation spectra", attached);
    Ok(attached)
}

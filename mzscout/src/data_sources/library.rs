use super::mgf::read_blocks;
use crate::errors::SpectraReadingError;
use crate::models::LibraryEntry;
use std::collections::HashSet;
use std::io::{
    BufReader,
    Read,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::info;

/// Read a spectral library: the same block syntax as the query MGF, with
/// `NAME` and `EXACTMASS` tags instead of a feature id. File order is
/// preserved; it is the stable tie-break order during annotation.
///
/// Entry ids come from the `SPECTRUMID` tag when present, else from the
/// block position.
pub fn read_library<R: Read>(reader: R) -> Result<Vec<LibraryEntry>, SpectraReadingError> {
    let blocks = read_blocks(BufReader::new(reader))?;
    let mut entries = Vec::with_capacity(blocks.len());
    let mut seen: HashSet<String> = HashSet::new();

    for block in blocks {
        let id = match block.tags.get("SPECTRUMID") {
            Some(tag) => tag.clone(),
            None => block.index.to_string(),
        };
        if !seen.insert(id.clone()) {
            return Err(SpectraReadingError::DuplicateLibraryEntry { id });
        }
        let name = block
            .tags
            .get("NAME")
            .ok_or(SpectraReadingError::MissingTag {
                tag: "NAME",
                block: block.index,
            })?
            .clone();
        let raw_mass = block
            .tags
            .get("EXACTMASS")
            .ok_or(SpectraReadingError::MissingTag {
                tag: "EXACTMASS",
                block: block.index,
            })?;
        let exact_mass =
            raw_mass
                .parse::<f64>()
                .map_err(|_| SpectraReadingError::MalformedTag {
                    tag: "EXACTMASS",
                    block: block.index,
                    value: raw_mass.clone(),
                })?;
        let precursor_mz = block.precursor_mz()?;
        entries.push(LibraryEntry {
            id,
            name,
            exact_mass,
            spectrum: block.into_spectrum(precursor_mz),
        });
    }

    info!("loaded {} spectral library entries", entries.len());
    Ok(entries)
}

pub fn read_library_path(path: &Path) -> Result<Vec<LibraryEntry>, SpectraReadingError> {
    let file = std::fs::File::open(path).map_err(|e| SpectraReadingError::Io {
        source: e,
        path: PathBuf::from(path),
    })?;
    read_library(file)
}

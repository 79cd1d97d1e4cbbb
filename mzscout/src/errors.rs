use std::path::PathBuf;

/// Errors raised by [`crate::storage::Repository`].
///
/// Keys are reported as strings so that one error type covers every key
/// type the stores use (feature ids, sample ids).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    KeyAlreadyPresent { key: String },
    KeyNotFound { key: String },
}

/// Errors raised by the record builders.
///
/// `ExpectedSetField` is the construction-order violation: a derived-value
/// setter (or the finalizer) needed a field that was never set. These are
/// programming errors on the caller's side and are propagated all the way
/// up to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum BuilderError {
    ExpectedSetField {
        field: &'static str,
        context: &'static str,
    },
    ValueOutOfRange {
        field: &'static str,
        value: f64,
        allowed: &'static str,
    },
    EmptyField {
        field: &'static str,
    },
}

/// Input-shape violations in the peaktable. Fatal to the parse step; the
/// message names the offending element.
#[derive(Debug)]
pub enum TableReadingError {
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    Csv {
        source: csv::Error,
    },
    MissingColumn {
        column: String,
    },
    DuplicateFeatureId {
        id: u32,
    },
    MalformedCell {
        column: String,
        row: usize,
        value: String,
    },
    EmptyTable,
}

/// Input-shape violations in the fragmentation-spectrum and
/// spectral-library files.
#[derive(Debug)]
pub enum SpectraReadingError {
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    MissingTag {
        tag: &'static str,
        block: usize,
    },
    MalformedTag {
        tag: &'static str,
        block: usize,
        value: String,
    },
    MalformedPeak {
        line: usize,
        value: String,
    },
    DuplicateSpectrum {
        f_id: u32,
    },
    DuplicateLibraryEntry {
        id: String,
    },
}

#[derive(Debug)]
pub enum MzScoutError {
    Storage(StorageError),
    Builder(BuilderError),
    TableReading(TableReadingError),
    SpectraReading(SpectraReadingError),
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    ParseError {
        msg: String,
    },
}

impl std::fmt::Display for MzScoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for MzScoutError {}

pub type Result<T> = std::result::Result<T, MzScoutError>;

impl From<StorageError> for MzScoutError {
    fn from(x: StorageError) -> Self {
        Self::Storage(x)
    }
}

impl From<BuilderError> for MzScoutError {
    fn from(x: BuilderError) -> Self {
        Self::Builder(x)
    }
}

impl From<TableReadingError> for MzScoutError {
    fn from(x: TableReadingError) -> Self {
        Self::TableReading(x)
    }
}

impl From<SpectraReadingError> for MzScoutError {
    fn from(x: SpectraReadingError) -> Self {
        Self::SpectraReading(x)
    }
}

impl From<csv::Error> for MzScoutError {
    fn from(x: csv::Error) -> Self {
        Self::TableReading(TableReadingError::Csv { source: x })
    }
}

impl From<serde_json::Error> for MzScoutError {
    fn from(val: serde_json::Error) -> Self {
        MzScoutError::ParseError {
            msg: val.to_string(),
        }
    }
}

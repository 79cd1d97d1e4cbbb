use crate::errors::TableReadingError;
use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    BTreeMap,
    HashSet,
};
use std::io::Read;
use std::path::{
    Path,
    PathBuf,
};

/// Sentinel value of the per-sample detection-state column. Only rows
/// carrying it count as detected in that sample.
pub const DETECTED: &str = "DETECTED";

/// Declared layout of the input table. One layout is modeled; the enum is
/// the dispatch seam for adding more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeaktableFormat {
    #[serde(rename = "mzmine3")]
    Mzmine3,
}

/// The per-sample slice of one peaktable row, parsed from the
/// `datafile:<sample_id>:<field>` column group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMeasurement {
    /// `intensity_range:max` column.
    pub intensity: f64,
    pub area: f64,
    pub rt: f64,
    pub rt_start: f64,
    pub rt_stop: f64,
    pub fwhm: f64,
    /// Categorical detection-state field, compared against [`DETECTED`].
    pub state: String,
}

impl SampleMeasurement {
    pub fn is_detected(&self) -> bool {
        self.state == DETECTED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeaktableRow {
    pub id: u32,
    pub mz: f64,
    pub rt: f64,
    pub rt_start: f64,
    pub rt_stop: f64,
    pub height: f64,
    pub area: f64,
    pub measurements: BTreeMap<String, SampleMeasurement>,
}

impl PeaktableRow {
    pub fn measurement(&self, s_id: &str) -> Option<&SampleMeasurement> {
        self.measurements.get(s_id)
    }

    pub fn detected_in(&self, s_id: &str) -> bool {
        self.measurement(s_id).is_some_and(|m| m.is_detected())
    }

    pub fn detected_samples(&self) -> impl Iterator<Item = &str> {
        self.measurements
            .iter()
            .filter(|(_, m)| m.is_detected())
            .map(|(s_id, _)| s_id.as_str())
    }
}

/// In-memory model of the tabular peak list: one row per feature,
/// sample ids in column-appearance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peaktable {
    pub samples: Vec<String>,
    pub rows: Vec<PeaktableRow>,
}

const AGGREGATE_COLUMNS: [&str; 7] = [
    "id",
    "mz",
    "rt",
    "rt_range:min",
    "rt_range:max",
    "height",
    "area",
];

const SAMPLE_FIELDS: [&str; 7] = [
    "intensity_range:max",
    "area",
    "rt",
    "rt_range:min",
    "rt_range:max",
    "fwhm",
    "feature_state",
];

impl Peaktable {
    pub fn from_csv_path(path: &Path) -> Result<Self, TableReadingError> {
        let file = std::fs::File::open(path).map_err(|e| TableReadingError::Io {
            source: e,
            path: Some(PathBuf::from(path)),
        })?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableReadingError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader
            .headers()
            .map_err(|e| TableReadingError::Csv { source: e })?
            .clone();

        let mut column_index: BTreeMap<&str, usize> = BTreeMap::new();
        for (idx, name) in headers.iter().enumerate() {
            column_index.insert(name, idx);
        }

        let mut aggregate_cols: BTreeMap<&'static str, usize> = BTreeMap::new();
        for column in AGGREGATE_COLUMNS {
            match column_index.get(column) {
                Some(idx) => {
                    aggregate_cols.insert(column, *idx);
                }
                None => {
                    return Err(TableReadingError::MissingColumn {
                        column: column.to_string(),
                    });
                }
            }
        }

        // `datafile:<sample_id>:<field>` column group, one group per sample.
        let sample_col_re = Regex::new(r"^datafile:([^:]+):(.+)$").unwrap();
        let mut samples: Vec<String> = Vec::new();
        let mut sample_cols: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for (idx, name) in headers.iter().enumerate() {
            if let Some(caps) = sample_col_re.captures(name) {
                let s_id = caps[1].to_string();
                let field = caps[2].to_string();
                if !SAMPLE_FIELDS.contains(&field.as_str()) {
                    continue;
                }
                if !sample_cols.contains_key(&s_id) {
                    samples.push(s_id.clone());
                }
                sample_cols.entry(s_id).or_default().insert(field, idx);
            }
        }
        for s_id in &samples {
            let fields = &sample_cols[s_id];
            for field in SAMPLE_FIELDS {
                if !fields.contains_key(field) {
                    return Err(TableReadingError::MissingColumn {
                        column: format!("datafile:{}:{}", s_id, field),
                    });
                }
            }
        }

        let mut rows = Vec::new();
        let mut seen_ids: HashSet<u32> = HashSet::new();
        for (row_idx, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| TableReadingError::Csv { source: e })?;
            let row_number = row_idx + 1;

            let id = parse_id_cell(&record, aggregate_cols["id"], "id", row_number)?;
            if !seen_ids.insert(id) {
                return Err(TableReadingError::DuplicateFeatureId { id });
            }

            let mut measurements = BTreeMap::new();
            for s_id in &samples {
                let fields = &sample_cols[s_id];
                let cell = |field: &str| -> Result<f64, TableReadingError> {
                    parse_numeric_cell(
                        &record,
                        fields[field],
                        &format!("datafile:{}:{}", s_id, field),
                        row_number,
                    )
                };
                let state = record
                    .get(fields["feature_state"])
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                measurements.insert(
                    s_id.clone(),
                    SampleMeasurement {
                        intensity: cell("intensity_range:max")?,
                        area: cell("area")?,
                        rt: cell("rt")?,
                        rt_start: cell("rt_range:min")?,
                        rt_stop: cell("rt_range:max")?,
                        fwhm: cell("fwhm")?,
                        state,
                    },
                );
            }

            let cell = |column: &'static str| -> Result<f64, TableReadingError> {
                parse_numeric_cell(&record, aggregate_cols[column], column, row_number)
            };
            rows.push(PeaktableRow {
                id,
                mz: cell("mz")?,
                rt: cell("rt")?,
                rt_start: cell("rt_range:min")?,
                rt_stop: cell("rt_range:max")?,
                height: cell("height")?,
                area: cell("area")?,
                measurements,
            });
        }

        Ok(Self { samples, rows })
    }
}

fn parse_numeric_cell(
    record: &csv::StringRecord,
    idx: usize,
    column: &str,
    row: usize,
) -> Result<f64, TableReadingError> {
    let raw = record.get(idx).unwrap_or_default().trim();
    // Samples without a detection carry empty numeric cells.
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>()
        .map_err(|_| TableReadingError::MalformedCell {
            column: column.to_string(),
            row,
            value: raw.to_string(),
        })
}

fn parse_id_cell(
    record: &csv::StringRecord,
    idx: usize,
    column: &str,
    row: usize,
) -> Result<u32, TableReadingError> {
    let raw = record.get(idx).unwrap_or_default().trim();
    match raw.parse::<u32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(TableReadingError::MalformedCell {
            column: column.to_string(),
            row,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SAMPLE_TABLE: &str = "\
id,mz,rt,rt_range:min,rt_range:max,height,area,\
datafile:s1:intensity_range:max,datafile:s1:area,datafile:s1:rt,\
datafile:s1:rt_range:min,datafile:s1:rt_range:max,datafile:s1:fwhm,datafile:s1:feature_state,\
datafile:s2:intensity_range:max,datafile:s2:area,datafile:s2:rt,\
datafile:s2:rt_range:min,datafile:s2:rt_range:max,datafile:s2:fwhm,datafile:s2:feature_state
1,100.1,5.1,4.9,5.2,100,200,80,150,5.0,4.9,5.1,0.1,DETECTED,100,200,5.1,4.9,5.2,0.1,DETECTED
2,200.2,7.0,6.8,7.4,1000,2000,1000,2000,7.0,6.8,7.4,0.2,DETECTED,,,,,,,UNKNOWN
";

    #[test]
    fn test_parse_two_sample_table() {
        let table = Peaktable::from_csv_reader(TWO_SAMPLE_TABLE.as_bytes()).unwrap();
        assert_eq!(table.samples, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(table.rows.len(), 2);

        let first = &table.rows[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.mz, 100.1);
        assert!(first.detected_in("s1"));
        assert!(first.detected_in("s2"));
        assert_eq!(first.measurement("s1").unwrap().intensity, 80.0);

        let second = &table.rows[1];
        assert!(second.detected_in("s1"));
        assert!(!second.detected_in("s2"));
        assert_eq!(second.measurement("s2").unwrap().intensity, 0.0);
        assert_eq!(
            second.detected_samples().collect::<Vec<_>>(),
            vec!["s1"]
        );
    }

    #[test]
    fn test_missing_aggregate_column() {
        let csv = "id,mz,rt,rt_range:min,rt_range:max,height\n1,100.0,5.0,4.9,5.1,10\n";
        let err = Peaktable::from_csv_reader(csv.as_bytes()).unwrap_err();
        match err {
            TableReadingError::MissingColumn { column } => assert_eq!(column, "area"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_sample_column() {
        let csv = "id,mz,rt,rt_range:min,rt_range:max,height,area,\
datafile:s1:intensity_range:max\n1,100.0,5.0,4.9,5.1,10,20,30\n";
        let err = Peaktable::from_csv_reader(csv.as_bytes()).unwrap_err();
        match err {
            TableReadingError::MissingColumn { column } => {
                assert_eq!(column, "datafile:s1:area");
            }
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_feature_id() {
        let csv = "id,mz,rt,rt_range:min,rt_range:max,height,area\n\
1,100.0,5.0,4.9,5.1,10,20\n1,101.0,6.0,5.9,6.1,10,20\n";
        let err = Peaktable::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            TableReadingError::DuplicateFeatureId { id: 1 }
        ));
    }

    #[test]
    fn test_malformed_numeric_cell_names_column_and_row() {
        let csv = "id,mz,rt,rt_range:min,rt_range:max,height,area\n\
1,not_a_number,5.0,4.9,5.1,10,20\n";
        let err = Peaktable::from_csv_reader(csv.as_bytes()).unwrap_err();
        match err {
            TableReadingError::MalformedCell { column, row, value } => {
                assert_eq!(column, "mz");
                assert_eq!(row, 1);
                assert_eq!(value, "not_a_number");
            }
            other => panic!("expected MalformedCell, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_feature_id_rejected() {
        let csv = "id,mz,rt,rt_range:min,rt_range:max,height,area\n\
0,100.0,5.0,4.9,5.1,10,20\n";
        let err = Peaktable::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, TableReadingError::MalformedCell { .. }));
    }
}

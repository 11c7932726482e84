//! CSV case-count ingestion.
//!
//! Expected columns: `date` (YYYY-MM-DD), `new_cases`, `location` and an
//! optional `disease`. `cases` and `country` are accepted as aliases.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AnalysisError;
use crate::series::RawSample;

/// Diseases the service advertises to clients.
pub const SUPPORTED_DISEASES: &[&str] = &[
    "COVID-19",
    "Influenza",
    "Measles",
    "Dengue",
    "Malaria",
    "Tuberculosis",
];

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    #[serde(alias = "cases", default)]
    new_cases: Option<String>,
    #[serde(alias = "country")]
    location: String,
    #[serde(default)]
    disease: Option<String>,
}

/// One parsed CSV line.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub date: NaiveDate,
    pub region: String,
    pub disease: Option<String>,
    /// NaN when the cell was empty or not a number.
    pub cases: f64,
}

/// All rows of one CSV file.
#[derive(Debug, Clone, Default)]
pub struct CaseTable {
    records: Vec<CaseRecord>,
    has_disease: bool,
}

impl CaseTable {
    /// Parse CSV from any reader. Rows with an unreadable date or shape are
    /// skipped with a warning; unparsable counts become missing values.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, AnalysisError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| AnalysisError::DataNotFound(format!("unreadable CSV header: {e}")))?
            .clone();
        let has = |names: &[&str]| headers.iter().any(|h| names.contains(&h));
        for (names, label) in [
            (&["date"][..], "date"),
            (&["new_cases", "cases"][..], "new_cases"),
            (&["location", "country"][..], "location"),
        ] {
            if !has(names) {
                return Err(AnalysisError::DataNotFound(format!(
                    "CSV is missing the `{label}` column"
                )));
            }
        }
        let has_disease = has(&["disease"][..]);

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    skipped += 1;
                    warn!(line = line + 2, error = %e, "skipping malformed CSV row");
                    continue;
                }
            };
            let Ok(date) = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d") else {
                skipped += 1;
                warn!(line = line + 2, date = %row.date, "skipping CSV row with invalid date");
                continue;
            };
            let cases = row
                .new_cases
                .as_deref()
                .and_then(|c| c.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN);
            records.push(CaseRecord {
                date,
                region: row.location.trim().to_string(),
                disease: row
                    .disease
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
                cases,
            });
        }

        info!(rows = records.len(), skipped, has_disease, "parsed case CSV");
        Ok(Self {
            records,
            has_disease,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted, de-duplicated region names.
    pub fn regions(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.region.clone())
            .filter(|r| !r.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted disease names; empty when the file has no disease column.
    pub fn diseases(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| r.disease.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Samples for `region`, narrowed to `disease` when the file carries a
    /// disease column.
    pub fn series_for(
        &self,
        region: &str,
        disease: Option<&str>,
    ) -> Result<Vec<RawSample>, AnalysisError> {
        let in_region: Vec<&CaseRecord> =
            self.records.iter().filter(|r| r.region == region).collect();
        if in_region.is_empty() {
            return Err(AnalysisError::DataNotFound(format!(
                "no data found for region: {region}"
            )));
        }

        let selected: Vec<&CaseRecord> = match disease {
            Some(d) if self.has_disease => {
                let rows: Vec<&CaseRecord> = in_region
                    .into_iter()
                    .filter(|r| r.disease.as_deref() == Some(d))
                    .collect();
                if rows.is_empty() {
                    return Err(AnalysisError::DataNotFound(format!(
                        "no data found for disease: {d}"
                    )));
                }
                rows
            }
            _ => in_region,
        };

        Ok(selected
            .into_iter()
            .map(|r| RawSample::new(r.date, r.cases))
            .collect())
    }
}

/// Reads case CSVs from a fixed data directory.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    data_dir: PathBuf,
}

impl CsvLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Load `filename` from the data directory. Only bare file names are
    /// accepted.
    pub fn load(&self, filename: &str) -> Result<CaseTable, AnalysisError> {
        let name = Path::new(filename);
        if filename.is_empty() || name.file_name() != Some(name.as_os_str()) {
            return Err(AnalysisError::DataNotFound(format!(
                "invalid data file name: {filename}"
            )));
        }
        let path = self.data_dir.join(name);
        let file = std::fs::File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                AnalysisError::DataNotFound(format!("data file not found: {}", path.display()))
            }
            _ => AnalysisError::Internal(format!("cannot open {}: {e}", path.display())),
        })?;
        info!(path = %path.display(), "loading case data");
        CaseTable::from_reader(io::BufReader::new(file))
    }
}

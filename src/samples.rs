//! Loading interface rate samples from CSV files.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Columns every sample file carries, in file order.
pub const DATA_COLUMNS: [&str; 7] = [
    "time",
    "device",
    "interface",
    "interface_speed",
    "sample_type",
    "d_octets_in",
    "d_octets_out",
];

/// Aggregation window a sample row represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Min,
    Avg,
    Max,
}

impl SampleType {
    /// Order in which series are drawn onto a chart.
    pub const DRAW_ORDER: [SampleType; 3] = [SampleType::Max, SampleType::Avg, SampleType::Min];

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::Min => "min",
            SampleType::Avg => "avg",
            SampleType::Max => "max",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported sample, one per CSV record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SampleRow {
    /// Sample time as written in the file
    pub time: String,
    pub device: String,
    pub interface: String,
    /// Link speed reported alongside the sample, blank when unknown
    pub interface_speed: Option<f64>,
    pub sample_type: SampleType,
    /// Inbound octets over the sample window; NaN when blank
    #[serde(deserialize_with = "nan_if_blank")]
    pub d_octets_in: f64,
    /// Outbound octets over the sample window; NaN when blank
    #[serde(deserialize_with = "nan_if_blank")]
    pub d_octets_out: f64,
}

fn nan_if_blank<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Rows loaded from a sample file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleTable {
    pub rows: Vec<SampleRow>,
}

impl SampleTable {
    /// A table with the expected columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        &DATA_COLUMNS
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: missing column '{column}' in header", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("{}: bad record at line {line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },
}

/// Read every sample row from a CSV file with a header row.
pub fn load_samples<P: AsRef<Path>>(path: P) -> Result<SampleTable, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_samples(file, path)
}

/// Like [`load_samples`], but an unreadable file yields an empty table.
///
/// Only I/O failures are recovered; malformed content is still an error.
pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Result<SampleTable, LoadError> {
    match load_samples(path) {
        Ok(table) => Ok(table),
        Err(LoadError::Io { path, source }) => {
            tracing::error!("Unable to read {}: {}", path.display(), source);
            Ok(SampleTable::empty())
        }
        Err(e) => Err(e),
    }
}

fn read_samples<R: io::Read>(reader: R, path: &Path) -> Result<SampleTable, LoadError> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = match csv.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => return Err(classify(e, path)),
    };
    // Empty file: no header, no rows
    if headers.is_empty() {
        return Ok(SampleTable::empty());
    }
    for column in DATA_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(LoadError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    let mut rows = Vec::new();
    for record in csv.deserialize::<SampleRow>() {
        rows.push(record.map_err(|e| classify(e, path))?);
    }
    tracing::debug!("Loaded {} samples from {}", rows.len(), path.display());
    Ok(SampleTable { rows })
}

fn classify(err: csv::Error, path: &Path) -> LoadError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    if err.is_io_error() {
        LoadError::Io {
            path: path.to_path_buf(),
            source: io::Error::from(err),
        }
    } else {
        LoadError::Parse {
            path: path.to_path_buf(),
            line,
            source: err,
        }
    }
}

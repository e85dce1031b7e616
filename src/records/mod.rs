// Ticket records
// Loads the exported ticket table and turns each row into a sentence for embedding


use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Result, SupportError};

/// Canonical field names, in the order they are checked by [`normalize`]
pub const REQUIRED_FIELDS: [&str; 5] = ["title", "type", "assignee", "status", "description"];

/// A single row of the source table, keyed by canonical field name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value under a column name. The name is canonicalized, so
    /// `"Summary"` and `"\u{feff}Issue Type"` land on `title` and `type`.
    #[inline]
    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.fields.insert(canonical_field_name(column), value.into());
    }

    #[inline]
    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    #[inline]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    fn require(&self, field: &'static str) -> Result<&str> {
        self.get(field).ok_or(SupportError::MissingField { field })
    }
}

/// Natural-language rendering of a [`Record`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sentence(String);

impl Sentence {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Sentence {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sentence {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What to do with a record that lacks a required field while building an index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRecordPolicy {
    #[default]
    Abort,
    Skip,
}

/// Map a header name onto the canonical field it feeds.
///
/// Issue-tracker exports prefix the first header with a byte-order mark and
/// use their own column titles, so matching ignores case, surrounding
/// whitespace and a leading BOM.
#[inline]
pub fn canonical_field_name(column: &str) -> String {
    let name = column
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase();

    match name.as_str() {
        "summary" => "title".to_string(),
        "issue type" | "issuetype" | "issue_type" => "type".to_string(),
        _ => name,
    }
}

/// Render a record as the sentence that gets embedded.
#[inline]
pub fn normalize(record: &Record) -> Result<Sentence> {
    let title = record.require("title")?;
    let kind = record.require("type")?;
    let assignee = record.require("assignee")?;
    let status = record.require("status")?;
    let description = record.require("description")?;

    Ok(Sentence(format!(
        "The ticket {} that is a {}, is assigned to {}, it is currently {} and has the following description: {}",
        title, kind, assignee, status, description
    )))
}

/// Normalize a batch of records, applying `policy` to malformed ones.
///
/// Each sentence is paired with the 1-based row it came from, so skipped
/// rows leave gaps in the numbering.
#[inline]
pub fn normalize_all(
    records: &[Record],
    policy: MalformedRecordPolicy,
) -> Result<Vec<(usize, Sentence)>> {
    let mut sentences = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let row = index + 1;
        match normalize(record) {
            Ok(sentence) => sentences.push((row, sentence)),
            Err(e) if policy == MalformedRecordPolicy::Skip => {
                warn!("Skipping record {}: {}", row, e);
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        "Normalized {} of {} records",
        sentences.len(),
        records.len()
    );
    Ok(sentences)
}

/// Read every row of a CSV file with a header line.
///
/// Rows shorter than the header are kept; the fields they do not reach are
/// simply absent from the resulting [`Record`].
#[inline]
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    info!("Loading ticket records from {}", path.display());

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            SupportError::DataLoad(format!("Failed to open {}: {}", path.display(), e))
        })?;

    let headers = reader
        .headers()
        .map_err(|e| {
            SupportError::DataLoad(format!(
                "Failed to read header of {}: {}",
                path.display(),
                e
            ))
        })?
        .clone();

    // First column wins when two headers alias the same field.
    let mut seen = HashSet::new();
    let columns: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(_, column)| {
            let field = canonical_field_name(column);
            if seen.insert(field.clone()) {
                true
            } else {
                warn!(
                    "Ignoring column {:?} in {}: {} is already read from an earlier column",
                    column,
                    path.display(),
                    field
                );
                false
            }
        })
        .collect();

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| {
            SupportError::DataLoad(format!(
                "Failed to parse row {} of {}: {}",
                line + 1,
                path.display(),
                e
            ))
        })?;

        let mut record = Record::new();
        for &(index, column) in &columns {
            if let Some(value) = row.get(index) {
                record.insert(column, value);
            }
        }
        records.push(record);
    }

    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Somewhere the index builder can pull records from
pub trait RecordSource: Send + Sync {
    fn load(&self) -> Result<Vec<Record>>;

    /// Human-readable origin, used in log lines
    fn describe(&self) -> String;
}

/// Records read from a CSV file on disk
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for CsvRecordSource {
    #[inline]
    fn load(&self) -> Result<Vec<Record>> {
        load_records(&self.path)
    }

    #[inline]
    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl RecordSource for Vec<Record> {
    #[inline]
    fn load(&self) -> Result<Vec<Record>> {
        Ok(self.clone())
    }

    #[inline]
    fn describe(&self) -> String {
        format!("{} in-memory records", self.len())
    }
}

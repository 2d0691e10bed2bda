//! Flood incident spreadsheet ingestion.
//!
//! Reads every delimited file in an input directory, reconciles each file's
//! header row against the alias registry, and turns the rows into
//! `ReconciledRecord`s. Files are processed in file-name order and rows keep
//! their order within a file, so the output sequence is deterministic.
//!
//! Two failure levels:
//! - a row whose coordinates or depth cannot be derived is dropped and
//!   counted (`RowDrop`);
//! - a file that cannot be read as a table at all is an `IngestError`, which
//!   aborts the run or is skipped with a warning depending on
//!   `FileErrorPolicy`.

use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;

use crate::analysis::metrics::{reconcile_record, source_year};
use crate::headers::{CANONICAL_COLUMNS, HeaderMap};
use crate::logging::{self, Stage};
use crate::model::{
    COL_DATE, COL_DEPTH, COL_LATITUDE, COL_LOCATION, COL_LONGITUDE, IngestError, RawRecord,
    ReconciledRecord, RowDrop, SourceYear,
};

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// What to do when a whole file cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileErrorPolicy {
    /// Stop the run and return the file's error.
    #[default]
    Abort,
    /// Log a warning, count the file as skipped, and carry on.
    Skip,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub headers: HeaderMap,
    /// File extension to pick up, without the dot. Matched case-insensitively.
    pub extension: String,
    pub on_file_error: FileErrorPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            headers: HeaderMap::builtin(),
            extension: "csv".to_string(),
            on_file_error: FileErrorPolicy::Abort,
        }
    }
}

/// Counters for one ingestion run.
///
/// `rows_kept + dropped_coordinates + dropped_depth == rows_read`, where
/// `rows_read` only counts rows of files that were read successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped_coordinates: usize,
    pub dropped_depth: usize,
}

impl IngestStats {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_coordinates + self.dropped_depth
    }

    fn count_drop(&mut self, reason: RowDrop) {
        match reason {
            RowDrop::MissingCoordinate | RowDrop::InvalidCoordinate => self.dropped_coordinates += 1,
            RowDrop::UnparseableDepth => self.dropped_depth += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub records: Vec<ReconciledRecord>,
    pub stats: IngestStats,
}

// ---------------------------------------------------------------------------
// File discovery
// ---------------------------------------------------------------------------

/// Lists files in `dir` with the given extension, sorted by file name.
///
/// A directory that does not exist is reported as `NoInput`, the same as an
/// empty one.
pub fn discover_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, IngestError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IngestError::NoInput {
                dir: dir.to_path_buf(),
                extension: extension.to_string(),
            });
        }
        Err(source) => {
            return Err(IngestError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IngestError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(IngestError::NoInput {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

// ---------------------------------------------------------------------------
// Single file
// ---------------------------------------------------------------------------

/// A parsed source file with its header row reconciled.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub file: String,
    pub year: SourceYear,
    /// Header row as written in the file, whitespace-trimmed.
    pub raw_headers: Vec<String>,
    /// Header row after alias reconciliation, same positions as `raw_headers`.
    pub headers: Vec<String>,
    rows: Vec<StringRecord>,
}

/// Parses a delimited file in full. Any structural problem (bad UTF-8, a row
/// wider than the header, no header row) fails the whole file.
pub fn load_table(path: &Path, header_map: &HeaderMap) -> Result<SourceTable, IngestError> {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(&file, path, e))?;

    let raw_headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(&file, path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if raw_headers.iter().all(|h| h.is_empty()) {
        return Err(IngestError::MalformedFile {
            file,
            reason: "missing header row".to_string(),
        });
    }
    let headers = header_map.reconcile(raw_headers.iter().map(String::as_str));
    if let Some(reason) = duplicated_column(&raw_headers, &headers) {
        return Err(IngestError::MalformedFile { file, reason });
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| csv_error(&file, path, e))?;
        if record.len() > headers.len() {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Err(IngestError::MalformedFile {
                file,
                reason: format!(
                    "line {} has {} fields but the header has {}",
                    line,
                    record.len(),
                    headers.len()
                ),
            });
        }
        rows.push(record);
    }

    Ok(SourceTable {
        year: source_year(&stem),
        file,
        raw_headers,
        headers,
        rows,
    })
}

/// Names the first canonical column that more than one header maps to.
fn duplicated_column(raw_headers: &[String], headers: &[String]) -> Option<String> {
    CANONICAL_COLUMNS.iter().find_map(|column| {
        let sources: Vec<&str> = raw_headers
            .iter()
            .zip(headers)
            .filter(|(_, h)| h == column)
            .map(|(raw, _)| raw.as_str())
            .collect();
        (sources.len() > 1).then(|| {
            format!("headers {:?} all map to the '{}' column", sources, column)
        })
    })
}

fn csv_error(file: &str, path: &Path, err: csv::Error) -> IngestError {
    let reason = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => IngestError::Io {
            path: path.to_path_buf(),
            source,
        },
        _ => IngestError::MalformedFile {
            file: file.to_string(),
            reason,
        },
    }
}

impl SourceTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Canonical columns with no matching header.
    pub fn missing_columns(&self) -> Vec<&'static str> {
        CANONICAL_COLUMNS
            .iter()
            .copied()
            .filter(|c| self.column_index(c).is_none())
            .collect()
    }

    /// Rows as `RawRecord`s. Cells past the end of a short row read as empty.
    pub fn raw_records(&self) -> Result<Vec<RawRecord>, IngestError> {
        let index = |column: &str| {
            self.column_index(column).ok_or_else(|| IngestError::MissingColumn {
                file: self.file.clone(),
                column: column.to_string(),
            })
        };
        let date = index(COL_DATE)?;
        let location = index(COL_LOCATION)?;
        let latitude = index(COL_LATITUDE)?;
        let longitude = index(COL_LONGITUDE)?;
        let depth = index(COL_DEPTH)?;

        let cell = |row: &StringRecord, i: usize| row.get(i).unwrap_or("").to_string();

        Ok(self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| RawRecord {
                source_file: self.file.clone(),
                row: i + 1,
                date: cell(row, date),
                location: cell(row, location),
                latitude: cell(row, latitude),
                longitude: cell(row, longitude),
                depth_range: cell(row, depth),
                year: self.year.clone(),
            })
            .collect())
    }
}

/// Reads one file into raw records.
pub fn read_file(path: &Path, header_map: &HeaderMap) -> Result<Vec<RawRecord>, IngestError> {
    load_table(path, header_map)?.raw_records()
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Ingests every matching file in `dir` into one ordered record set.
pub fn ingest_directory(dir: &Path, options: &IngestOptions) -> Result<IngestReport, IngestError> {
    let files = discover_files(dir, &options.extension)?;
    logging::info(
        Stage::Tabular,
        None,
        &format!("Found {} input file(s) in {}", files.len(), dir.display()),
    );
    ingest_files(&files, options)
}

/// Ingests the given files in the order given.
pub fn ingest_files(files: &[PathBuf], options: &IngestOptions) -> Result<IngestReport, IngestError> {
    let mut records = Vec::new();
    let mut stats = IngestStats::default();

    for path in files {
        let raws = match read_file(path, &options.headers) {
            Ok(raws) => raws,
            Err(err) => {
                let name = path.display().to_string();
                logging::log_ingest_failure(Some(&name), "Reading file", &err);
                match options.on_file_error {
                    FileErrorPolicy::Abort => return Err(err),
                    FileErrorPolicy::Skip => {
                        stats.files_skipped += 1;
                        continue;
                    }
                }
            }
        };

        stats.files_read += 1;
        let before = records.len();
        for raw in raws {
            stats.rows_read += 1;
            let (file, row) = (raw.source_file.clone(), raw.row);
            match reconcile_record(raw) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    logging::log_row_drop(&file, row, reason);
                    stats.count_drop(reason);
                }
            }
        }
        let name = path.display().to_string();
        logging::debug(
            Stage::Tabular,
            Some(&name),
            &format!("{} rows kept", records.len() - before),
        );
    }

    stats.rows_kept = records.len();
    logging::log_ingest_summary(&stats);
    Ok(IngestReport { records, stats })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Core data types for the flood map normalization pipeline.
//!
//! This module defines the shared domain model imported by all other modules:
//! the record types produced by tabular ingestion, the overlay types produced
//! by archive extraction, and the error taxonomy for both stages. It holds no
//! I/O and only the small accessors the types need.

use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Canonical column names
// ---------------------------------------------------------------------------

pub const COL_DATE: &str = "Date";
pub const COL_LOCATION: &str = "Location";
pub const COL_LATITUDE: &str = "Latitude";
pub const COL_LONGITUDE: &str = "Longitude";
/// Depth-range column, values shaped like `"0.3-0.6"` in meters.
pub const COL_DEPTH: &str = "Maximum Depth(m)";

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// Year a source file covers, taken from the tail of its file stem.
///
/// `flood_2021.csv` yields `Known("2021")`. Stems shorter than four
/// characters, or whose last four characters are not all digits, yield
/// `Unknown` rather than a best-effort guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceYear {
    Known(String),
    Unknown,
}

impl fmt::Display for SourceYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceYear::Known(year) => write!(f, "{}", year),
            SourceYear::Unknown => write!(f, "unknown"),
        }
    }
}

/// One data row as read from a source file, with cells already looked up
/// under their canonical column names. Coordinates and depth are still text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source_file: String,
    /// 1-based data row number within the source file (header excluded).
    pub row: usize,
    pub date: String,
    pub location: String,
    pub latitude: String,
    pub longitude: String,
    pub depth_range: String,
    pub year: SourceYear,
}

/// A row that survived ingestion: coordinates and average depth are known.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRecord {
    pub date: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Original depth-range text, kept verbatim for display.
    pub depth_range: String,
    pub avg_depth: f64,
    pub year: SourceYear,
}

/// Why a single row was left out of the record set.
///
/// Row drops are expected noise in the source data: they are counted and
/// logged at debug level, never returned as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDrop {
    /// Latitude or longitude cell is empty.
    MissingCoordinate,
    /// Latitude or longitude is not a finite number inside its valid range.
    InvalidCoordinate,
    /// Depth range is not two numeric tokens separated by `-`.
    UnparseableDepth,
}

impl fmt::Display for RowDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowDrop::MissingCoordinate => write!(f, "missing coordinate"),
            RowDrop::InvalidCoordinate => write!(f, "invalid coordinate"),
            RowDrop::UnparseableDepth => write!(f, "unparseable depth range"),
        }
    }
}

// ---------------------------------------------------------------------------
// Overlay types
// ---------------------------------------------------------------------------

/// Geographic extent of a raster overlay, in decimal degrees.
///
/// Edges satisfy `north > south` and `east > west`; boxes crossing the
/// antimeridian are rejected at extraction time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Corner pairs `[[south, west], [north, east]]`, the shape map layers
    /// expect for image bounds.
    pub fn corners(&self) -> [[f64; 2]; 2] {
        [[self.south, self.west], [self.north, self.east]]
    }
}

/// An extracted overlay image and the box it is draped over.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayAsset {
    pub image: PathBuf,
    pub bounds: BoundingBox,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by tabular ingestion and feature persistence.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The input directory holds no file with the tabular extension.
    #[error("no input: no .{extension} files found in {}", dir.display())]
    NoInput { dir: PathBuf, extension: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file could not be read as delimited text at all.
    #[error("malformed file {file}: {reason}")]
    MalformedFile { file: String, reason: String },

    /// A canonical column is absent even after header reconciliation.
    #[error("file {file} has no '{column}' column (after header reconciliation)")]
    MissingColumn { file: String, column: String },

    #[error("failed to write feature collection to {}: {reason}", path.display())]
    Output { path: PathBuf, reason: String },
}

/// Errors raised while extracting a ground overlay from a KMZ archive.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// The archive, its `doc.kml`, or the image it references is absent.
    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    #[error("malformed archive {}: {reason}", archive.display())]
    MalformedArchive { archive: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Input Verification Module
//!
//! Dry run over the tabular inputs: for each file, report which headers were
//! recognized, which canonical columns are missing, and how many rows would
//! survive ingestion. Nothing is written. Use this before adding a new year's
//! export to see whether it needs a new header alias.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::analysis::metrics::reconcile_record;
use crate::headers::HeaderMap;
use crate::ingest::tabular::{discover_files, load_table};
use crate::model::IngestError;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub input_dir: String,
    pub files: Vec<FileVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationSummary {
    pub files_total: usize,
    pub files_working: usize,
    pub files_failed: usize,
    pub rows_total: usize,
    pub rows_usable: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileVerification {
    pub file: String,
    pub year: String,
    pub status: VerificationStatus,
    pub headers_recognized: Vec<String>,
    pub headers_unmapped: Vec<String>,
    pub columns_missing: Vec<String>,
    pub rows_total: usize,
    pub rows_usable: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum VerificationStatus {
    /// Every row would be kept.
    Success,
    /// The file is usable but some rows would be dropped.
    PartialSuccess,
    Failed,
}

// ============================================================================
// Single file
// ============================================================================

pub fn verify_file(path: &Path, header_map: &HeaderMap) -> FileVerification {
    let mut result = FileVerification {
        file: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        year: String::new(),
        status: VerificationStatus::Failed,
        headers_recognized: Vec::new(),
        headers_unmapped: Vec::new(),
        columns_missing: Vec::new(),
        rows_total: 0,
        rows_usable: 0,
        error_message: None,
    };

    let table = match load_table(path, header_map) {
        Ok(table) => table,
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    };

    result.year = table.year.to_string();
    result.rows_total = table.len();
    for raw in &table.raw_headers {
        if header_map.is_recognized(raw) {
            result.headers_recognized.push(raw.clone());
        } else {
            result.headers_unmapped.push(raw.clone());
        }
    }
    result.columns_missing = table.missing_columns().into_iter().map(String::from).collect();

    match table.raw_records() {
        Ok(raws) => {
            result.rows_usable = raws.into_iter().map(reconcile_record).filter(Result::is_ok).count();
        }
        Err(e) => {
            result.error_message = Some(e.to_string());
            return result;
        }
    }

    // Determine status
    result.status = if result.rows_usable == result.rows_total {
        VerificationStatus::Success
    } else {
        VerificationStatus::PartialSuccess
    };

    result
}

// ============================================================================
// Full Verification Runner
// ============================================================================

pub fn verify_inputs(
    dir: &Path,
    header_map: &HeaderMap,
    extension: &str,
) -> Result<VerificationReport, IngestError> {
    let files = discover_files(dir, extension)?;

    let mut report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        input_dir: dir.display().to_string(),
        files: Vec::new(),
        summary: VerificationSummary {
            files_total: files.len(),
            ..VerificationSummary::default()
        },
    };

    for path in &files {
        let result = verify_file(path, header_map);
        match result.status {
            VerificationStatus::Success | VerificationStatus::PartialSuccess => report.summary.files_working += 1,
            VerificationStatus::Failed => report.summary.files_failed += 1,
        }
        report.summary.rows_total += result.rows_total;
        report.summary.rows_usable += result.rows_usable;
        report.files.push(result);
    }

    Ok(report)
}

pub fn print_summary(report: &VerificationReport) {
    println!("═══════════════════════════════════════════════════════════");
    println!("INPUT VERIFICATION: {}", report.input_dir);
    println!("═══════════════════════════════════════════════════════════");

    for file in &report.files {
        match file.status {
            VerificationStatus::Success => {
                println!("  ✓ {} (year {}): {} rows", file.file, file.year, file.rows_total);
            }
            VerificationStatus::PartialSuccess => {
                println!(
                    "  ⚠ {} (year {}): {}/{} rows usable",
                    file.file, file.year, file.rows_usable, file.rows_total
                );
            }
            VerificationStatus::Failed => {
                println!(
                    "  ✗ {}: {}",
                    file.file,
                    file.error_message.as_deref().unwrap_or("Unknown")
                );
            }
        }
        if !file.columns_missing.is_empty() {
            println!("      missing columns: {:?}", file.columns_missing);
        }
        if !file.headers_unmapped.is_empty() {
            println!("      unmapped headers: {:?}", file.headers_unmapped);
        }
    }

    println!();
    println!(
        "Files: {}/{} usable ({} failed)",
        report.summary.files_working, report.summary.files_total, report.summary.files_failed
    );
    println!("Rows:  {}/{} usable", report.summary.rows_usable, report.summary.rows_total);
    println!("═══════════════════════════════════════════════════════════");
}

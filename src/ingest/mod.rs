//! Readers for the two pipeline inputs.
//!
//! - `tabular`: per-year flood incident spreadsheets → reconciled records.
//! - `kmz`: compressed KML archive → overlay image + bounding box.

pub mod kmz;
pub mod tabular;

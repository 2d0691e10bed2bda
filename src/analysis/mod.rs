//! Per-row derived metrics for the flood incident pipeline.
//!
//! Submodules:
//! - `metrics`: depth-range averaging, source-year derivation, and
//!   coordinate validation. All functions are pure; soft failures come back
//!   as `Option` / `Result<_, RowDrop>` rather than errors.

pub mod metrics;

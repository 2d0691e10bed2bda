//! Flood map normalization pipeline.
//!
//! Turns per-year flood incident spreadsheets into a GeoJSON point
//! collection, and a KMZ ground overlay into an image plus its bounding box.
//! Map rendering consumes both artifacts and is not part of this crate.

pub mod analysis;
pub mod config;
pub mod encode;
pub mod headers;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod verify;

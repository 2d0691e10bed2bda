//! Stage orchestration.
//!
//! The tabular stage and the overlay stage share no state and are run on
//! separate scoped threads by [`run_all`]. Each stage either writes all of
//! its artifacts or returns an error; one stage failing does not stop the
//! other.

use std::fs;
use std::thread;

use crate::config::{OverlayConfig, PipelineConfig, TabularConfig};
use crate::encode::{encode_records, stage_overlay_manifest, write_feature_collection};
use crate::ingest::kmz::stage_overlay;
use crate::ingest::tabular::{IngestStats, ingest_directory};
use crate::logging::{self, Stage};
use crate::model::{IngestError, OverlayAsset, OverlayError};

/// Ingests the tabular inputs, encodes them, and writes the GeoJSON.
pub fn run_tabular(config: &TabularConfig) -> Result<IngestStats, IngestError> {
    let report = ingest_directory(&config.input_dir, &config.ingest_options())?;
    let collection = encode_records(&report.records);
    write_feature_collection(&collection, &config.output)?;

    logging::info(
        Stage::Output,
        None,
        &format!(
            "GeoJSON saved to {} with {} features",
            config.output.display(),
            collection.features.len()
        ),
    );
    Ok(report.stats)
}

/// Extracts the overlay image and writes it with its bounds manifest.
///
/// Both files are staged before either is published, so a failure in any
/// step leaves the previous image and manifest in place.
pub fn run_overlay(config: &OverlayConfig) -> Result<OverlayAsset, OverlayError> {
    let staged = stage_overlay(&config.archive, &config.image_output, &config.overlay_options())?;
    let manifest = stage_overlay_manifest(&staged.asset, &config.manifest_output)?;

    let asset = staged.commit()?;
    manifest.commit().map_err(|source| {
        // The image is already in place; take it back out rather than leave
        // it without a manifest.
        if let Err(e) = fs::remove_file(&asset.image) {
            logging::warn(
                Stage::Output,
                None,
                &format!("could not remove {}: {}", asset.image.display(), e),
            );
        }
        OverlayError::Io {
            path: config.manifest_output.clone(),
            source,
        }
    })?;

    logging::info(
        Stage::Output,
        None,
        &format!(
            "Overlay image saved to {}, manifest saved to {}, bounds {:?}",
            asset.image.display(),
            config.manifest_output.display(),
            asset.bounds.corners()
        ),
    );
    Ok(asset)
}

/// Result of both stages, reported independently.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub tabular: Result<IngestStats, IngestError>,
    pub overlay: Result<OverlayAsset, OverlayError>,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.tabular.is_ok() && self.overlay.is_ok()
    }
}

pub fn run_all(config: &PipelineConfig) -> PipelineOutcome {
    thread::scope(|s| {
        let overlay = s.spawn(|| run_overlay(&config.overlay));
        let tabular = run_tabular(&config.tabular);
        let overlay = overlay
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        if let Err(e) = &tabular {
            logging::log_ingest_failure(None, "Tabular stage", e);
        }
        if let Err(e) = &overlay {
            logging::log_overlay_failure(&config.overlay.archive, "Overlay stage", e);
        }
        PipelineOutcome { tabular, overlay }
    })
}

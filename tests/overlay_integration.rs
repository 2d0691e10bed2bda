/// End-to-end tests for the overlay stage: KMZ archive in, image and bounds
/// manifest out.
///
/// Archives are built on the fly with `zip::ZipWriter` so each test controls
/// exactly what the KMZ contains.
///
/// Run with: cargo test --test overlay_integration

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use floodmap_service::config::OverlayConfig;
use floodmap_service::encode::OverlayManifest;
use floodmap_service::model::OverlayError;
use floodmap_service::pipeline::run_overlay;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const IMAGE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n fake overlay pixels";

const KL_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>KL flood extent</name>
    <GroundOverlay>
      <name>flood</name>
      <Icon><href>files/flood_extent.png</href></Icon>
      <LatLonBox>
        <north>3.1744</north>
        <south>3.1214</south>
        <east>101.7228</east>
        <west>101.6771</west>
      </LatLonBox>
    </GroundOverlay>
  </Document>
</kml>"#;

fn write_kmz(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create kmz");
    let mut zip = ZipWriter::new(file);
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

fn overlay_config(root: &Path, archive: PathBuf) -> OverlayConfig {
    OverlayConfig {
        archive,
        image_output: root.join("output/overlay.png"),
        manifest_output: root.join("output/overlay.json"),
        retain_dir: None,
        work_root: Some(root.join("work")),
    }
}

/// The scoped unpack directory must be gone once extraction returns.
fn assert_no_work_left(config: &OverlayConfig) {
    let root = config.work_root.as_ref().unwrap();
    let leftovers: Vec<_> = match fs::read_dir(root) {
        Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    };
    assert!(leftovers.is_empty(), "unpack directories left behind: {:?}", leftovers);
}

fn standard_archive(root: &Path) -> PathBuf {
    let archive = root.join("KL_2025.kmz");
    write_kmz(
        &archive,
        &[
            ("doc.kml", KL_KML.as_bytes()),
            ("files/flood_extent.png", IMAGE_BYTES),
        ],
    );
    archive
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_extracts_image_and_bounds() {
    let dir = TempDir::new().unwrap();
    let config = overlay_config(dir.path(), standard_archive(dir.path()));

    let asset = run_overlay(&config).expect("overlay extracted");

    assert_eq!(asset.bounds.north, 3.1744);
    assert_eq!(asset.bounds.south, 3.1214);
    assert_eq!(asset.bounds.east, 101.7228);
    assert_eq!(asset.bounds.west, 101.6771);
    assert_eq!(asset.bounds.corners(), [[3.1214, 101.6771], [3.1744, 101.7228]]);
    assert_eq!(fs::read(&config.image_output).unwrap(), IMAGE_BYTES);

    let manifest: OverlayManifest =
        serde_json::from_slice(&fs::read(&config.manifest_output).unwrap()).unwrap();
    assert_eq!(manifest.bounds, asset.bounds.corners());
    assert_eq!(manifest.north, 3.1744);
    assert_no_work_left(&config);
}

#[test]
fn test_rerun_replaces_outputs_identically() {
    let dir = TempDir::new().unwrap();
    let config = overlay_config(dir.path(), standard_archive(dir.path()));

    run_overlay(&config).unwrap();
    let image = fs::read(&config.image_output).unwrap();
    let manifest = fs::read(&config.manifest_output).unwrap();

    run_overlay(&config).unwrap();
    assert_eq!(fs::read(&config.image_output).unwrap(), image);
    assert_eq!(fs::read(&config.manifest_output).unwrap(), manifest);
}

#[test]
fn test_missing_ground_overlay_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("empty.kmz");
    let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document><name>x</name></Document></kml>"#;
    write_kmz(&archive, &[("doc.kml", kml.as_bytes()), ("files/a.png", IMAGE_BYTES)]);
    let config = overlay_config(dir.path(), archive);

    let err = run_overlay(&config).expect_err("no overlay in document");
    assert!(matches!(err, OverlayError::MalformedArchive { .. }), "got {:?}", err);
    assert!(!config.image_output.exists());
    assert!(!config.manifest_output.exists());
    assert_no_work_left(&config);
}

#[test]
fn test_missing_document_is_not_found() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("nodoc.kmz");
    write_kmz(&archive, &[("files/flood_extent.png", IMAGE_BYTES)]);
    let config = overlay_config(dir.path(), archive);

    let err = run_overlay(&config).expect_err("doc.kml absent");
    assert!(matches!(err, OverlayError::NotFound { what: "doc.kml", .. }), "got {:?}", err);
}

#[test]
fn test_missing_image_is_not_found() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("noimage.kmz");
    write_kmz(&archive, &[("doc.kml", KL_KML.as_bytes())]);
    let config = overlay_config(dir.path(), archive);

    let err = run_overlay(&config).expect_err("image absent");
    assert!(
        matches!(err, OverlayError::NotFound { what: "overlay image", .. }),
        "got {:?}",
        err
    );
    assert!(!config.image_output.exists());
    assert_no_work_left(&config);
}

#[test]
fn test_missing_archive_is_not_found() {
    let dir = TempDir::new().unwrap();
    let config = overlay_config(dir.path(), dir.path().join("absent.kmz"));

    let err = run_overlay(&config).expect_err("archive absent");
    assert!(matches!(err, OverlayError::NotFound { what: "archive", .. }));
}

#[test]
fn test_retain_dir_keeps_unpacked_files() {
    let dir = TempDir::new().unwrap();
    let mut config = overlay_config(dir.path(), standard_archive(dir.path()));
    let retain = dir.path().join("unpacked");
    config.retain_dir = Some(retain.clone());

    run_overlay(&config).unwrap();

    assert!(retain.join("doc.kml").is_file());
    assert!(retain.join("files/flood_extent.png").is_file());
}

#[test]
fn test_reused_retain_dir_does_not_mask_missing_entries() {
    let dir = TempDir::new().unwrap();
    let retain = dir.path().join("unpacked");
    let mut config = overlay_config(dir.path(), standard_archive(dir.path()));
    config.retain_dir = Some(retain.clone());
    run_overlay(&config).expect("first archive is complete");

    let no_image = dir.path().join("no_image.kmz");
    write_kmz(&no_image, &[("doc.kml", KL_KML.as_bytes())]);
    config.archive = no_image;
    let err = run_overlay(&config).expect_err("image missing from this archive");
    assert!(
        matches!(err, OverlayError::NotFound { what: "overlay image", .. }),
        "got {:?}",
        err
    );
    assert!(!retain.join("files/flood_extent.png").exists());

    let no_doc = dir.path().join("no_doc.kmz");
    write_kmz(&no_doc, &[("files/flood_extent.png", IMAGE_BYTES)]);
    config.archive = no_doc;
    let err = run_overlay(&config).expect_err("doc.kml missing from this archive");
    assert!(matches!(err, OverlayError::NotFound { what: "doc.kml", .. }), "got {:?}", err);
}

#[test]
fn test_unwritable_manifest_keeps_previous_outputs() {
    let dir = TempDir::new().unwrap();
    let mut config = overlay_config(dir.path(), standard_archive(dir.path()));
    run_overlay(&config).expect("first run succeeds");

    let replacement = dir.path().join("replacement.kmz");
    write_kmz(
        &replacement,
        &[
            ("doc.kml", KL_KML.as_bytes()),
            ("files/flood_extent.png", b"different pixels".as_slice()),
        ],
    );
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"a file, not a directory").unwrap();
    config.archive = replacement;
    config.manifest_output = blocker.join("overlay.json");

    let err = run_overlay(&config).expect_err("manifest cannot be written");
    assert!(matches!(err, OverlayError::Io { .. }), "got {:?}", err);
    assert_eq!(fs::read(&config.image_output).unwrap(), IMAGE_BYTES);
    assert_no_work_left(&config);
}

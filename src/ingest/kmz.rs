//! Ground overlay extraction from KMZ archives.
//!
//! A KMZ is a zip archive with a `doc.kml` at its root. The first
//! `GroundOverlay` in that document names an image inside the archive
//! (`Icon/href`) and the box it covers (`LatLonBox` north/south/east/west).
//!
//! The archive is unpacked into a working directory that is removed when
//! extraction finishes, whether it succeeded or not, unless the caller asks
//! for it to be kept. Only the referenced image is copied out, and only after
//! every check has passed, so a failed extraction writes nothing.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use tempfile::TempDir;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::logging::{self, Stage};
use crate::model::{BoundingBox, OverlayAsset, OverlayError};
use crate::output::StagedFile;

/// Conventional name of the KML document at the archive root.
pub const KML_DOCUMENT: &str = "doc.kml";

/// Namespaces a `GroundOverlay` is accepted under. Elements with no
/// namespace at all are accepted as well.
pub const KML_NAMESPACES: &[&str] = &[
    "http://www.opengis.net/kml/2.2",
    "http://earth.google.com/kml/2.2",
    "http://earth.google.com/kml/2.1",
    "http://earth.google.com/kml/2.0",
];

const EDGES: [&str; 4] = ["north", "south", "east", "west"];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct OverlayOptions {
    /// Unpack into this directory and keep it afterwards instead of using a
    /// temporary directory. Anything already in it is removed first, so a
    /// previous archive's files can never stand in for this one's.
    pub retain_dir: Option<PathBuf>,
    /// Parent for the temporary directory. Defaults to the system temp dir.
    pub work_root: Option<PathBuf>,
}

/// Where the archive is unpacked. `Scoped` deletes itself on drop.
enum WorkDir {
    Scoped(TempDir),
    Retained(PathBuf),
}

impl WorkDir {
    fn create(options: &OverlayOptions) -> Result<Self, OverlayError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| OverlayError::Io { path, source }
        };
        match (&options.retain_dir, &options.work_root) {
            (Some(dir), _) => {
                if dir.exists() {
                    fs::remove_dir_all(dir).map_err(io_err(dir))?;
                }
                fs::create_dir_all(dir).map_err(io_err(dir))?;
                Ok(WorkDir::Retained(dir.clone()))
            }
            (None, Some(root)) => {
                fs::create_dir_all(root).map_err(io_err(root))?;
                TempDir::new_in(root).map(WorkDir::Scoped).map_err(io_err(root))
            }
            (None, None) => TempDir::new()
                .map(WorkDir::Scoped)
                .map_err(io_err(&std::env::temp_dir())),
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Scoped(dir) => dir.path(),
            WorkDir::Retained(dir) => dir,
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// An extracted overlay whose image has not been published yet.
#[derive(Debug)]
pub struct StagedOverlay {
    pub asset: OverlayAsset,
    image: StagedFile,
}

impl StagedOverlay {
    /// Moves the image into place and returns the asset.
    pub fn commit(self) -> Result<OverlayAsset, OverlayError> {
        let dest = self.image.dest().to_path_buf();
        self.image
            .commit()
            .map_err(|source| OverlayError::Io { path: dest, source })?;
        Ok(self.asset)
    }
}

/// Extracts the first ground overlay of `archive`, copying its image to
/// `image_output` (replacing any file already there).
pub fn extract_overlay(
    archive: &Path,
    image_output: &Path,
    options: &OverlayOptions,
) -> Result<OverlayAsset, OverlayError> {
    stage_overlay(archive, image_output, options)?.commit()
}

/// Runs every extraction step and stages the image for `image_output`
/// without touching `image_output` itself.
pub fn stage_overlay(
    archive: &Path,
    image_output: &Path,
    options: &OverlayOptions,
) -> Result<StagedOverlay, OverlayError> {
    if !archive.is_file() {
        return Err(OverlayError::NotFound {
            what: "archive",
            path: archive.to_path_buf(),
        });
    }

    let workdir = WorkDir::create(options)?;
    let root = workdir.path();
    unpack(archive, root)?;
    logging::debug(
        Stage::Overlay,
        Some(&archive.display().to_string()),
        &format!("unpacked into {}", root.display()),
    );

    let doc_path = root.join(KML_DOCUMENT);
    if !doc_path.is_file() {
        return Err(OverlayError::NotFound {
            what: KML_DOCUMENT,
            path: archive.join(KML_DOCUMENT),
        });
    }
    let kml = fs::read_to_string(&doc_path).map_err(|source| OverlayError::Io {
        path: doc_path.clone(),
        source,
    })?;

    let overlay = parse_ground_overlay(&kml).map_err(|reason| OverlayError::MalformedArchive {
        archive: archive.to_path_buf(),
        reason,
    })?;

    let relative = resolve_href(&overlay.href).ok_or_else(|| OverlayError::MalformedArchive {
        archive: archive.to_path_buf(),
        reason: format!("image reference '{}' points outside the archive", overlay.href),
    })?;
    let image_src = root.join(&relative);
    if !image_src.is_file() {
        return Err(OverlayError::NotFound {
            what: "overlay image",
            path: archive.join(&relative),
        });
    }

    let (image, bytes) = StagedFile::copy_from(&image_src, image_output).map_err(|source| OverlayError::Io {
        path: image_output.to_path_buf(),
        source,
    })?;
    logging::info(
        Stage::Overlay,
        Some(&archive.display().to_string()),
        &format!(
            "Overlay image {} ({} bytes) staged for {}, bounds {:?}",
            overlay.href,
            bytes,
            image_output.display(),
            overlay.bounds.corners()
        ),
    );

    Ok(StagedOverlay {
        asset: OverlayAsset {
            image: image_output.to_path_buf(),
            bounds: overlay.bounds,
        },
        image,
    })
}

fn unpack(archive: &Path, dest: &Path) -> Result<(), OverlayError> {
    let file = File::open(archive).map_err(|source| OverlayError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(file).map_err(|e| zip_error(archive, e))?;
    zip.extract(dest).map_err(|e| zip_error(archive, e))
}

fn zip_error(archive: &Path, err: ZipError) -> OverlayError {
    match err {
        ZipError::Io(source) => OverlayError::Io {
            path: archive.to_path_buf(),
            source,
        },
        other => OverlayError::MalformedArchive {
            archive: archive.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Turns an `Icon/href` into a path relative to the archive root.
///
/// Returns `None` for absolute paths or paths that climb out of the root.
fn resolve_href(href: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(href).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative)
}

// ---------------------------------------------------------------------------
// KML parsing
// ---------------------------------------------------------------------------

/// The fields of a `GroundOverlay` the pipeline uses.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundOverlay {
    pub href: String,
    pub bounds: BoundingBox,
}

fn is_kml(ns: &ResolveResult) -> bool {
    match ns {
        ResolveResult::Unbound => true,
        ResolveResult::Bound(Namespace(uri)) => KML_NAMESPACES.iter().any(|k| k.as_bytes() == *uri),
        ResolveResult::Unknown(_) => false,
    }
}

/// Finds the first `GroundOverlay` in a KML document and reads its image
/// reference and bounding box. The error is a human-readable reason naming
/// the missing or bad field.
pub fn parse_ground_overlay(kml: &str) -> Result<GroundOverlay, String> {
    let mut reader = NsReader::from_str(kml);
    reader.config_mut().trim_text(true);

    let mut found = false;
    // Local names of open elements below the GroundOverlay; "" for elements
    // outside the KML namespace so they never match a field path.
    let mut path: Vec<String> = Vec::new();
    let mut href: Option<String> = None;
    let mut edges: [Option<String>; 4] = Default::default();

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| format!("{} is not well-formed XML: {}", KML_DOCUMENT, e))?;
        let kml_ns = is_kml(&ns);

        match event {
            Event::Start(e) if !found => {
                if kml_ns && e.local_name().as_ref() == b"GroundOverlay" {
                    found = true;
                }
            }
            Event::Empty(e) if !found => {
                if kml_ns && e.local_name().as_ref() == b"GroundOverlay" {
                    found = true;
                    break;
                }
            }
            Event::Start(e) => {
                let name = if kml_ns {
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
                } else {
                    String::new()
                };
                path.push(name);
            }
            Event::End(_) if found => {
                if path.pop().is_none() {
                    break;
                }
            }
            Event::Text(t) if found => {
                let text = t.unescape().map_err(|e| format!("bad text in {}: {}", KML_DOCUMENT, e))?;
                capture(&path, &text, &mut href, &mut edges);
            }
            Event::CData(c) if found => {
                let text = String::from_utf8_lossy(&c).into_owned();
                capture(&path, &text, &mut href, &mut edges);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found {
        return Err("no GroundOverlay element in the KML document".to_string());
    }

    let href = href
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| "GroundOverlay has no Icon/href".to_string())?;

    let mut values = [0.0f64; 4];
    for (i, edge) in EDGES.iter().enumerate() {
        let raw = edges[i]
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("LatLonBox has no <{}>", edge))?;
        values[i] = raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("LatLonBox <{}> is not a number: '{}'", edge, raw))?;
    }
    let bounds = BoundingBox {
        north: values[0],
        south: values[1],
        east: values[2],
        west: values[3],
    };

    if bounds.north <= bounds.south {
        return Err(format!(
            "LatLonBox north ({}) must be greater than south ({})",
            bounds.north, bounds.south
        ));
    }
    if bounds.east <= bounds.west {
        return Err(format!(
            "LatLonBox east ({}) must be greater than west ({}); antimeridian boxes are not supported",
            bounds.east, bounds.west
        ));
    }

    Ok(GroundOverlay { href, bounds })
}

fn capture(path: &[String], text: &str, href: &mut Option<String>, edges: &mut [Option<String>; 4]) {
    match path {
        [icon, leaf] if icon == "Icon" && leaf == "href" => {
            href.get_or_insert_with(String::new).push_str(text);
        }
        [bbox, leaf] if bbox == "LatLonBox" => {
            if let Some(i) = EDGES.iter().position(|e| e == leaf) {
                edges[i].get_or_insert_with(String::new).push_str(text);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

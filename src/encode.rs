//! GeoJSON feature encoding and overlay manifest output.
//!
//! Encoding is a pure, order-preserving mapping from reconciled records to
//! point features. Source rows carry `(latitude, longitude)`; GeoJSON
//! positions are `[longitude, latitude]`, and that swap happens here and
//! nowhere else.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{BoundingBox, IngestError, OverlayAsset, OverlayError, ReconciledRecord};
use crate::output::{StagedFile, write_atomic};

// ---------------------------------------------------------------------------
// GeoJSON types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: Point,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Point {
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub location: String,
    pub date: String,
    pub year: String,
    pub depth_range: String,
    pub avg_depth: f64,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

pub fn encode_record(record: &ReconciledRecord) -> Feature {
    Feature {
        geometry: Point {
            coordinates: [record.longitude, record.latitude],
        },
        properties: FeatureProperties {
            location: record.location.clone(),
            date: record.date.clone(),
            year: record.year.to_string(),
            depth_range: record.depth_range.clone(),
            avg_depth: record.avg_depth,
        },
    }
}

/// One feature per record, in record order.
pub fn encode_records(records: &[ReconciledRecord]) -> FeatureCollection {
    FeatureCollection {
        features: records.iter().map(encode_record).collect(),
    }
}

/// Serializes the collection as 2-space indented JSON and replaces `path`.
pub fn write_feature_collection(collection: &FeatureCollection, path: &Path) -> Result<(), IngestError> {
    let json = serde_json::to_vec_pretty(collection).map_err(|e| IngestError::Output {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_atomic(path, &json).map_err(|e| IngestError::Output {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Overlay manifest
// ---------------------------------------------------------------------------

/// Where the overlay image was written and the box it covers. Map builders
/// read the bounds from here instead of keeping their own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayManifest {
    pub image: String,
    /// `[[south, west], [north, east]]`
    pub bounds: [[f64; 2]; 2],
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl OverlayManifest {
    pub fn from_asset(asset: &OverlayAsset) -> Self {
        let BoundingBox { north, south, east, west } = asset.bounds;
        OverlayManifest {
            image: asset.image.display().to_string(),
            bounds: asset.bounds.corners(),
            north,
            south,
            east,
            west,
        }
    }
}

/// Serializes the manifest for `asset` and stages it for `path`. Nothing is
/// visible at `path` until the returned file is committed.
pub fn stage_overlay_manifest(asset: &OverlayAsset, path: &Path) -> Result<StagedFile, OverlayError> {
    let manifest = OverlayManifest::from_asset(asset);
    let json = serde_json::to_vec_pretty(&manifest).map_err(|e| OverlayError::Io {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    StagedFile::from_bytes(path, &json).map_err(|source| OverlayError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceYear;
    use std::path::PathBuf;

    fn record(location: &str, lat: f64, lon: f64, avg: f64) -> ReconciledRecord {
        ReconciledRecord {
            date: "2021-12-18".to_string(),
            location: location.to_string(),
            latitude: lat,
            longitude: lon,
            depth_range: "0.5-1.5".to_string(),
            avg_depth: avg,
            year: SourceYear::Known("2021".to_string()),
        }
    }

    #[test]
    fn test_coordinates_are_longitude_then_latitude() {
        let rec = record("Jalan Kuching", 3.1819, 101.6776, 1.0);
        let feature = encode_record(&rec);
        assert_eq!(feature.geometry.coordinates, [rec.longitude, rec.latitude]);
    }

    #[test]
    fn test_properties_carry_record_fields() {
        let mut rec = record("Kampung Baru", 3.1650, 101.7050, 0.75);
        rec.year = SourceYear::Unknown;
        let props = encode_record(&rec).properties;
        assert_eq!(props.location, "Kampung Baru");
        assert_eq!(props.date, "2021-12-18");
        assert_eq!(props.year, "unknown");
        assert_eq!(props.depth_range, "0.5-1.5");
        assert_eq!(props.avg_depth, 0.75);
    }

    #[test]
    fn test_encoding_preserves_order_and_length() {
        let records = vec![
            record("A", 3.1, 101.6, 0.1),
            record("B", 3.2, 101.7, 0.2),
            record("C", 3.3, 101.8, 0.3),
        ];
        let collection = encode_records(&records);
        let names: Vec<_> = collection.features.iter().map(|f| f.properties.location.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(encode_records(&records), collection, "encoding must be deterministic");
    }

    #[test]
    fn test_serialized_shape_matches_geojson() {
        let collection = encode_records(&[record("Masjid Jamek", 3.1489, 101.6958, 1.0)]);
        let value = serde_json::to_value(&collection).expect("collection serializes");

        assert_eq!(value["type"], "FeatureCollection");
        let feature = &value["features"][0];
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["geometry"]["type"], "Point");
        assert_eq!(feature["geometry"]["coordinates"][0], 101.6958);
        assert_eq!(feature["geometry"]["coordinates"][1], 3.1489);
        assert_eq!(feature["properties"]["avg_depth"], 1.0);
    }

    #[test]
    fn test_serialized_text_is_indented_and_ordered() {
        let collection = encode_records(&[record("Masjid Jamek", 3.1489, 101.6958, 1.0)]);
        let text = serde_json::to_string_pretty(&collection).unwrap();
        assert!(text.starts_with("{\n  \"type\": \"FeatureCollection\",\n  \"features\": ["));
        let keys = ["\"location\"", "\"date\"", "\"year\"", "\"depth_range\"", "\"avg_depth\""];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).expect("key present")).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "property order changed: {}", text);
    }

    #[test]
    fn test_collection_round_trips_through_json() {
        let collection = encode_records(&[record("Sri Petaling", 3.0700, 101.6900, 0.3)]);
        let text = serde_json::to_string(&collection).unwrap();
        let back: FeatureCollection = serde_json::from_str(&text).expect("tagged structs deserialize");
        assert_eq!(back, collection);
    }

    #[test]
    fn test_manifest_reports_corner_pairs() {
        let asset = OverlayAsset {
            image: PathBuf::from("output/overlay.png"),
            bounds: BoundingBox {
                north: 3.1744,
                south: 3.1214,
                east: 101.7228,
                west: 101.6771,
            },
        };
        let manifest = OverlayManifest::from_asset(&asset);
        assert_eq!(manifest.bounds, [[3.1214, 101.6771], [3.1744, 101.7228]]);
        assert_eq!(manifest.image, "output/overlay.png");
    }

    #[test]
    fn test_staged_manifest_is_written_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.json");
        let asset = OverlayAsset {
            image: PathBuf::from("overlay.png"),
            bounds: BoundingBox {
                north: 2.0,
                south: 1.0,
                east: 4.0,
                west: 3.0,
            },
        };

        let staged = stage_overlay_manifest(&asset, &path).expect("manifest stages");
        assert!(!path.exists(), "manifest must not appear before commit");
        staged.commit().unwrap();

        let back: OverlayManifest = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, OverlayManifest::from_asset(&asset));
    }
}

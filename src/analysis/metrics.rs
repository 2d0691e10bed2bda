//! Row-level metric derivation.
//!
//! Every function here is a pure transformation of cell text. A row whose
//! metrics cannot be derived is not an error: the caller drops it and counts
//! the reason.

use crate::model::{RawRecord, ReconciledRecord, RowDrop, SourceYear};

// ---------------------------------------------------------------------------
// Depth range
// ---------------------------------------------------------------------------

/// Average of a `"low-high"` depth range, in meters.
///
/// The text must split on `-` into exactly two tokens, each a finite number
/// once surrounding whitespace is trimmed. Anything else (a single value, a
/// different delimiter, words, three tokens) yields `None`.
pub fn extract_avg_depth(depth_range: &str) -> Option<f64> {
    let mut tokens = depth_range.split('-');
    let low = parse_finite(tokens.next()?)?;
    let high = parse_finite(tokens.next()?)?;
    if tokens.next().is_some() {
        return None;
    }
    Some((low + high) / 2.0)
}

fn parse_finite(token: &str) -> Option<f64> {
    token.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Source year
// ---------------------------------------------------------------------------

/// Year encoded in the last four characters of a file stem.
///
/// Falls back to `SourceYear::Unknown` when the stem is shorter than four
/// characters or its tail is not all ASCII digits.
pub fn source_year(stem: &str) -> SourceYear {
    let chars: Vec<char> = stem.chars().collect();
    if chars.len() < 4 {
        return SourceYear::Unknown;
    }
    let tail = &chars[chars.len() - 4..];
    if tail.iter().all(|c| c.is_ascii_digit()) {
        SourceYear::Known(tail.iter().collect())
    } else {
        SourceYear::Unknown
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn limit(self) -> f64 {
        match self {
            Axis::Latitude => 90.0,
            Axis::Longitude => 180.0,
        }
    }
}

/// Parses one coordinate cell in decimal degrees.
pub fn parse_coordinate(cell: &str, axis: Axis) -> Result<f64, RowDrop> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Err(RowDrop::MissingCoordinate);
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= axis.limit() => Ok(v),
        _ => Err(RowDrop::InvalidCoordinate),
    }
}

// ---------------------------------------------------------------------------
// Row reconciliation
// ---------------------------------------------------------------------------

/// Derives the typed record for one row, or the reason it must be dropped.
///
/// Coordinates are checked before depth, so a row failing both is counted
/// as a coordinate drop.
pub fn reconcile_record(raw: RawRecord) -> Result<ReconciledRecord, RowDrop> {
    let latitude = parse_coordinate(&raw.latitude, Axis::Latitude)?;
    let longitude = parse_coordinate(&raw.longitude, Axis::Longitude)?;
    let avg_depth = extract_avg_depth(&raw.depth_range).ok_or(RowDrop::UnparseableDepth)?;

    Ok(ReconciledRecord {
        date: raw.date,
        location: raw.location,
        latitude,
        longitude,
        depth_range: raw.depth_range,
        avg_depth,
        year: raw.year,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(lat: &str, lon: &str, depth: &str) -> RawRecord {
        RawRecord {
            source_file: "flood_2021.csv".to_string(),
            row: 1,
            date: "12/18/2021".to_string(),
            location: "Taman Sri Muda".to_string(),
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            depth_range: depth.to_string(),
            year: SourceYear::Known("2021".to_string()),
        }
    }

    // --- Depth averaging ----------------------------------------------------

    #[test]
    fn test_depth_range_is_averaged() {
        let avg = extract_avg_depth("1.2-2.4").expect("two numeric tokens should parse");
        assert!((avg - 1.8).abs() < 1e-12, "expected 1.8, got {}", avg);
    }

    #[test]
    fn test_depth_tokens_are_trimmed() {
        assert_eq!(extract_avg_depth(" 0.5 - 1.5 "), Some(1.0));
    }

    #[test]
    fn test_single_depth_value_is_unparseable() {
        assert_eq!(extract_avg_depth("3.0"), None);
    }

    #[test]
    fn test_non_numeric_depth_token_is_unparseable() {
        assert_eq!(extract_avg_depth("abc-1.0"), None);
        assert_eq!(extract_avg_depth("0.3 to 0.6"), None);
        assert_eq!(extract_avg_depth(""), None);
    }

    #[test]
    fn test_wrong_token_count_is_unparseable() {
        assert_eq!(extract_avg_depth("0.1-0.2-0.3"), None);
        assert_eq!(extract_avg_depth("-1.0"), None);
        assert_eq!(extract_avg_depth("1.0-"), None);
    }

    #[test]
    fn test_non_finite_depth_is_unparseable() {
        assert_eq!(extract_avg_depth("inf-1.0"), None);
        assert_eq!(extract_avg_depth("NaN-1.0"), None);
    }

    // --- Source year --------------------------------------------------------

    #[test]
    fn test_year_from_stem_tail() {
        assert_eq!(source_year("kl_flood_2021"), SourceYear::Known("2021".to_string()));
        assert_eq!(source_year("2019"), SourceYear::Known("2019".to_string()));
    }

    #[test]
    fn test_short_stem_falls_back_to_unknown() {
        assert_eq!(source_year("kl"), SourceYear::Unknown);
        assert_eq!(source_year(""), SourceYear::Unknown);
    }

    #[test]
    fn test_non_numeric_tail_falls_back_to_unknown() {
        assert_eq!(source_year("kl_flood_data"), SourceYear::Unknown);
        assert_eq!(source_year("flood_20a1"), SourceYear::Unknown);
    }

    // --- Coordinates --------------------------------------------------------

    #[test]
    fn test_coordinate_parsing() {
        assert_eq!(parse_coordinate(" 3.1390 ", Axis::Latitude), Ok(3.139));
        assert_eq!(parse_coordinate("", Axis::Longitude), Err(RowDrop::MissingCoordinate));
        assert_eq!(parse_coordinate("N/A", Axis::Latitude), Err(RowDrop::InvalidCoordinate));
        assert_eq!(parse_coordinate("91.0", Axis::Latitude), Err(RowDrop::InvalidCoordinate));
        assert_eq!(parse_coordinate("101.69", Axis::Longitude), Ok(101.69));
        assert_eq!(parse_coordinate("181", Axis::Longitude), Err(RowDrop::InvalidCoordinate));
    }

    // --- Row reconciliation -------------------------------------------------

    #[test]
    fn test_valid_row_reconciles() {
        let rec = reconcile_record(raw("3.0738", "101.5183", "0.5-1.5")).expect("row is valid");
        assert_eq!(rec.latitude, 3.0738);
        assert_eq!(rec.longitude, 101.5183);
        assert_eq!(rec.avg_depth, 1.0);
        assert_eq!(rec.depth_range, "0.5-1.5");
    }

    #[test]
    fn test_row_drop_reasons() {
        assert_eq!(reconcile_record(raw("", "101.5", "0.5-1.5")), Err(RowDrop::MissingCoordinate));
        assert_eq!(reconcile_record(raw("3.0", "x", "0.5-1.5")), Err(RowDrop::InvalidCoordinate));
        assert_eq!(reconcile_record(raw("3.0", "101.5", "1.5")), Err(RowDrop::UnparseableDepth));
    }

    #[test]
    fn test_coordinate_drop_wins_over_depth_drop() {
        assert_eq!(reconcile_record(raw("", "101.5", "deep")), Err(RowDrop::MissingCoordinate));
    }
}

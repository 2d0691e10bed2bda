//! Header alias registry for flood incident spreadsheets.
//!
//! Each year's export names its columns a little differently. This module is
//! the single source of truth for the known variants: every header read from
//! a source file is trimmed and looked up here before any cell is touched.
//! Unknown headers pass through unchanged.

use serde::Deserialize;

use crate::model::{COL_DATE, COL_DEPTH, COL_LATITUDE, COL_LONGITUDE, COL_LOCATION};

// ---------------------------------------------------------------------------
// Alias table
// ---------------------------------------------------------------------------

/// One known spelling of a column and the canonical name it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderAlias {
    pub variant: String,
    pub canonical: String,
}

/// Static form of [`HeaderAlias`] for the built-in table.
pub struct BuiltinAlias {
    pub variant: &'static str,
    pub canonical: &'static str,
}

/// Columns every source file must provide once aliases are applied.
pub static CANONICAL_COLUMNS: &[&str] = &[COL_DATE, COL_LOCATION, COL_LATITUDE, COL_LONGITUDE, COL_DEPTH];

/// Header variants seen in the upper-case exports.
///
/// `LATITTUDE (NORTH)` is misspelled in the source files and must stay
/// misspelled here.
pub static HEADER_ALIASES: &[BuiltinAlias] = &[
    BuiltinAlias { variant: "DATE", canonical: COL_DATE },
    BuiltinAlias { variant: "LOCATION", canonical: COL_LOCATION },
    BuiltinAlias { variant: "LATITTUDE (NORTH)", canonical: COL_LATITUDE },
    BuiltinAlias { variant: "LONGITUDE (EAST)", canonical: COL_LONGITUDE },
    BuiltinAlias { variant: "MAXIMUM DEPTH (M)", canonical: COL_DEPTH },
];

// ---------------------------------------------------------------------------
// Header map
// ---------------------------------------------------------------------------

/// The built-in alias table extended with any aliases from configuration.
///
/// Lookups are exact on the trimmed header. Configured aliases are consulted
/// after the built-in ones, so they can add variants but not redirect one.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    extra: Vec<HeaderAlias>,
}

impl Default for HeaderMap {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HeaderMap {
    pub fn builtin() -> Self {
        HeaderMap { extra: Vec::new() }
    }

    pub fn with_aliases(extra: Vec<HeaderAlias>) -> Self {
        HeaderMap { extra }
    }

    /// Canonical name for a raw header, or the trimmed header itself when
    /// no alias matches.
    pub fn canonical_name<'a>(&'a self, header: &'a str) -> &'a str {
        let header = header.trim();
        if let Some(alias) = HEADER_ALIASES.iter().find(|a| a.variant == header) {
            return alias.canonical;
        }
        self.extra
            .iter()
            .find(|a| a.variant == header)
            .map(|a| a.canonical.as_str())
            .unwrap_or(header)
    }

    /// Reconciles a whole header row, preserving column positions.
    pub fn reconcile<'a, I>(&self, headers: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        headers
            .into_iter()
            .map(|h| self.canonical_name(h).to_string())
            .collect()
    }

    /// True when the trimmed header is a known variant or already canonical.
    pub fn is_recognized(&self, header: &str) -> bool {
        let canonical = self.canonical_name(header);
        CANONICAL_COLUMNS.contains(&canonical)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

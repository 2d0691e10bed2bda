//! Pipeline configuration.
//!
//! Loaded from a TOML file whose path comes from `--config` or the
//! `FLOODMAP_CONFIG` environment variable (a `.env` file is honoured). Every
//! field has a default, so the pipeline runs with no configuration at all
//! against `data/` and `output/` in the working directory.
//!
//! ```toml
//! [tabular]
//! input_dir = "data/floods"
//! on_file_error = "skip"
//!
//! [[tabular.header_aliases]]
//! variant = "KEDALAMAN (M)"
//! canonical = "Maximum Depth(m)"
//!
//! [overlay]
//! archive = "data/KL_2025.kmz"
//!
//! [logging]
//! level = "debug"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::headers::{HeaderAlias, HeaderMap};
use crate::ingest::kmz::OverlayOptions;
use crate::ingest::tabular::{FileErrorPolicy, IngestOptions};
use crate::logging::LogLevel;

pub const CONFIG_ENV_VAR: &str = "FLOODMAP_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tabular: TabularConfig,
    pub overlay: OverlayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TabularConfig {
    pub input_dir: PathBuf,
    pub extension: String,
    pub on_file_error: FileErrorPolicy,
    pub output: PathBuf,
    pub header_aliases: Vec<HeaderAlias>,
}

impl Default for TabularConfig {
    fn default() -> Self {
        TabularConfig {
            input_dir: PathBuf::from("data"),
            extension: "csv".to_string(),
            on_file_error: FileErrorPolicy::Abort,
            output: PathBuf::from("output/flood_data.geojson"),
            header_aliases: Vec::new(),
        }
    }
}

impl TabularConfig {
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            headers: HeaderMap::with_aliases(self.header_aliases.clone()),
            extension: self.extension.trim_start_matches('.').to_string(),
            on_file_error: self.on_file_error,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub archive: PathBuf,
    pub image_output: PathBuf,
    pub manifest_output: PathBuf,
    pub retain_dir: Option<PathBuf>,
    /// Where temporary unpack directories are created when `retain_dir` is
    /// unset. Defaults to the system temp dir.
    pub work_root: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            archive: PathBuf::from("data/overlay.kmz"),
            image_output: PathBuf::from("output/overlay.png"),
            manifest_output: PathBuf::from("output/overlay.json"),
            retain_dir: None,
            work_root: None,
        }
    }
}

impl OverlayConfig {
    pub fn overlay_options(&self) -> OverlayOptions {
        OverlayOptions {
            retain_dir: self.retain_dir.clone(),
            work_root: self.work_root.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            file: None,
            timestamps: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Reads and parses a config file. A missing file is an error here; use
/// [`PipelineConfig::from_env`] for the optional lookup.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl PipelineConfig {
    /// Loads the file named by `FLOODMAP_CONFIG` (after reading `.env`), or
    /// the defaults when the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => load_config(Path::new(path.trim())),
            _ => Ok(PipelineConfig::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

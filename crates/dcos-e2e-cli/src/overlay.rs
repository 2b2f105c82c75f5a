//! Loading the installer config overlay from a file.

use dcos_e2e_core::{ClusterError, ExtraConfig};
use std::path::{Path, PathBuf};

/// Overlay file could not be used.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{path}: {source}")]
    Shape {
        path: PathBuf,
        #[source]
        source: ClusterError,
    },
}

/// Read an overlay from a YAML or JSON file.
///
/// The document must be a mapping; an empty file is an empty overlay.
pub fn load_overlay(path: &Path) -> Result<ExtraConfig, OverlayError> {
    let text = std::fs::read_to_string(path).map_err(|source| OverlayError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value: serde_json::Value = if text.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_yaml::from_str(&text).map_err(|source| OverlayError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };

    ExtraConfig::try_from(value).map_err(|source| OverlayError::Shape {
        path: path.to_path_buf(),
        source,
    })
}

//! Snapshot manifests: the non-tabular portion of each layer's state.
//!
//! Fact tables are not serialized; a loaded stack starts cold and repopulates
//! lazily. What a snapshot keeps is the shape of the stack (one manifest per
//! layer) plus the configuration and the module inventory of the bottom layer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::names::ModuleName;

/// The persisted record of one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerManifest {
    /// The layer's name.
    pub layer: String,
    /// Number of live table entries at store time. Informational only; the
    /// table itself is repopulated lazily after a load.
    pub entries: usize,
    /// Modules tracked at store time. Only the bottom layer records these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleName>,
}

fn manifest_path(directory: &Path, layer: &str) -> PathBuf {
    directory.join(format!("{}.json", layer))
}

/// Write a layer manifest under the snapshot directory.
pub fn store_manifest(directory: &Path, layer: &str, entries: usize) -> Result<(), EngineError> {
    store_manifest_with_modules(directory, layer, entries, Vec::new())
}

/// Write a layer manifest carrying the tracked module inventory.
pub fn store_manifest_with_modules(
    directory: &Path,
    layer: &str,
    entries: usize,
    modules: Vec<ModuleName>,
) -> Result<(), EngineError> {
    std::fs::create_dir_all(directory).map_err(|source| EngineError::Io {
        path: directory.to_path_buf(),
        source,
    })?;
    let path = manifest_path(directory, layer);
    let manifest = LayerManifest {
        layer: layer.to_string(),
        entries,
        modules,
    };
    let encoded = serde_json::to_string_pretty(&manifest)
        .map_err(|source| EngineError::Manifest {
            path: path.clone(),
            source,
        })?;
    std::fs::write(&path, encoded).map_err(|source| EngineError::Io { path, source })
}

/// Write the stack configuration under the snapshot directory.
pub fn store_configuration(
    directory: &Path,
    configuration: &crate::configuration::Configuration,
) -> Result<(), EngineError> {
    std::fs::create_dir_all(directory).map_err(|source| EngineError::Io {
        path: directory.to_path_buf(),
        source,
    })?;
    let path = directory.join("configuration.json");
    let encoded = serde_json::to_string_pretty(configuration)
        .map_err(|source| EngineError::Manifest {
            path: path.clone(),
            source,
        })?;
    std::fs::write(&path, encoded).map_err(|source| EngineError::Io { path, source })
}

/// Read the stack configuration from the snapshot directory.
pub fn load_configuration(
    directory: &Path,
) -> Result<crate::configuration::Configuration, EngineError> {
    let path = directory.join("configuration.json");
    let encoded = std::fs::read_to_string(&path).map_err(|source| EngineError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&encoded).map_err(|source| EngineError::Manifest { path, source })
}

/// Read and validate a layer manifest from the snapshot directory.
///
/// Fails if the manifest is missing, malformed, or names a different layer;
/// in-memory state is never touched by a failed load.
pub fn load_manifest(directory: &Path, layer: &str) -> Result<LayerManifest, EngineError> {
    let path = manifest_path(directory, layer);
    let encoded = std::fs::read_to_string(&path).map_err(|source| EngineError::Io {
        path: path.clone(),
        source,
    })?;
    let manifest: LayerManifest =
        serde_json::from_str(&encoded).map_err(|source| EngineError::Manifest {
            path: path.clone(),
            source,
        })?;
    if manifest.layer != layer {
        return Err(EngineError::inconsistent_upstream(format!(
            "manifest at {} names layer {:?}, expected {:?}",
            path.display(),
            manifest.layer,
            layer
        )));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_round_trips() {
        let directory = std::env::temp_dir().join("env-flow-manifest-test");
        let _ = std::fs::remove_dir_all(&directory);

        store_manifest_with_modules(&directory, "parser", 3, vec![ModuleName::new("m")]).unwrap();
        let manifest = load_manifest(&directory, "parser").unwrap();
        assert_eq!(manifest.entries, 3);
        assert_eq!(manifest.modules, vec![ModuleName::new("m")]);

        assert!(load_manifest(&directory, "absent").is_err());
        let _ = std::fs::remove_dir_all(&directory);
    }
}

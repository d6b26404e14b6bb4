//! Compose inventory loading
//!
//! Reads a compose file and hands back one opaque record per declared
//! service. Interpreting the records is left to discovery, so a single
//! malformed service never fails the whole load.

use crate::error::InventoryError;
use serde_yaml::Value;
use std::path::Path;
use tracing::{debug, warn};

/// One service declaration exactly as written in the compose file
#[derive(Debug, Clone, PartialEq)]
pub struct RawServiceEntry {
    pub name: String,
    pub spec: Value,
}

/// Source of raw service declarations
pub trait InventoryProvider: Send + Sync {
    /// Load all service declarations, in file order
    fn load(&self, path: &Path) -> Result<Vec<RawServiceEntry>, InventoryError>;
}

/// Inventory provider backed by a YAML compose file on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeFile;

impl InventoryProvider for ComposeFile {
    fn load(&self, path: &Path) -> Result<Vec<RawServiceEntry>, InventoryError> {
        if !path.exists() {
            return Err(InventoryError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let document: Value =
            serde_yaml::from_str(&content).map_err(|source| InventoryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(path = %path.display(), "Loaded compose file");
        Ok(entries_from_document(&document))
    }
}

/// Split a parsed compose document into per-service records
pub fn entries_from_document(document: &Value) -> Vec<RawServiceEntry> {
    let Some(services) = document.get("services") else {
        warn!("No services found in compose file");
        return Vec::new();
    };

    let Some(services) = services.as_mapping() else {
        if !services.is_null() {
            warn!("Compose `services` is not a mapping, ignoring it");
        }
        return Vec::new();
    };

    services
        .iter()
        .filter_map(|(name, spec)| match name.as_str() {
            Some(name) => Some(RawServiceEntry {
                name: name.to_string(),
                spec: spec.clone(),
            }),
            None => {
                warn!(key = ?name, "Skipping service with a non-string name");
                None
            }
        })
        .collect()
}

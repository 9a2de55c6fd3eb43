use crate::error::AppError;
use crate::geocode::Lookup;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Coordinate-to-place cache, persisted between runs as a JSON map.
///
/// Keys are coordinates quantized to 4 decimal places (roughly 11 m), so a
/// burst of shots from the same spot costs one remote lookup. A missing or
/// corrupt cache file degrades to an empty cache, never a failed run.
pub struct PlaceCache {
    path: PathBuf,
    entries: BTreeMap<String, Lookup>,
    dirty: bool,
}

impl PlaceCache {
    pub fn load(path: &Path) -> Self {
        let entries = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Ignoring unreadable place cache {:?}: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        log::debug!("Loaded {} cached place lookup(s) from {:?}", entries.len(), path);
        Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        }
    }

    pub fn key(lat: f64, lon: f64) -> String {
        format!("{:.4},{:.4}", lat, lon)
    }

    pub fn get(&self, key: &str) -> Option<&Lookup> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, lookup: Lookup) {
        self.entries.insert(key, lookup);
        self.dirty = true;
    }

    pub fn persist(&self) -> Result<(), AppError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        log::debug!(
            "Persisted {} place lookup(s) to {:?}",
            self.entries.len(),
            self.path
        );
        Ok(())
    }
}

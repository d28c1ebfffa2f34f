//! Manifest embedded in every archive: relative path -> modification time

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Snapshot of every file seen by one backup run.
///
/// Keys are `/`-separated paths relative to home, values are modification
/// times in fractional seconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, f64>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, mtime: f64) {
        self.entries.insert(path.into(), mtime);
    }

    pub fn get(&self, path: &str) -> Option<f64> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// True when both manifests cover exactly the same paths
    pub fn same_paths(&self, other: &Manifest) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.keys().all(|k| other.entries.contains_key(k))
    }

    /// Whether a file must be copied into the next archive.
    ///
    /// New paths and paths whose modification time moved strictly forward
    /// are selected.
    pub fn needs_backup(&self, path: &str, mtime: f64) -> bool {
        match self.entries.get(path) {
            None => true,
            Some(&recorded) => mtime > recorded,
        }
    }

    /// Serialize as a pretty-printed JSON object
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(path, mtime)| {
                let value = serde_json::Number::from_f64(*mtime)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                (path.clone(), value)
            })
            .collect();
        Ok(serde_json::to_vec_pretty(&Value::Object(map))?)
    }

    /// Parse a manifest.
    ///
    /// The top level must be a JSON object. Entries whose value is not a
    /// number (such as the legacy `_excluded_files` list) are ignored.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(map) = value else {
            return Err(Error::Config("manifest is not a JSON object".to_string()));
        };

        let mut manifest = Manifest::new();
        for (path, value) in map {
            match value.as_f64() {
                Some(mtime) => manifest.insert(path, mtime),
                None => tracing::debug!("Ignoring non-numeric manifest entry '{}'", path),
            }
        }
        Ok(manifest)
    }
}

/// Modification time of a file as fractional seconds since the epoch
pub fn file_mtime(path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(path).map_err(|e| Error::fs(path, e))?;
    let modified = metadata.modified().map_err(|e| Error::fs(path, e))?;
    Ok(system_time_to_secs(modified))
}

fn system_time_to_secs(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

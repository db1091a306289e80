//! Per-mapsquare map encryption keys
//!
//! Loaded once at startup and shared read-only between every tick unit. A
//! mapsquare without an entry uses the all-zero key, which the client treats
//! as an unencrypted area.

use std::path::Path;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use serde::Deserialize;
use tracing::info;

/// Four-word map key
pub type MapKey = [u32; 4];

pub const ZERO_KEY: MapKey = [0; 4];

#[derive(Debug, thiserror::Error)]
pub enum RegionKeyError {
    #[error("failed to read region keys: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid region key file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct KeyEntry {
    mapsquare: u16,
    key: [i32; 4],
}

/// Mapsquare id (`x << 8 | z`) -> key
#[derive(Debug, Clone, Default)]
pub struct RegionKeys {
    keys: HashMap<u16, MapKey, FxBuildHasher>,
}

impl RegionKeys {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON array of `{ "mapsquare": id, "key": [k0, k1, k2, k3] }`
    pub fn from_json(json: &str) -> Result<Self, RegionKeyError> {
        let entries: Vec<KeyEntry> = serde_json::from_str(json)?;
        let mut keys = HashMap::with_capacity_and_hasher(entries.len(), FxBuildHasher);
        for entry in entries {
            keys.insert(entry.mapsquare, entry.key.map(|k| k as u32));
        }
        Ok(Self { keys })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegionKeyError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let keys = Self::from_json(&json)?;
        info!(path = %path.display(), count = keys.len(), "Loaded region keys");
        Ok(keys)
    }

    pub fn mapsquare_id(x: i32, z: i32) -> u16 {
        ((x as u16 & 0xFF) << 8) | (z as u16 & 0xFF)
    }

    pub fn insert(&mut self, x: i32, z: i32, key: MapKey) {
        self.keys.insert(Self::mapsquare_id(x, z), key);
    }

    /// Key for a mapsquare and whether one was stored
    pub fn lookup(&self, x: i32, z: i32) -> (MapKey, bool) {
        match self.keys.get(&Self::mapsquare_id(x, z)) {
            Some(key) => (*key, true),
            None => (ZERO_KEY, false),
        }
    }

    pub fn key_or_zero(&self, x: i32, z: i32) -> MapKey {
        self.lookup(x, z).0
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

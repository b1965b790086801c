use crate::error::{AnyResult, IoResultExt};
use crate::models::Catalog;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Hands out TrackIDs for file paths.
///
/// The sync engine only ever talks to this trait, so tests can inject a
/// pre-seeded allocator.
pub trait TrackIdAllocator {
    /// Existing identifier for `path`, or a freshly issued one.
    fn get_or_assign(&mut self, path: &Path) -> i64;

    fn track_id(&self, path: &Path) -> Option<i64>;

    fn remove(&mut self, path: &Path);
}

/// Persistent path -> TrackID assignments.
///
/// Kept in its own file so identifiers stay stable even when the catalog
/// XML is rewritten or regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierMap {
    paths: BTreeMap<String, i64>,
    next_id: i64,
}

impl Default for IdentifierMap {
    fn default() -> Self {
        Self {
            paths: BTreeMap::new(),
            next_id: 1,
        }
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `path` to `track_id`, moving the counter past it if needed.
    pub fn assign(&mut self, path: &Path, track_id: i64) {
        self.paths.insert(key(path), track_id);
        if track_id >= self.next_id {
            self.next_id = track_id + 1;
        }
    }

    /// Adopts every track already in `catalog` under its current TrackID.
    /// Entries handing a catalog TrackID to some other path are dropped
    /// first, so the catalog owns its identifiers. Returns how many paths
    /// were newly pinned.
    pub fn adopt_catalog(&mut self, catalog: &Catalog) -> usize {
        let owners: HashMap<i64, String> = catalog
            .tracks
            .values()
            .map(|track| (track.track_id, key(&track.file_path())))
            .collect();
        let before = self.paths.len();
        self.paths.retain(|path, id| owners.get(&*id).map_or(true, |owner| owner == path));
        let evicted = before - self.paths.len();
        if evicted > 0 {
            warn!("Dropped {} stale identifier map entries claiming catalog TrackIDs", evicted);
        }

        let mut adopted = 0;
        for track in catalog.tracks.values() {
            let path = track.file_path();
            if self.track_id(&path) != Some(track.track_id) {
                self.assign(&path, track.track_id);
                adopted += 1;
            }
        }
        if adopted > 0 {
            debug!("Adopted {} catalog tracks into the identifier map", adopted);
        }
        adopted
    }

    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let path = path.as_ref();
        let data = fs::read(path).at(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> AnyResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data).at(path)
    }
}

impl TrackIdAllocator for IdentifierMap {
    fn get_or_assign(&mut self, path: &Path) -> i64 {
        if let Some(existing) = self.track_id(path) {
            return existing;
        }
        let id = self.next_id;
        self.paths.insert(key(path), id);
        self.next_id += 1;
        id
    }

    fn track_id(&self, path: &Path) -> Option<i64> {
        self.paths.get(&key(path)).copied()
    }

    fn remove(&mut self, path: &Path) {
        self.paths.remove(&key(path));
    }
}

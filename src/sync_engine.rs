use crate::id_map::TrackIdAllocator;
use crate::models::{encode_location, Catalog, Node, Track};
use crate::scanner::{ScannedFile, ScannedFolder};
use chrono::{Local, NaiveDate};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// What a scan would change in the catalog.
#[derive(Debug, Clone)]
pub struct SyncDiff {
    /// Scanned files the catalog does not know yet, in tree order.
    pub new_files: Vec<ScannedFile>,
    /// Catalog tracks whose file was not seen, by TrackID ascending.
    pub removed_tracks: Vec<Track>,
    pub unchanged_count: usize,
    pub scanned_folders: Vec<ScannedFolder>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.removed_tracks.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} new, {} removed, {} unchanged",
            self.new_files.len(),
            self.removed_tracks.len(),
            self.unchanged_count
        )
    }

    /// TrackIDs of every removal candidate, for approving them all at once.
    pub fn removed_ids(&self) -> HashSet<i64> {
        self.removed_tracks.iter().map(|track| track.track_id).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub removed: usize,
    pub added: usize,
    pub playlists: usize,
}

/// Compares the catalog's track paths against a scan, by absolute path.
pub fn diff(catalog: &Catalog, scanned: &[ScannedFolder]) -> SyncDiff {
    let existing: HashSet<PathBuf> = catalog.tracks.values().map(Track::file_path).collect();

    let mut seen: HashSet<&PathBuf> = HashSet::new();
    let mut new_files = Vec::new();
    for folder in scanned {
        for file in folder.all_files() {
            if !seen.insert(&file.path) {
                continue;
            }
            if !existing.contains(&file.path) {
                new_files.push(file.clone());
            }
        }
    }

    let removed_tracks: Vec<Track> = catalog
        .tracks
        .values()
        .filter(|track| !seen.contains(&track.file_path()))
        .cloned()
        .collect();

    let unchanged_count = existing.iter().filter(|path| seen.contains(path)).count();

    let diff = SyncDiff {
        new_files,
        removed_tracks,
        unchanged_count,
        scanned_folders: scanned.to_vec(),
    };
    info!("Diff: {}", diff.summary());
    diff
}

/// Applies `diff` to `catalog`, stamping new tracks with today's date.
pub fn apply<A: TrackIdAllocator + ?Sized>(
    diff: &SyncDiff,
    catalog: &mut Catalog,
    ids: &mut A,
    approved_removals: &HashSet<i64>,
) -> ApplyReport {
    apply_on(diff, catalog, ids, approved_removals, Local::now().date_naive())
}

/// Removes approved tracks, adds the new files, then rebuilds the whole
/// playlist tree from the scanned folders.
pub fn apply_on<A: TrackIdAllocator + ?Sized>(
    diff: &SyncDiff,
    catalog: &mut Catalog,
    ids: &mut A,
    approved_removals: &HashSet<i64>,
    date_added: NaiveDate,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    let mut approved: Vec<i64> = approved_removals.iter().copied().collect();
    approved.sort_unstable();
    for track_id in approved {
        if let Some(track) = catalog.remove_track(track_id) {
            ids.remove(&track.file_path());
            report.removed += 1;
        }
    }

    let date = date_added.format("%Y-%m-%d").to_string();
    let known = catalog.path_index();
    for file in &diff.new_files {
        if known.contains_key(&file.path) {
            debug!("Already in catalog, not re-adding: {:?}", file.path);
            continue;
        }
        let mut track_id = ids.get_or_assign(&file.path);
        while catalog.tracks.contains_key(&track_id) {
            warn!("TrackID {} already taken, issuing a new one for {:?}", track_id, file.path);
            ids.remove(&file.path);
            track_id = ids.get_or_assign(&file.path);
        }
        catalog.insert_track(new_track(track_id, file, &date));
        report.added += 1;
    }

    let index = catalog.path_index();
    let children: Vec<Node> = diff
        .scanned_folders
        .iter()
        .filter_map(|folder| build_node(folder, &index))
        .collect();
    catalog.root = Node::root(children);
    report.playlists = catalog.root.playlist_count();

    info!(
        "Applied sync: {} removed, {} added, {} playlists",
        report.removed, report.added, report.playlists
    );
    report
}

fn new_track(track_id: i64, file: &ScannedFile, date_added: &str) -> Track {
    let mut track = Track::new(track_id);
    track.name = file.stem();
    track.location = encode_location(&file.path);
    track.size = file.size;
    track.kind = audio_kind(&file.extension()).to_string();
    track.date_added = date_added.to_string();
    track
}

/// Display name for an audio file extension.
pub fn audio_kind(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "mp3" => "MP3 File",
        "wav" => "WAV File",
        "flac" => "FLAC File",
        "aiff" | "aif" => "AIFF File",
        "aac" | "m4a" => "AAC File",
        "ogg" => "OGG File",
        "alac" => "ALAC File",
        _ => "Audio File",
    }
}

// Direct files become a playlist; a folder that also has subfolders holds
// that playlist as its first child.
fn build_node(folder: &ScannedFolder, index: &HashMap<PathBuf, i64>) -> Option<Node> {
    let track_ids: Vec<i64> = folder
        .files
        .iter()
        .filter_map(|file| index.get(&file.path).copied())
        .collect();
    let mut children: Vec<Node> = folder
        .children
        .iter()
        .filter_map(|child| build_node(child, index))
        .collect();

    match (track_ids.is_empty(), children.is_empty()) {
        (true, true) => None,
        (false, true) => Some(Node::playlist(&folder.name, track_ids)),
        (true, false) => Some(Node::folder(&folder.name, children)),
        (false, false) => {
            children.insert(0, Node::playlist(&folder.name, track_ids));
            Some(Node::folder(&folder.name, children))
        }
    }
}

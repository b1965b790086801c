use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use urlencoding::{decode, encode};

const LOCATION_PREFIX: &str = "file://localhost";
const STARS_STEP: u8 = 51;

pub const ROOT_NODE_NAME: &str = "ROOT";

/// The whole library: product triple, tracks keyed by TrackID, one tree.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Catalog {
    pub product_name: String,
    pub product_version: String,
    pub product_company: String,
    pub tracks: BTreeMap<i64, Track>,
    pub root: Node,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            product_name: "rekordbox".to_string(),
            product_version: String::new(),
            product_company: "AlphaTheta".to_string(),
            tracks: BTreeMap::new(),
            root: Node::root(Vec::new()),
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the track stored under its own TrackID.
    pub fn insert_track(&mut self, track: Track) {
        self.tracks.insert(track.track_id, track);
    }

    pub fn track(&self, track_id: i64) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    pub fn remove_track(&mut self, track_id: i64) -> Option<Track> {
        self.tracks.remove(&track_id)
    }

    pub fn track_by_path(&self, path: &Path) -> Option<&Track> {
        self.tracks.values().find(|track| track.file_path() == path)
    }

    /// Decoded file path of every track, mapped to its TrackID.
    pub fn path_index(&self) -> HashMap<PathBuf, i64> {
        self.tracks
            .values()
            .map(|track| (track.file_path(), track.track_id))
            .collect()
    }

    /// Slash-joined path of every playlist below the root, depth-first.
    /// e.g. `House/Deep House`
    pub fn playlist_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for child in self.root.children() {
            collect_playlist_paths(child, "", &mut paths);
        }
        paths
    }

    /// Tracks referenced by the selected playlist paths, in tree order,
    /// each track at most once. Dangling references resolve to nothing.
    pub fn tracks_in_playlists(&self, selected: &HashSet<String>) -> Vec<&Track> {
        let mut keys = Vec::new();
        for child in self.root.children() {
            collect_track_keys(child, "", selected, &mut keys);
        }

        let mut seen = HashSet::new();
        keys.into_iter()
            .filter(|key| seen.insert(*key))
            .filter_map(|key| self.tracks.get(&key))
            .collect()
    }

    /// Playlist entries pointing at TrackIDs this catalog does not hold.
    pub fn dangling_references(&self) -> Vec<i64> {
        let mut dangling = Vec::new();
        self.root.visit_playlists(&mut |_, ids| {
            dangling.extend(ids.iter().filter(|id| !self.tracks.contains_key(*id)));
        });
        dangling
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn collect_playlist_paths(node: &Node, prefix: &str, into: &mut Vec<String>) {
    let path = join_path(prefix, node.name());
    match node {
        Node::Playlist { .. } => into.push(path),
        Node::Folder { children, .. } => {
            for child in children {
                collect_playlist_paths(child, &path, into);
            }
        }
    }
}

fn collect_track_keys(node: &Node, prefix: &str, selected: &HashSet<String>, into: &mut Vec<i64>) {
    let path = join_path(prefix, node.name());
    match node {
        Node::Playlist { track_ids, .. } => {
            if selected.contains(&path) {
                into.extend_from_slice(track_ids);
            }
        }
        Node::Folder { children, .. } => {
            for child in children {
                collect_track_keys(child, &path, selected, into);
            }
        }
    }
}

/// One entry of the playlist tree.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Node {
    Folder { name: String, children: Vec<Node> },
    Playlist { name: String, track_ids: Vec<i64> },
}

impl Node {
    pub fn root(children: Vec<Node>) -> Self {
        Node::Folder {
            name: ROOT_NODE_NAME.to_string(),
            children,
        }
    }

    pub fn folder(name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Folder {
            name: name.into(),
            children,
        }
    }

    pub fn playlist(name: impl Into<String>, track_ids: Vec<i64>) -> Self {
        Node::Playlist {
            name: name.into(),
            track_ids,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Folder { name, .. } | Node::Playlist { name, .. } => name,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Node::Folder { .. })
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self, Node::Playlist { .. })
    }

    /// Children of a folder; playlists have none.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Folder { children, .. } => children.as_slice(),
            Node::Playlist { .. } => &[],
        }
    }

    /// TrackIDs of a playlist; folders reference no tracks.
    pub fn track_ids(&self) -> &[i64] {
        match self {
            Node::Playlist { track_ids, .. } => track_ids.as_slice(),
            Node::Folder { .. } => &[],
        }
    }

    pub fn find_child(&self, name: &str) -> Option<&Node> {
        self.children().iter().find(|child| child.name() == name)
    }

    pub fn playlist_count(&self) -> usize {
        let mut count = 0;
        self.visit_playlists(&mut |_, _| count += 1);
        count
    }

    fn visit_playlists(&self, visit: &mut dyn FnMut(&str, &[i64])) {
        match self {
            Node::Playlist { name, track_ids } => visit(name, track_ids),
            Node::Folder { children, .. } => {
                for child in children {
                    child.visit_playlists(visit);
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Track {
    pub track_id: i64,
    pub name: String,
    pub artist: String,
    pub composer: String,
    pub album: String,
    pub grouping: String,
    pub genre: String,
    pub kind: String,
    pub size: u64,
    pub total_time: i64, // seconds
    pub disc_number: i64,
    pub track_number: i64,
    pub year: i64,
    pub average_bpm: f64,
    pub date_added: String, // YYYY-MM-DD
    pub date_modified: String,
    pub bit_rate: i64,
    pub sample_rate: f64,
    pub comments: String,
    pub play_count: i64,
    pub last_played: String,
    pub rating: u8, // 0-255, see rating_to_stars
    pub location: String,
    pub remixer: String,
    pub tonality: String,
    pub label: String,
    pub mix: String,
    pub colour: String,
    pub tempos: Vec<Tempo>,
    pub position_marks: Vec<PositionMark>,
    /// Attributes we don't model, re-emitted verbatim on write.
    pub extra_attributes: BTreeMap<String, String>,
}

impl Track {
    pub fn new(track_id: i64) -> Self {
        Self {
            track_id,
            ..Default::default()
        }
    }

    /// Absolute path on disk, decoded from `location`.
    pub fn file_path(&self) -> PathBuf {
        PathBuf::from(decode_location(&self.location))
    }

    pub fn stars(&self) -> u8 {
        rating_to_stars(self.rating)
    }
}

pub fn rating_to_stars(rating: u8) -> u8 {
    rating / STARS_STEP
}

pub fn stars_to_rating(stars: u8) -> u8 {
    stars.min(5) * STARS_STEP
}

// Legal inside a URL path segment, so rekordbox writes them unescaped.
const PATH_SEGMENT_SAFE: &str = "!$&'()*+,;=:@";

/// `/Music/A B.mp3` -> `file://localhost/Music/A%20B.mp3`
pub fn encode_location(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let escaped: Vec<String> = raw.split('/').map(encode_segment).collect();
    format!("{}{}", LOCATION_PREFIX, escaped.join("/"))
}

fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if PATH_SEGMENT_SAFE.contains(ch) {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&encode(ch.encode_utf8(&mut buf)));
        }
    }
    out
}

pub fn decode_location(location: &str) -> String {
    let without_prefix = location
        .strip_prefix(LOCATION_PREFIX)
        .or_else(|| location.strip_prefix("file://"))
        .unwrap_or(location);

    match decode(without_prefix) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => without_prefix.to_string(),
    }
}

/// A beat grid anchor.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tempo {
    pub inizio: f64, // seconds
    pub bpm: f64,
    pub metro: String,
    pub battito: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionMarkType {
    #[default]
    Cue,
    FadeIn,
    FadeOut,
    Load,
    Loop,
}

impl PositionMarkType {
    /// Unknown codes fall back to a plain cue.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => PositionMarkType::FadeIn,
            2 => PositionMarkType::FadeOut,
            3 => PositionMarkType::Load,
            4 => PositionMarkType::Loop,
            _ => PositionMarkType::Cue,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            PositionMarkType::Cue => 0,
            PositionMarkType::FadeIn => 1,
            PositionMarkType::FadeOut => 2,
            PositionMarkType::Load => 3,
            PositionMarkType::Loop => 4,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CueColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// A cue point or loop. `num >= 0` is a hot cue slot, `-1` the memory cue.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PositionMark {
    pub name: String,
    pub kind: PositionMarkType,
    pub start: f64,
    pub end: Option<f64>,
    pub num: i64,
    pub color: Option<CueColor>,
}

impl PositionMark {
    pub fn is_hot_cue(&self) -> bool {
        self.num >= 0
    }

    pub fn is_memory_cue(&self) -> bool {
        self.num == -1
    }

    pub fn is_loop(&self) -> bool {
        self.kind == PositionMarkType::Loop
    }
}

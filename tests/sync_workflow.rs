use rekordsync_lib::commands::{self, AppState};
use rekordsync_lib::id_map::{IdentifierMap, TrackIdAllocator};
use rekordsync_lib::library_parser::parse_catalog_file;
use rekordsync_lib::library_writer::write_catalog_file;
use rekordsync_lib::models::{Catalog, Node};
use rekordsync_lib::scanner;
use rekordsync_lib::sync_engine;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    music: PathBuf,
    state: AppState,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music");
        fs::create_dir_all(&music).unwrap();

        let mut state = AppState::load(&dir.path().join("config")).unwrap();
        let music = commands::set_source_folder(&mut state, &music).unwrap();
        commands::set_catalog_file(&mut state, &dir.path().join("rekordbox.xml")).unwrap();

        Self { _dir: dir, music, state }
    }

    fn add(&self, relative: &str) -> PathBuf {
        let path = self.music.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, relative.as_bytes()).unwrap();
        path
    }

    fn catalog(&self) -> Catalog {
        parse_catalog_file(self.state.catalog_file().unwrap()).unwrap()
    }

    fn ids(&self) -> IdentifierMap {
        IdentifierMap::load(&self.state.track_ids_path).unwrap()
    }
}

#[test]
fn first_sync_builds_catalog_and_tree() {
    let ws = Workspace::new();
    ws.add("House/a.mp3");
    ws.add("House/b.wav");
    ws.add("Techno/c.flac");
    ws.add("Techno/readme.txt");
    ws.add("root.mp3");

    let outcome = commands::run_sync(&ws.state, false).unwrap();
    assert_eq!(outcome.report.added, 4);
    assert_eq!(outcome.total_tracks, 4);

    let catalog = ws.catalog();
    assert_eq!(catalog.tracks.len(), 4);
    assert_eq!(catalog.root.name(), "ROOT");

    let names: Vec<&str> = catalog.root.children().iter().map(Node::name).collect();
    assert_eq!(names, vec!["music", "House", "Techno"]);
    assert_eq!(catalog.root.find_child("House").unwrap().track_ids().len(), 2);

    let a = catalog.track_by_path(&ws.music.join("House/a.mp3")).unwrap();
    assert_eq!(a.name, "a");
    assert_eq!(a.kind, "MP3 File");
    assert_eq!(ws.ids().track_id(&ws.music.join("House/a.mp3")), Some(a.track_id));
}

#[test]
fn resync_without_changes_is_a_no_op() {
    let ws = Workspace::new();
    ws.add("House/a.mp3");
    ws.add("House/Deep/b.mp3");

    commands::run_sync(&ws.state, false).unwrap();
    let before = fs::read(ws.state.catalog_file().unwrap()).unwrap();

    let diff = commands::preview_sync(&ws.state).unwrap();
    assert!(diff.is_empty());
    assert_eq!(diff.unchanged_count, 2);

    let outcome = commands::run_sync(&ws.state, false).unwrap();
    assert_eq!(outcome.report.added, 0);
    assert_eq!(outcome.report.removed, 0);
    let after = fs::read(ws.state.catalog_file().unwrap()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn nested_folders_keep_their_shape() {
    let ws = Workspace::new();
    ws.add("Techno/intro.mp3");
    ws.add("Techno/Deep/d.mp3");
    ws.add("Techno/Hard/Peak/p.mp3");
    fs::create_dir_all(ws.music.join("Techno/Empty/Inner")).unwrap();

    commands::run_sync(&ws.state, false).unwrap();
    let catalog = ws.catalog();

    assert_eq!(
        catalog.playlist_paths(),
        vec!["Techno/Techno", "Techno/Deep", "Techno/Hard/Peak"]
    );
    let selected: HashSet<String> = ["Techno/Hard/Peak".to_string()].into_iter().collect();
    let tracks = catalog.tracks_in_playlists(&selected);
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].name, "p");
}

#[test]
fn nested_house_and_flat_techno_sync_into_an_empty_catalog() {
    let ws = Workspace::new();
    let intro = ws.add("House/intro.mp3");
    let smooth = ws.add("House/Deep House/smooth.mp3");
    let groove = ws.add("House/Tech House/groove.mp3");
    let dark = ws.add("Techno/dark.flac");

    let outcome = commands::run_sync(&ws.state, false).unwrap();
    assert_eq!(outcome.report.added, 4);

    let catalog = ws.catalog();
    assert_eq!(catalog.tracks.len(), 4);
    let top: Vec<&str> = catalog.root.children().iter().map(Node::name).collect();
    assert_eq!(top, vec!["House", "Techno"]);

    let id = |path: &Path| catalog.track_by_path(path).unwrap().track_id;

    let house = catalog.root.find_child("House").unwrap();
    assert!(house.is_folder());
    let children: Vec<&str> = house.children().iter().map(Node::name).collect();
    assert_eq!(children, vec!["House", "Deep House", "Tech House"]);
    assert!(house.children().iter().all(Node::is_playlist));
    assert_eq!(house.children()[0].track_ids(), &[id(&intro)]);
    assert_eq!(house.find_child("Deep House").unwrap().track_ids(), &[id(&smooth)]);
    assert_eq!(house.find_child("Tech House").unwrap().track_ids(), &[id(&groove)]);

    let techno = catalog.root.find_child("Techno").unwrap();
    assert!(techno.is_playlist());
    assert_eq!(techno.track_ids(), &[id(&dark)]);
}

#[test]
fn removed_files_leave_the_catalog_and_keep_ids_stable() {
    let ws = Workspace::new();
    let keep = ws.add("House/keep.mp3");
    let gone = ws.add("House/gone.mp3");

    commands::run_sync(&ws.state, false).unwrap();
    let keep_id = ws.catalog().track_by_path(&keep).unwrap().track_id;
    let gone_id = ws.catalog().track_by_path(&gone).unwrap().track_id;

    fs::remove_file(&gone).unwrap();
    let diff = commands::preview_sync(&ws.state).unwrap();
    assert_eq!(diff.removed_tracks.len(), 1);
    assert_eq!(diff.removed_tracks[0].track_id, gone_id);

    // Kept on request, but no longer in any playlist.
    commands::run_sync(&ws.state, true).unwrap();
    let catalog = ws.catalog();
    assert!(catalog.track(gone_id).is_some());
    assert_eq!(catalog.root.find_child("House").unwrap().track_ids(), &[keep_id]);

    commands::run_sync(&ws.state, false).unwrap();
    let catalog = ws.catalog();
    assert!(catalog.track(gone_id).is_none());
    assert_eq!(catalog.track_by_path(&keep).unwrap().track_id, keep_id);
    assert_eq!(ws.ids().track_id(&gone), None);

    // Coming back means a new identifier.
    ws.add("House/gone.mp3");
    commands::run_sync(&ws.state, false).unwrap();
    let returned = ws.catalog().track_by_path(&gone).unwrap().track_id;
    assert_ne!(returned, gone_id);
    assert!(returned > keep_id.max(gone_id));
}

#[test]
fn existing_catalog_tracks_keep_their_ids_without_a_map() {
    let ws = Workspace::new();
    let old = ws.add("House/old.mp3");
    ws.add("House/new.mp3");

    // A catalog written by someone else, no identifier map on disk.
    let mut catalog = Catalog::new();
    let mut ids = IdentifierMap::new();
    ids.assign(&old, 500);
    let scanned = scanner::scan(&ws.music).unwrap();
    let only_old = scanner::prune_files(&scanned, |file| file.path == old);
    let diff = sync_engine::diff(&catalog, &only_old);
    sync_engine::apply(&diff, &mut catalog, &mut ids, &HashSet::new());
    write_catalog_file(&catalog, ws.state.catalog_file().unwrap()).unwrap();
    assert!(!Path::new(&ws.state.track_ids_path).exists());

    commands::run_sync(&ws.state, false).unwrap();
    let catalog = ws.catalog();
    assert_eq!(catalog.track_by_path(&old).unwrap().track_id, 500);
    assert_eq!(catalog.track_by_path(&ws.music.join("House/new.mp3")).unwrap().track_id, 501);
}

#[test]
fn corrupt_catalog_stops_the_sync() {
    let ws = Workspace::new();
    ws.add("House/a.mp3");
    fs::write(ws.state.catalog_file().unwrap(), b"<plist></plist>").unwrap();

    let err = commands::run_sync(&ws.state, false).unwrap_err();
    assert!(format!("{:#}", err).contains("DJ_PLAYLISTS"));
    // Nothing was overwritten.
    assert_eq!(fs::read(ws.state.catalog_file().unwrap()).unwrap(), b"<plist></plist>");
}

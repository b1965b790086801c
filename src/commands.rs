use crate::config::{self, AppSettings};
use crate::id_map::IdentifierMap;
use crate::library_parser::parse_catalog_file;
use crate::library_writer::write_catalog_file;
use crate::models::Catalog;
use crate::scanner::{self, ScannedFolder};
use crate::sync_engine::{self, ApplyReport, SyncDiff};
use crate::usb_sync::{self, CopyProgress, PlanOptions, UsbSyncPlan};
use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings plus where they and the identifier map are stored.
#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: AppSettings,
    pub settings_path: PathBuf,
    pub track_ids_path: PathBuf,
}

impl AppState {
    /// Reads `settings.json` from `config_dir`, falling back to defaults.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let settings_path = config_dir.join(config::SETTINGS_FILE);
        let settings = AppSettings::load_or_default(&settings_path)
            .with_context(|| format!("Failed to read settings {:?}", settings_path))?;
        Ok(Self {
            settings,
            settings_path,
            track_ids_path: config_dir.join(config::TRACK_IDS_FILE),
        })
    }

    pub fn from_default_location() -> Result<Self> {
        Self::load(&config::config_dir())
    }

    pub fn save_settings(&self) -> Result<()> {
        self.settings
            .save(&self.settings_path)
            .with_context(|| format!("Failed to save settings {:?}", self.settings_path))
    }

    pub fn source_folder(&self) -> Result<PathBuf> {
        self.settings
            .source_folder()
            .ok_or_else(|| anyhow!("Source folder not configured (use `config set-source <dir>`)"))
    }

    pub fn catalog_file(&self) -> Result<PathBuf> {
        self.settings
            .catalog_file()
            .ok_or_else(|| anyhow!("Catalog file not configured (use `config set-catalog <file>`)"))
    }
}

pub fn set_source_folder(state: &mut AppState, dir: &Path) -> Result<PathBuf> {
    let dir = fs::canonicalize(dir).with_context(|| format!("Cannot resolve {:?}", dir))?;
    if !dir.is_dir() {
        bail!("{:?} is not a directory", dir);
    }
    state.settings.source_folder_path = dir.to_string_lossy().into_owned();
    state.save_settings()?;
    info!("Source folder set to {:?}", dir);
    Ok(dir)
}

/// The catalog may not exist yet; only its parent has to.
pub fn set_catalog_file(state: &mut AppState, file: &Path) -> Result<PathBuf> {
    let file = if file.exists() {
        fs::canonicalize(file).with_context(|| format!("Cannot resolve {:?}", file))?
    } else {
        let parent = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let parent = fs::canonicalize(parent)
            .with_context(|| format!("Catalog folder {:?} does not exist", parent))?;
        let name = file
            .file_name()
            .ok_or_else(|| anyhow!("{:?} is not a file path", file))?;
        parent.join(name)
    };
    state.settings.catalog_file_path = file.to_string_lossy().into_owned();
    state.save_settings()?;
    info!("Catalog file set to {:?}", file);
    Ok(file)
}

/// Parses the catalog, or starts an empty one when the file is absent.
pub fn load_catalog_or_empty(path: &Path) -> Result<Catalog> {
    if !path.exists() {
        info!("No catalog at {:?}, starting empty", path);
        return Ok(Catalog::new());
    }
    parse_catalog_file(path).with_context(|| format!("Failed to load catalog {:?}", path))
}

/// Loads the identifier map (or a fresh one) and pins the catalog's
/// existing TrackIDs into it.
pub fn load_track_ids(path: &Path, catalog: &Catalog) -> Result<IdentifierMap> {
    let mut ids = if path.exists() {
        IdentifierMap::load(path).with_context(|| format!("Failed to load track ids {:?}", path))?
    } else {
        IdentifierMap::new()
    };
    ids.adopt_catalog(catalog);
    Ok(ids)
}

pub fn scan_source(state: &AppState) -> Result<Vec<ScannedFolder>> {
    let source = state.source_folder()?;
    scanner::scan(&source).with_context(|| format!("Failed to scan {:?}", source))
}

pub fn preview_sync(state: &AppState) -> Result<SyncDiff> {
    let catalog = load_catalog_or_empty(&state.catalog_file()?)?;
    let scanned = scan_source(state)?;
    Ok(sync_engine::diff(&catalog, &scanned))
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub summary: String,
    pub report: ApplyReport,
    pub total_tracks: usize,
}

/// Scan, diff, apply, then persist the catalog and the identifier map.
/// Every removal candidate is approved unless `keep_removed` is set.
pub fn run_sync(state: &AppState, keep_removed: bool) -> Result<SyncOutcome> {
    let catalog_path = state.catalog_file()?;
    let mut catalog = load_catalog_or_empty(&catalog_path)?;
    let mut ids = load_track_ids(&state.track_ids_path, &catalog)?;
    let scanned = scan_source(state)?;

    let diff = sync_engine::diff(&catalog, &scanned);
    let approved: HashSet<i64> = if keep_removed {
        HashSet::new()
    } else {
        diff.removed_ids()
    };
    let report = sync_engine::apply(&diff, &mut catalog, &mut ids, &approved);

    write_catalog_file(&catalog, &catalog_path)
        .with_context(|| format!("Failed to write catalog {:?}", catalog_path))?;
    ids.save(&state.track_ids_path)
        .with_context(|| format!("Failed to save track ids {:?}", state.track_ids_path))?;

    Ok(SyncOutcome {
        summary: diff.summary(),
        report,
        total_tracks: catalog.tracks.len(),
    })
}

pub fn list_playlists(state: &AppState) -> Result<Vec<String>> {
    let catalog = load_catalog_or_empty(&state.catalog_file()?)?;
    Ok(catalog.playlist_paths())
}

/// Plans a drive refresh for the tracks of the named playlists.
pub fn plan_usb_sync(state: &AppState, drive: &Path, playlists: &[String]) -> Result<UsbSyncPlan> {
    let catalog_path = state.catalog_file()?;
    let catalog = parse_catalog_file(&catalog_path)
        .with_context(|| format!("Failed to load catalog {:?}", catalog_path))?;

    let known: HashSet<String> = catalog.playlist_paths().into_iter().collect();
    let unknown: Vec<&String> = playlists.iter().filter(|name| !known.contains(*name)).collect();
    if !unknown.is_empty() {
        bail!("Unknown playlists: {:?}", unknown);
    }

    let selected: HashSet<String> = playlists.iter().cloned().collect();
    let tracks = catalog.tracks_in_playlists(&selected);
    usb_sync::plan_with(tracks, drive, PlanOptions::default())
        .with_context(|| format!("Failed to plan sync for drive {:?}", drive))
}

pub fn run_usb_sync<F>(state: &AppState, drive: &Path, playlists: &[String], progress: F) -> Result<usize>
where
    F: FnMut(CopyProgress),
{
    let plan = plan_usb_sync(state, drive, playlists)?;
    usb_sync::execute(&plan, progress).context("Drive sync stopped")
}

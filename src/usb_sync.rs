use crate::error::{AnyResult, IoResultExt, RekordsyncError};
use crate::models::Track;
use crate::scanner::is_broken_link;
use filetime::FileTime;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory rekordbox exports audio into on a drive.
pub const CONTENTS_DIR: &str = "Contents";

const MTIME_TOLERANCE_NANOS: i128 = 1_000_000_000;

/// One file to overwrite on the drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopy {
    pub source: PathBuf,
    /// Where the file already lives on the drive.
    pub destination: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbSyncPlan {
    pub copies: Vec<FileCopy>,
    pub drive_root: PathBuf,
}

impl UsbSyncPlan {
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.copies.len()
    }

    /// Drops every copy whose file name is not in `selected`.
    pub fn retain_files(&mut self, selected: &HashSet<String>) {
        self.copies.retain(|copy| selected.contains(&copy.file_name));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Also treat a modification time more than a second apart as a change.
    /// Off by default: FAT timestamps are coarse and rekordbox exports
    /// stamp copies with the export time.
    pub compare_modified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyProgress {
    pub completed: usize,
    pub total: usize,
    pub file_name: String,
}

/// Plans refreshes for `tracks` already deployed under `drive_root`,
/// comparing sizes only.
pub fn plan<'a, I>(tracks: I, drive_root: &Path) -> AnyResult<UsbSyncPlan>
where
    I: IntoIterator<Item = &'a Track>,
{
    plan_with(tracks, drive_root, PlanOptions::default())
}

/// Plans one copy per track whose source differs from the file of the same
/// name found on the drive. Never plans a file the drive does not have.
pub fn plan_with<'a, I>(tracks: I, drive_root: &Path, options: PlanOptions) -> AnyResult<UsbSyncPlan>
where
    I: IntoIterator<Item = &'a Track>,
{
    let contents = drive_root.join(CONTENTS_DIR);
    let index_root = if contents.is_dir() { contents } else { drive_root.to_path_buf() };
    let index = build_file_index(&index_root)?;

    let mut copies = Vec::new();
    for track in tracks {
        let source = track.file_path();
        let source_meta = match fs::metadata(&source) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("Source missing, skipping: {:?}", source);
                continue;
            }
            Err(err) => {
                return Err(RekordsyncError::Io {
                    path: source,
                    source: err,
                })
            }
        };

        let file_name = match source.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        let Some(destination) = index.get(&file_name) else {
            debug!("Not on drive, skipping: {}", file_name);
            continue;
        };

        let drive_meta = fs::metadata(destination).at(destination)?;
        if !differs(&source_meta, &drive_meta, options) {
            continue;
        }

        copies.push(FileCopy {
            source,
            destination: destination.clone(),
            file_name,
        });
    }

    info!("Drive plan for {:?}: {} files to refresh", drive_root, copies.len());
    Ok(UsbSyncPlan {
        copies,
        drive_root: drive_root.to_path_buf(),
    })
}

fn nanos(metadata: &fs::Metadata) -> i128 {
    let time = FileTime::from_last_modification_time(metadata);
    i128::from(time.unix_seconds()) * 1_000_000_000 + i128::from(time.nanoseconds())
}

fn differs(source: &fs::Metadata, drive: &fs::Metadata, options: PlanOptions) -> bool {
    if source.len() != drive.len() {
        return true;
    }
    options.compare_modified && (nanos(source) - nanos(drive)).abs() >= MTIME_TOLERANCE_NANOS
}

/// File name -> path of every regular file below `root`, first match wins.
fn build_file_index(root: &Path) -> AnyResult<HashMap<String, PathBuf>> {
    fs::read_dir(root).at(root)?;

    let mut index = HashMap::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_broken_link(&e) => {
                debug!("Skipping broken link on drive: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(first) = index.get(&name) {
            debug!("Duplicate file name on drive, keeping {:?} over {:?}", first, entry.path());
            continue;
        }
        index.insert(name, entry.into_path());
    }

    debug!("Indexed {} files under {:?}", index.len(), root);
    Ok(index)
}

/// Overwrites every planned destination with its source, keeping the
/// source's modification time. Stops at the first failure.
pub fn execute<F>(plan: &UsbSyncPlan, mut progress: F) -> AnyResult<usize>
where
    F: FnMut(CopyProgress),
{
    let total = plan.copies.len();
    for (done, copy) in plan.copies.iter().enumerate() {
        if copy.destination.exists() {
            fs::remove_file(&copy.destination).at(&copy.destination)?;
        }
        fs::copy(&copy.source, &copy.destination).at(&copy.destination)?;

        let source_meta = fs::metadata(&copy.source).at(&copy.source)?;
        filetime::set_file_mtime(
            &copy.destination,
            FileTime::from_last_modification_time(&source_meta),
        )
        .at(&copy.destination)?;

        info!("Copied {} ({}/{})", copy.file_name, done + 1, total);
        progress(CopyProgress {
            completed: done + 1,
            total,
            file_name: copy.file_name.clone(),
        });
    }
    Ok(total)
}

pub fn execute_silently(plan: &UsbSyncPlan) -> AnyResult<usize> {
    execute(plan, |_| {})
}

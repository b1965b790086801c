use crate::error::{AnyResult, IoResultExt};
use log::{debug, info};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

// Compared case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 9] = [
    "mp3", "wav", "flac", "aiff", "aif", "aac", "m4a", "ogg", "alac",
];

/// Snapshot of one audio file taken at scan time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl ScannedFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Filename without its extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or("")
            .to_lowercase()
    }
}

/// A folder holding audio files, directly or somewhere below it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFolder {
    pub name: String,
    pub path: PathBuf,
    pub files: Vec<ScannedFile>,
    pub children: Vec<ScannedFolder>,
}

impl ScannedFolder {
    /// Direct files first, then each child's files depth-first.
    pub fn all_files(&self) -> Vec<&ScannedFile> {
        let mut files: Vec<&ScannedFile> = self.files.iter().collect();
        for child in &self.children {
            files.extend(child.all_files());
        }
        files
    }

    pub fn file_count(&self) -> usize {
        self.files.len() + self.children.iter().map(ScannedFolder::file_count).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.children.is_empty()
    }

    /// Finds the folder at `path` in this subtree.
    pub fn find(&self, path: &Path) -> Option<&ScannedFolder> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

/// Every file of a scan result, in tree order.
pub fn all_files(folders: &[ScannedFolder]) -> Vec<&ScannedFile> {
    folders.iter().flat_map(ScannedFolder::all_files).collect()
}

pub fn is_audio_file(path: &Path) -> bool {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();
    AUDIO_EXTENSIONS.contains(&extension.as_str())
}

fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// True for walk errors raised by an entry below the walk root that points
/// nowhere: a link to a missing target or a link back up the tree.
pub(crate) fn is_broken_link(err: &walkdir::Error) -> bool {
    if err.depth() == 0 {
        return false;
    }
    err.loop_ancestor().is_some()
        || err
            .io_error()
            .map_or(false, |io| io.kind() == std::io::ErrorKind::NotFound)
}

/// Audio files and subdirectories directly inside `dir`, each sorted by name.
fn list_dir(dir: &Path) -> AnyResult<(Vec<ScannedFile>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();

    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_broken_link(&e) => {
                debug!("Skipping broken link: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if entry.file_type().is_dir() {
            subdirs.push(entry.into_path());
        } else if entry.file_type().is_file() && is_audio_file(entry.path()) {
            let metadata = entry.metadata()?;
            files.push(ScannedFile {
                size: metadata.len(),
                modified: metadata.modified().at(entry.path())?,
                path: entry.into_path(),
            });
        }
    }

    Ok((files, subdirs))
}

fn scan_folder(dir: &Path) -> AnyResult<Option<ScannedFolder>> {
    let (files, subdirs) = list_dir(dir)?;

    let mut children = Vec::new();
    for subdir in subdirs {
        if let Some(child) = scan_folder(&subdir)? {
            children.push(child);
        }
    }

    if files.is_empty() && children.is_empty() {
        debug!("Pruning folder without audio: {:?}", dir);
        return Ok(None);
    }

    Ok(Some(ScannedFolder {
        name: folder_name(dir),
        path: dir.to_path_buf(),
        files,
        children,
    }))
}

/// Scans `root` into one tree per immediate subfolder that holds audio.
///
/// Audio files lying directly in `root` are gathered into a leading folder
/// named after the root itself.
pub fn scan<P: AsRef<Path>>(root: P) -> AnyResult<Vec<ScannedFolder>> {
    let root = root.as_ref();
    // Surface an unlistable root as an I/O error on the root itself.
    std::fs::read_dir(root).at(root)?;

    let (root_files, subdirs) = list_dir(root)?;
    let mut folders = Vec::new();

    if !root_files.is_empty() {
        folders.push(ScannedFolder {
            name: folder_name(root),
            path: root.to_path_buf(),
            files: root_files,
            children: Vec::new(),
        });
    }

    for subdir in subdirs {
        if let Some(folder) = scan_folder(&subdir)? {
            folders.push(folder);
        }
    }

    info!(
        "Scanned {:?}: {} folders, {} audio files",
        root,
        folders.len(),
        folders.iter().map(ScannedFolder::file_count).sum::<usize>()
    );
    Ok(folders)
}

/// Keeps only the files `keep` accepts, dropping folders left empty.
pub fn prune_files<F>(folders: &[ScannedFolder], keep: F) -> Vec<ScannedFolder>
where
    F: Fn(&ScannedFile) -> bool,
{
    folders
        .iter()
        .filter_map(|folder| prune_files_in(folder, &keep))
        .collect()
}

fn prune_files_in<F>(folder: &ScannedFolder, keep: &F) -> Option<ScannedFolder>
where
    F: Fn(&ScannedFile) -> bool,
{
    let files: Vec<ScannedFile> = folder.files.iter().filter(|f| keep(*f)).cloned().collect();
    let children: Vec<ScannedFolder> = folder
        .children
        .iter()
        .filter_map(|child| prune_files_in(child, keep))
        .collect();

    if files.is_empty() && children.is_empty() {
        return None;
    }
    Some(ScannedFolder {
        name: folder.name.clone(),
        path: folder.path.clone(),
        files,
        children,
    })
}

/// Drops every folder `keep` rejects together with its subtree, then
/// collapses parents left without files.
pub fn prune_folders<F>(folders: &[ScannedFolder], keep: F) -> Vec<ScannedFolder>
where
    F: Fn(&ScannedFolder) -> bool,
{
    folders
        .iter()
        .filter_map(|folder| prune_folders_in(folder, &keep))
        .collect()
}

fn prune_folders_in<F>(folder: &ScannedFolder, keep: &F) -> Option<ScannedFolder>
where
    F: Fn(&ScannedFolder) -> bool,
{
    if !keep(folder) {
        return None;
    }
    let children: Vec<ScannedFolder> = folder
        .children
        .iter()
        .filter_map(|child| prune_folders_in(child, keep))
        .collect();

    if folder.files.is_empty() && children.is_empty() {
        return None;
    }
    Some(ScannedFolder {
        name: folder.name.clone(),
        path: folder.path.clone(),
        files: folder.files.clone(),
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(folders: &[ScannedFolder]) -> Vec<&str> {
        folders.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn finds_audio_by_top_level_folder() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "House/track1.mp3", "a");
        touch(dir.path(), "House/track2.wav", "bb");
        touch(dir.path(), "Techno/track3.flac", "ccc");
        touch(dir.path(), "readme.txt", "ignore me");

        let folders = scan(dir.path()).unwrap();

        assert_eq!(names(&folders), vec!["House", "Techno"]);
        assert_eq!(all_files(&folders).len(), 3);
        assert!(all_files(&folders)
            .iter()
            .all(|file| file.file_name() != "readme.txt"));
        assert_eq!(folders[0].files[1].size, 2);
    }

    #[test]
    fn extensions_match_case_insensitively() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Mixed/LOUD.MP3", "a");
        touch(dir.path(), "Mixed/quiet.Aif", "a");
        touch(dir.path(), "Mixed/cover.jpg", "a");

        let folders = scan(dir.path()).unwrap();
        let files: Vec<String> = all_files(&folders).iter().map(|f| f.file_name()).collect();
        assert_eq!(files, vec!["LOUD.MP3", "quiet.Aif"]);
    }

    #[test]
    fn empty_branches_are_pruned() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Empty/Nested/Deeper")).unwrap();
        fs::create_dir_all(dir.path().join("Empty/Other")).unwrap();
        touch(dir.path(), "Artwork/cover.png", "x");
        touch(dir.path(), "Real/song.mp3", "x");

        let folders = scan(dir.path()).unwrap();
        assert_eq!(names(&folders), vec!["Real"]);
    }

    #[test]
    fn nested_folders_keep_their_shape() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "House/intro.mp3", "x");
        touch(dir.path(), "House/Deep House/smooth.mp3", "x");
        touch(dir.path(), "House/Tech House/groove.mp3", "x");
        touch(dir.path(), "Techno/dark.flac", "x");

        let folders = scan(dir.path()).unwrap();
        let house = &folders[0];

        assert_eq!(house.files.len(), 1);
        assert_eq!(names(&house.children), vec!["Deep House", "Tech House"]);
        let order: Vec<String> = house.all_files().iter().map(|f| f.file_name()).collect();
        assert_eq!(order, vec!["intro.mp3", "smooth.mp3", "groove.mp3"]);
        assert_eq!(house.file_count(), 3);
    }

    #[test]
    fn root_level_audio_gets_a_folder_named_after_the_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Crate");
        touch(&root, "loose.mp3", "x");
        touch(&root, "Disco/boogie.mp3", "x");

        let folders = scan(&root).unwrap();
        assert_eq!(names(&folders), vec!["Crate", "Disco"]);
        assert_eq!(folders[0].files[0].file_name(), "loose.mp3");
        assert!(folders[0].children.is_empty());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b/2.mp3", "x");
        touch(dir.path(), "b/1.mp3", "x");
        touch(dir.path(), "a/z.mp3", "x");

        let folders = scan(dir.path()).unwrap();
        assert_eq!(names(&folders), vec!["a", "b"]);
        let b_files: Vec<String> = folders[1].files.iter().map(|f| f.file_name()).collect();
        assert_eq!(b_files, vec!["1.mp3", "2.mp3"]);
    }

    #[cfg(unix)]
    #[test]
    fn broken_links_are_skipped() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "House/a.mp3", "x");
        std::os::unix::fs::symlink(
            dir.path().join("gone.txt"),
            dir.path().join("House/stale-link.txt"),
        )
        .unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.mp3"), dir.path().join("House/b.mp3"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("Unplugged"))
            .unwrap();

        let folders = scan(dir.path()).unwrap();
        assert_eq!(names(&folders), vec!["House"]);
        let files: Vec<String> = folders[0].files.iter().map(|f| f.file_name()).collect();
        assert_eq!(files, vec!["a.mp3"]);
    }

    #[test]
    fn missing_root_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = scan(dir.path().join("nope")).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn pruning_by_file_collapses_empty_folders() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "House/keep.mp3", "x");
        touch(dir.path(), "House/Sub/drop.mp3", "x");
        touch(dir.path(), "Techno/drop.flac", "x");

        let folders = scan(dir.path()).unwrap();
        let kept = prune_files(&folders, |file| file.stem() == "keep");

        assert_eq!(names(&kept), vec!["House"]);
        assert!(kept[0].children.is_empty());
    }

    #[test]
    fn pruning_by_folder_drops_whole_subtrees() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "House/Deep/a.mp3", "x");
        touch(dir.path(), "House/Tech/b.mp3", "x");
        touch(dir.path(), "Techno/c.mp3", "x");

        let folders = scan(dir.path()).unwrap();
        let kept = prune_folders(&folders, |folder| folder.name != "Deep" && folder.name != "Techno");

        assert_eq!(names(&kept), vec!["House"]);
        assert_eq!(names(&kept[0].children), vec!["Tech"]);

        let only_deep = prune_folders(&folders, |folder| folder.name != "Tech");
        let house = only_deep.iter().find(|f| f.name == "House").unwrap();
        assert!(house.find(&dir.path().join("House/Deep")).is_some());
        assert!(house.find(&dir.path().join("House/Tech")).is_none());
    }
}

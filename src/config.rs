use crate::error::{AnyResult, IoResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "rekordsync";
pub const CONFIG_DIR_ENV: &str = "REKORDSYNC_CONFIG_DIR";

pub const SETTINGS_FILE: &str = "settings.json";
pub const TRACK_IDS_FILE: &str = "trackids.json";

/// The two paths the sync workflow needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Root of the music folder that gets scanned.
    pub source_folder_path: String,
    /// rekordbox XML catalog that gets rewritten.
    pub catalog_file_path: String,
}

impl AppSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let path = path.as_ref();
        let data = fs::read(path).at(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Defaults when the file does not exist yet; any other failure is
    /// returned.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> AnyResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data).at(path)
    }

    pub fn source_folder(&self) -> Option<PathBuf> {
        non_empty(&self.source_folder_path)
    }

    pub fn catalog_file(&self) -> Option<PathBuf> {
        non_empty(&self.catalog_file_path)
    }
}

fn non_empty(value: &str) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// `$REKORDSYNC_CONFIG_DIR`, else `<config dir>/rekordsync`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Logs live under the config override when one is set, so a portable
/// install keeps everything in one place.
pub fn log_dir() -> PathBuf {
    if std::env::var_os(CONFIG_DIR_ENV).is_some_and(|dir| !dir.is_empty()) {
        return config_dir().join("logs");
    }
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn settings_survive_a_save_and_load() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("nested").join("settings.json");
        let settings = AppSettings {
            source_folder_path: "/Users/dj/Music/Sets".to_string(),
            catalog_file_path: "/Users/dj/rekordbox.xml".to_string(),
        };

        settings.save(&file).unwrap();
        assert_eq!(AppSettings::load(&file).unwrap(), settings);
    }

    #[test]
    fn missing_file_means_defaults_but_garbage_does_not() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("settings.json");
        assert_eq!(AppSettings::load_or_default(&file).unwrap(), AppSettings::default());

        fs::write(&file, b"{ nope").unwrap();
        assert!(AppSettings::load_or_default(&file).is_err());
    }

    #[test]
    fn partial_settings_fill_in_the_rest() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("settings.json");
        fs::write(&file, br#"{"source_folder_path": "/music"}"#).unwrap();

        let settings = AppSettings::load(&file).unwrap();
        assert_eq!(settings.source_folder(), Some(PathBuf::from("/music")));
        assert_eq!(settings.catalog_file(), None);
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use assets::{AssetOptions, DEFAULT_MAX_UPLOAD_BYTES};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_EDIT_BYTES: usize = 512 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    /// In-process folder tree; contents are lost on exit.
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub uploads_dir: String,
    pub catalog_path: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Whole-request cap for an asset edit, which may carry many payloads.
    pub max_edit_bytes: usize,
    pub storage_backend: StorageBackend,
    pub fill_tags_from_audio: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            uploads_dir: "uploads".to_string(),
            catalog_path: "catalog.redb".to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_edit_bytes: DEFAULT_MAX_EDIT_BYTES,
            storage_backend: StorageBackend::Local,
            fill_tags_from_audio: true,
        }
    }
}

impl ServerConfig {
    pub fn asset_options(&self) -> AssetOptions {
        AssetOptions {
            max_upload_bytes: self.max_upload_bytes,
            fill_tags_from_audio: self.fill_tags_from_audio,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("REPERTOIRE_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Loads the config file, writing a default one first when it does not
/// exist. The flag is true when the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        normalize(&mut config);
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

fn normalize(config: &mut ServerConfig) {
    let defaults = ServerConfig::default();
    if config.version < CONFIG_VERSION {
        config.version = CONFIG_VERSION;
    }
    if config.uploads_dir.trim().is_empty() {
        config.uploads_dir = defaults.uploads_dir;
    }
    if config.catalog_path.trim().is_empty() {
        config.catalog_path = defaults.catalog_path;
    }
    if config.port == 0 {
        config.port = DEFAULT_PORT;
    }
    if config.max_upload_bytes == 0 {
        config.max_upload_bytes = DEFAULT_MAX_UPLOAD_BYTES;
    }
    if config.max_edit_bytes == 0 {
        config.max_edit_bytes = DEFAULT_MAX_EDIT_BYTES;
    }
    config.max_edit_bytes = config.max_edit_bytes.max(config.max_upload_bytes);
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Relative paths in the config are relative to the config file.
pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value.trim());
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert!(path.exists());
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.storage_backend, StorageBackend::Local);

        let (again, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(again.uploads_dir, "uploads");
    }

    #[test]
    fn partial_file_is_filled_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "version: 0\nuploads_dir: ''\nport: 0\nstorage_backend: memory\nfill_tags_from_audio: false\n",
        )
        .unwrap();
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.uploads_dir, "uploads");
        assert_eq!(config.catalog_path, "catalog.redb");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(!config.asset_options().fill_tags_from_audio);
        assert_eq!(config.max_edit_bytes, DEFAULT_MAX_EDIT_BYTES);
    }

    #[test]
    fn edit_limit_never_drops_below_upload_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "max_upload_bytes: 1000\nmax_edit_bytes: 10\n").unwrap();
        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.max_edit_bytes, 1000);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "storage_backend: gdrive\n").unwrap();
        assert!(matches!(
            load_or_create_config(&path),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let config_path = Path::new("/etc/repertoire/config.yaml");
        assert_eq!(
            resolve_path(config_path, "uploads"),
            PathBuf::from("/etc/repertoire/uploads")
        );
        assert_eq!(resolve_path(config_path, "/data/c.redb"), PathBuf::from("/data/c.redb"));
        assert_eq!(
            resolve_path(Path::new("config.yaml"), "uploads"),
            PathBuf::from("./uploads")
        );
    }
}

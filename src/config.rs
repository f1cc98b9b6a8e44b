use std::path::{Path, PathBuf};

use config::{Config, Environment};

use crate::error::VaultError;

/// Application configuration, loaded once at startup from the environment
/// (prefix `TUBEVAULT`, `__` as the nesting separator) and passed by
/// reference into each component constructor. Nothing reads ambient
/// environment state after this.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    pub spreadsheet_id: String,
    pub drive_folder_id: String,
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,
    /// Written into the Playlist column of every tracked row.
    #[serde(default)]
    pub playlist_tag: String,
    /// Upload chunk size in bytes. Drive requires a multiple of 256 KiB.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Handed to yt-dlp as `--retries`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub keep_files: bool,
    #[serde(default = "default_true")]
    pub upload_to_drive: bool,
    /// Default tracing filter; `RUST_LOG` overrides it when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Defaults to `<data_folder>/credentials/google_creds.json`.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

impl VaultConfig {
    pub fn load() -> Result<Self, VaultError> {
        Config::builder()
            .add_source(Environment::default().prefix("TUBEVAULT").separator("__"))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| VaultError::Configuration(err.to_string()))
    }

    pub fn paths(&self) -> StoragePaths {
        StoragePaths::under(&self.data_folder)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_file
            .clone()
            .unwrap_or_else(|| self.paths().credentials.join("google_creds.json"))
    }
}

/// The on-disk layout: everything lives under the data folder.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub videos: PathBuf,
    pub temp: PathBuf,
    pub processed: PathBuf,
    pub credentials: PathBuf,
}

impl StoragePaths {
    pub fn under(data_folder: &Path) -> Self {
        let videos = data_folder.join("videos");

        Self {
            temp: videos.join("temp"),
            processed: videos.join("processed"),
            credentials: data_folder.join("credentials"),
            videos,
        }
    }

    pub fn ensure_all(&self) -> Result<(), VaultError> {
        for dir in [&self.videos, &self.temp, &self.processed, &self.credentials] {
            std::fs::create_dir_all(dir).map_err(|err| {
                VaultError::Configuration(format!("failed to create {}: {err}", dir.display()))
            })?;
        }

        Ok(())
    }
}

fn default_data_folder() -> PathBuf {
    PathBuf::from("storage")
}

fn default_chunk_size() -> usize {
    50 * 1024 * 1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

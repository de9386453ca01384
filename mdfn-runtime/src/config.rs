// Runtime settings persistence
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths::SlotPaths;
use crate::save_state::StateFileOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory for state and movie slots.
    pub data_dir: PathBuf,
    /// File base name for slot files, usually derived from the loaded game.
    pub base_name: String,
    pub compress_states: bool,
    pub compression_level: i32,
    pub rewind: RewindConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    pub enabled: bool,
    pub max_snapshots: usize,
    pub compression_level: i32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            base_name: "game".to_string(),
            compress_states: true,
            compression_level: 3,
            rewind: RewindConfig::default(),
        }
    }
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_snapshots: 600,
            compression_level: 1,
        }
    }
}

impl RuntimeConfig {
    fn default_data_dir() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("mdfn");
        path
    }

    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("mdfn");
        path.push("runtime.json");
        path
    }

    /// Load settings, falling back to defaults if the file is missing or
    /// unreadable.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::read(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn slot_paths(&self) -> SlotPaths {
        SlotPaths::new(&self.data_dir, &self.base_name)
    }

    pub fn state_file_options(&self) -> StateFileOptions {
        StateFileOptions {
            compression_level: self.compress_states.then_some(self.compression_level),
        }
    }
}

use crate::{
    emulator::{EmulatorId, EmulatorLayout},
    identity::SerialPattern,
    installer::Installer,
    packer::{Packer, DEFAULT_COMPRESSION_LEVEL},
    scanner::Scanner,
};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Host-owned settings. The core never reads this itself; the remembered
/// root and layout are passed into each operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub emulator: EmulatorId,
    #[serde(default)]
    pub emulator_root: Option<PathBuf>,
    #[serde(default)]
    pub layout: EmulatorLayout,
    #[serde(default)]
    pub serial_pattern: SerialPattern,
    #[serde(default = "default_compression_level")]
    pub compression_level: Option<i64>,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let emulator = EmulatorId::default();
        Self {
            emulator,
            emulator_root: None,
            layout: emulator.default_layout(),
            serial_pattern: SerialPattern::default(),
            compression_level: default_compression_level(),
            scratch_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        let path = default_config_path()?;
        Self::load_or_create_at(&path)
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path).context("read app config")?;
            let config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            return Ok(config);
        }

        let config = AppConfig::default();
        config.save_to(path)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create app config dir")?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }

    /// Explicit root, then the remembered one, then auto-detection.
    pub fn resolve_root(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.emulator_root.clone())
            .or_else(|| self.emulator.detect_root())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("savesmith"))
    }

    pub fn scanner(&self) -> Scanner {
        Scanner::new(self.layout.clone(), self.serial_pattern.clone())
    }

    pub fn packer(&self) -> Packer {
        Packer::new(self.scratch_dir()).with_compression_level(self.compression_level)
    }

    pub fn installer(&self) -> Installer {
        Installer::new(self.layout.clone(), self.scratch_dir())
    }
}

fn default_compression_level() -> Option<i64> {
    Some(DEFAULT_COMPRESSION_LEVEL)
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("savesmith"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(base_data_dir()?.join("config.json"))
}

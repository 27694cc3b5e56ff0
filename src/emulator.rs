use crate::{library::ArtifactType, rpcs3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmulatorId {
    Rpcs3,
}

impl Default for EmulatorId {
    fn default() -> Self {
        EmulatorId::Rpcs3
    }
}

impl EmulatorId {
    pub fn display_name(self) -> &'static str {
        match self {
            EmulatorId::Rpcs3 => rpcs3::EMULATOR_NAME,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmulatorId::Rpcs3 => "rpcs3",
        }
    }

    pub fn default_layout(self) -> EmulatorLayout {
        match self {
            EmulatorId::Rpcs3 => EmulatorLayout::rpcs3(),
        }
    }

    pub fn detect_root(self) -> Option<PathBuf> {
        match self {
            EmulatorId::Rpcs3 => rpcs3::detect_root(),
        }
    }

    pub fn looks_like_root(self, path: &Path) -> bool {
        match self {
            EmulatorId::Rpcs3 => rpcs3::looks_like_root(path),
        }
    }
}

/// Paths relative to an emulator root. Every field is a convention of the
/// emulator, so all of them can be overridden from config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorLayout {
    pub savedata_dir: PathBuf,
    pub savestates_dir: PathBuf,
    pub games_dir: PathBuf,
    /// Launch binary, relative to one installed game directory.
    pub launch_binary: PathBuf,
    /// Metadata file holding the display title, relative to one game directory.
    pub title_metadata: PathBuf,
    pub backups_dir: PathBuf,
}

impl Default for EmulatorLayout {
    fn default() -> Self {
        Self::rpcs3()
    }
}

impl EmulatorLayout {
    pub fn rpcs3() -> Self {
        Self {
            savedata_dir: PathBuf::from(rpcs3::SAVEDATA_DIR),
            savestates_dir: PathBuf::from(rpcs3::SAVESTATES_DIR),
            games_dir: PathBuf::from(rpcs3::GAMES_DIR),
            launch_binary: PathBuf::from(rpcs3::LAUNCH_BINARY),
            title_metadata: PathBuf::from(rpcs3::TITLE_METADATA),
            backups_dir: PathBuf::from(rpcs3::BACKUPS_DIR),
        }
    }

    pub fn category_dir(&self, root: &Path, artifact_type: ArtifactType) -> PathBuf {
        match artifact_type {
            ArtifactType::Save => root.join(&self.savedata_dir),
            ArtifactType::Savestate => root.join(&self.savestates_dir),
        }
    }

    pub fn games_root(&self, root: &Path) -> PathBuf {
        root.join(&self.games_dir)
    }

    pub fn backups_root(&self, root: &Path) -> PathBuf {
        root.join(&self.backups_dir)
    }
}

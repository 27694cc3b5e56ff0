use crate::error::NameError;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Save,
    Savestate,
}

impl ArtifactType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactType::Save => "save",
            ArtifactType::Savestate => "savestate",
        }
    }

    pub fn backs_up_on_install(self) -> bool {
        matches!(self, ArtifactType::Save)
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = NameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "save" => Ok(ArtifactType::Save),
            "savestate" => Ok(ArtifactType::Savestate),
            _ => Err(NameError::UnknownType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub absolute_path: PathBuf,
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub serial: String,
    pub display_name: String,
    pub launch_target: Option<PathBuf>,
    pub saves: Vec<Artifact>,
    pub savestates: Vec<Artifact>,
}

impl Title {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            display_name: serial.to_string(),
            launch_target: None,
            saves: Vec::new(),
            savestates: Vec::new(),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.launch_target.is_some()
    }

    pub fn artifacts(&self, artifact_type: ArtifactType) -> &[Artifact] {
        match artifact_type {
            ArtifactType::Save => &self.saves,
            ArtifactType::Savestate => &self.savestates,
        }
    }

    pub(crate) fn push_artifact(&mut self, artifact: Artifact) {
        match artifact.artifact_type {
            ArtifactType::Save => self.saves.push(artifact),
            ArtifactType::Savestate => self.savestates.push(artifact),
        }
    }
}

/// Result of one scan. A new scan produces a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub root: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub scanned_at: OffsetDateTime,
    pub titles: Vec<Title>,
    /// Entries skipped because their names carried no serial.
    #[serde(default)]
    pub skipped: Vec<PathBuf>,
}

impl Library {
    pub fn title(&self, serial: &str) -> Option<&Title> {
        self.titles.iter().find(|title| title.serial == serial)
    }

    pub fn artifact_count(&self) -> usize {
        self.titles
            .iter()
            .map(|title| title.saves.len() + title.savestates.len())
            .sum()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEntry {
    pub serial: String,
    pub display_name: String,
    pub path: PathBuf,
    pub launch_target: Option<PathBuf>,
}

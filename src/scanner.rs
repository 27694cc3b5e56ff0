use crate::{
    emulator::EmulatorLayout,
    error::ScanError,
    identity::{artifact_label, serial_from_artifact_name, SerialPattern},
    library::{Artifact, ArtifactKind, ArtifactType, GameEntry, Library, Title},
    sfo,
};
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};
use time::OffsetDateTime;

/// Prefix of scratch entries the packer and installer create inside
/// category folders; never reported as artifacts.
pub(crate) const STAGING_PREFIX: &str = ".savesmith-";

#[derive(Debug, Clone, Default)]
pub struct Scanner {
    pub layout: EmulatorLayout,
    pub pattern: SerialPattern,
}

struct Child {
    name: String,
    path: PathBuf,
    kind: ArtifactKind,
}

impl Scanner {
    pub fn new(layout: EmulatorLayout, pattern: SerialPattern) -> Self {
        Self { layout, pattern }
    }

    /// Builds the save-centric library for one emulator root.
    ///
    /// Titles appear in first-encountered order (save data, then
    /// savestates); artifacts keep the filesystem's enumeration order.
    pub fn scan(&self, root: &Path) -> Result<Library, ScanError> {
        ensure_root(root)?;

        let mut titles: Vec<Title> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut skipped = Vec::new();

        for artifact_type in [ArtifactType::Save, ArtifactType::Savestate] {
            let category = self.layout.category_dir(root, artifact_type);
            for child in list_children(&category)? {
                let serial = match serial_from_artifact_name(&self.pattern, &child.name) {
                    Ok(serial) => serial,
                    Err(err) => {
                        tracing::debug!(path = %child.path.display(), "skipping entry: {err}");
                        skipped.push(child.path);
                        continue;
                    }
                };
                let slot = *index.entry(serial.clone()).or_insert_with(|| {
                    titles.push(Title::new(&serial));
                    titles.len() - 1
                });
                titles[slot].push_artifact(Artifact {
                    label: artifact_label(&self.pattern, &child.name),
                    name: child.name,
                    artifact_type,
                    absolute_path: child.path,
                    kind: child.kind,
                });
            }
        }

        let games_root = self.layout.games_root(root);
        for child in list_children(&games_root)? {
            if child.kind != ArtifactKind::Directory {
                continue;
            }
            let Some(serial) = self.game_serial(&child.name) else {
                continue;
            };
            let Some(&slot) = index.get(&serial) else {
                continue;
            };
            let title = &mut titles[slot];
            let exact = child.name == serial;
            if title.launch_target.is_none() || exact {
                if let Some(target) = self.launch_target(&child.path) {
                    title.launch_target = Some(target);
                }
            }
            if title.display_name == title.serial || exact {
                if let Some(name) = self.display_name(&child.path) {
                    title.display_name = name;
                }
            }
        }

        let library = Library {
            root: root.to_path_buf(),
            scanned_at: OffsetDateTime::now_utc(),
            titles,
            skipped,
        };
        tracing::info!(
            root = %root.display(),
            titles = library.titles.len(),
            artifacts = library.artifact_count(),
            skipped = library.skipped.len(),
            "scanned library"
        );
        Ok(library)
    }

    /// Lists every installed game, whether or not it has save data.
    pub fn list_games(&self, root: &Path) -> Result<Vec<GameEntry>, ScanError> {
        ensure_root(root)?;

        let mut games = Vec::new();
        for child in list_children(&self.layout.games_root(root))? {
            if child.kind != ArtifactKind::Directory {
                continue;
            }
            let Some(serial) = self.game_serial(&child.name) else {
                continue;
            };
            games.push(GameEntry {
                display_name: self
                    .display_name(&child.path)
                    .unwrap_or_else(|| serial.clone()),
                launch_target: self.launch_target(&child.path),
                serial,
                path: child.path,
            });
        }
        tracing::info!(root = %root.display(), games = games.len(), "listed installed games");
        Ok(games)
    }

    /// Game folders are named by the bare serial, which a `Delimited`
    /// or `FixedLength` artifact pattern may not match.
    fn game_serial(&self, name: &str) -> Option<String> {
        if let Ok(serial) = serial_from_artifact_name(&self.pattern, name) {
            return Some(serial);
        }
        let bare = !name.is_empty() && name.chars().all(|ch| ch.is_ascii_alphanumeric());
        (bare && self.pattern != SerialPattern::TitleId).then(|| name.to_string())
    }

    fn launch_target(&self, game_dir: &Path) -> Option<PathBuf> {
        let path = game_dir.join(&self.layout.launch_binary);
        path.is_file().then_some(path)
    }

    fn display_name(&self, game_dir: &Path) -> Option<String> {
        sfo::read_title(&game_dir.join(&self.layout.title_metadata))
    }
}

fn ensure_root(root: &Path) -> Result<(), ScanError> {
    match fs::read_dir(root) {
        Ok(_) => Ok(()),
        Err(_) => Err(ScanError::RootNotFound(root.to_path_buf())),
    }
}

/// Immediate children of `dir`. A missing directory has no children.
fn list_children(dir: &Path) -> Result<Vec<Child>, ScanError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) if !dir.is_dir() && err.kind() != io::ErrorKind::PermissionDenied => {
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ScanError::Read {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut children = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ScanError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with(STAGING_PREFIX) {
            continue;
        }
        let path = entry.path();
        let kind = if path.is_dir() {
            ArtifactKind::Directory
        } else {
            ArtifactKind::File
        };
        children.push(Child { name, path, kind });
    }
    Ok(children)
}

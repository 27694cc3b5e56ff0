use crate::error::BackupError;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
};
use time::{macros::format_description, OffsetDateTime};
use walkdir::WalkDir;

const META_FILE: &str = "backup.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationMethod {
    Rename,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub method: RelocationMethod,
}

/// Append-only store of pre-overwrite copies, laid out as
/// `<root>/<artifact name>/<timestamp>/<artifact name>`.
#[derive(Debug, Clone)]
pub struct BackupVault {
    root: PathBuf,
}

impl BackupVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Moves `target` into a fresh lineage entry. Returns `None` when there
    /// is nothing at `target`.
    pub fn relocate(&self, target: &Path) -> Result<Option<BackupRecord>, BackupError> {
        match fs::symlink_metadata(target) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(BackupError::Io {
                    context: "inspect backup target",
                    path: target.to_path_buf(),
                    source,
                })
            }
        }
        let leaf = target
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| BackupError::InvalidTarget(target.to_path_buf()))?;

        let created_at = OffsetDateTime::now_utc();
        let entry_dir = self.claim_entry(leaf, created_at)?;
        let backup_path = entry_dir.join(leaf);

        let mut record = BackupRecord {
            original_path: target.to_path_buf(),
            backup_path,
            created_at,
            method: RelocationMethod::Rename,
        };
        match fs::rename(target, &record.backup_path) {
            Ok(()) => write_meta_or_warn(&entry_dir, &record),
            Err(err) => {
                tracing::debug!(
                    target = %target.display(),
                    "rename into backup failed ({err}), copying instead"
                );
                copy_verified(target, &entry_dir, leaf)?;
                record.method = RelocationMethod::Copy;
                finish_copy(&entry_dir, &record)?;
            }
        }
        tracing::info!(
            original = %record.original_path.display(),
            backup = %record.backup_path.display(),
            "backed up artifact"
        );
        Ok(Some(record))
    }

    /// Recorded backups of one artifact, oldest first.
    pub fn lineage(&self, name: &str) -> Result<Vec<BackupRecord>, BackupError> {
        let dir = self.root.join(name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(BackupError::Io {
                    context: "read backup lineage",
                    path: dir,
                    source,
                })
            }
        };

        let mut records: Vec<BackupRecord> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let raw = fs::read_to_string(entry.path().join(META_FILE)).ok()?;
                serde_json::from_str(&raw).ok()
            })
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.backup_path.cmp(&b.backup_path))
        });
        Ok(records)
    }

    /// Creates a lineage entry directory that no other backup owns.
    fn claim_entry(&self, leaf: &str, created_at: OffsetDateTime) -> Result<PathBuf, BackupError> {
        let lineage = self.root.join(leaf);
        fs::create_dir_all(&lineage).map_err(|source| BackupError::Io {
            context: "create backup lineage",
            path: lineage.clone(),
            source,
        })?;

        let stamp = lineage_stamp(created_at);
        let mut seq = 0u32;
        loop {
            let name = if seq == 0 {
                stamp.clone()
            } else {
                format!("{stamp}-{seq}")
            };
            let candidate = lineage.join(name);
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => seq += 1,
                Err(source) => {
                    return Err(BackupError::Io {
                        context: "create backup entry",
                        path: candidate,
                        source,
                    })
                }
            }
        }
    }
}

fn lineage_stamp(at: OffsetDateTime) -> String {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]-[minute]-[second]-[subsecond digits:6]Z"
    );
    at.format(&format)
        .unwrap_or_else(|_| at.unix_timestamp_nanos().to_string())
}

/// Cross-volume fallback, first half: copy into `<leaf>.partial`, verify,
/// then move to the final name. The source is not touched.
fn copy_verified(source: &Path, entry_dir: &Path, leaf: &str) -> Result<(), BackupError> {
    let partial = entry_dir.join(format!("{leaf}.partial"));
    let result = copy_tree(source, &partial).and_then(|()| verify_copy(source, &partial));
    if let Err(err) = result {
        let _ = remove_path(&partial);
        return Err(err);
    }

    let dest = entry_dir.join(leaf);
    fs::rename(&partial, &dest).map_err(|err| BackupError::Io {
        context: "finalize backup copy",
        path: dest.clone(),
        source: err,
    })
}

/// Records a verified copy, then removes the original. A failed removal
/// still hands back the record: the backup is complete at that point.
fn finish_copy(entry_dir: &Path, record: &BackupRecord) -> Result<(), BackupError> {
    write_meta_or_warn(entry_dir, record);
    remove_path(&record.original_path).map_err(|source| BackupError::SourceNotRemoved {
        record: Box::new(record.clone()),
        source,
    })
}

fn copy_tree(source: &Path, dest: &Path) -> Result<(), BackupError> {
    let io_err = |context: &'static str, path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| BackupError::Io {
            context,
            path,
            source,
        }
    };

    let root_type = fs::symlink_metadata(source)
        .map_err(io_err("inspect backup source", source))?
        .file_type();
    if root_type.is_symlink() {
        return copy_symlink(source, dest).map_err(io_err("copy symlink", source));
    }
    if root_type.is_file() {
        fs::copy(source, dest).map_err(io_err("copy file", source))?;
        preserve_mtime(source, dest);
        return Ok(());
    }

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|err| BackupError::Io {
            context: "walk backup source",
            path: source.to_path_buf(),
            source: err.into(),
        })?;
        let rel = entry.path().strip_prefix(source).unwrap_or(Path::new(""));
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_err("create dir", &target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err("create file dir", parent))?;
        }
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target).map_err(io_err("copy symlink", entry.path()))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(io_err("copy file", entry.path()))?;
            preserve_mtime(entry.path(), &target);
        } else {
            return Err(BackupError::Verify {
                path: entry.path().to_path_buf(),
                reason: "unsupported file type".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<()> {
    let link = fs::read_link(source)?;
    std::os::unix::fs::symlink(link, dest)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, _dest: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot copy symlink {}", source.display()),
    ))
}

#[derive(Debug, PartialEq, Eq)]
enum EntryDigest {
    File(blake3::Hash),
    Link(PathBuf),
}

fn verify_copy(source: &Path, copy: &Path) -> Result<(), BackupError> {
    let expected = digest_tree(source)?;
    let actual = digest_tree(copy)?;
    if expected.len() != actual.len() {
        return Err(BackupError::Verify {
            path: source.to_path_buf(),
            reason: format!("{} entries copied, {} expected", actual.len(), expected.len()),
        });
    }
    for (rel, digest) in &expected {
        if actual.get(rel) != Some(digest) {
            return Err(BackupError::Verify {
                path: source.to_path_buf(),
                reason: format!("content mismatch at {}", rel.display()),
            });
        }
    }
    Ok(())
}

fn digest_tree(root: &Path) -> Result<BTreeMap<PathBuf, EntryDigest>, BackupError> {
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(false).follow_root_links(false) {
        let entry = entry.map_err(|err| BackupError::Io {
            context: "walk for verification",
            path: root.to_path_buf(),
            source: err.into(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(Path::new(""))
            .to_path_buf();
        let digest = if entry.file_type().is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|source| BackupError::Io {
                context: "read link for verification",
                path: entry.path().to_path_buf(),
                source,
            })?;
            EntryDigest::Link(link)
        } else if entry.file_type().is_file() {
            let hash = hash_file(entry.path()).map_err(|source| BackupError::Io {
                context: "hash for verification",
                path: entry.path().to_path_buf(),
                source,
            })?;
            EntryDigest::File(hash)
        } else {
            continue;
        };
        out.insert(rel, digest);
    }
    Ok(out)
}

fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize())
}

fn preserve_mtime(source: &Path, dest: &Path) {
    let Ok(modified) = fs::metadata(source).and_then(|meta| meta.modified()) else {
        return;
    };
    let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(modified));
}

fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn write_meta_or_warn(entry_dir: &Path, record: &BackupRecord) {
    if let Err(err) = write_meta(entry_dir, record) {
        tracing::warn!(entry = %entry_dir.display(), "write backup metadata: {err}");
    }
}

fn write_meta(entry_dir: &Path, record: &BackupRecord) -> io::Result<()> {
    let raw = serde_json::to_string_pretty(record).map_err(io::Error::other)?;
    fs::write(entry_dir.join(META_FILE), raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_target_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = BackupVault::new(tmp.path().join("backups"));
        assert_eq!(vault.relocate(&tmp.path().join("gone")).unwrap(), None);
        assert!(!vault.root().exists());
    }

    #[test]
    fn relocate_moves_folder_into_lineage() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("savedata/BLES01234_save1");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.dat"), b"old").unwrap();

        let vault = BackupVault::new(tmp.path().join("backups"));
        let record = vault.relocate(&target).unwrap().unwrap();
        assert!(!target.exists());
        assert_eq!(record.method, RelocationMethod::Rename);
        assert_eq!(record.original_path, target);
        assert!(record
            .backup_path
            .starts_with(tmp.path().join("backups/BLES01234_save1")));
        assert!(record.backup_path.ends_with("BLES01234_save1"));
        assert_eq!(fs::read(record.backup_path.join("old.dat")).unwrap(), b"old");
    }

    #[test]
    fn same_instant_backups_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("state.sta");
        let vault = BackupVault::new(tmp.path().join("backups"));

        let mut paths = Vec::new();
        for round in 0..3u8 {
            fs::write(&target, [round]).unwrap();
            paths.push(vault.relocate(&target).unwrap().unwrap().backup_path);
        }
        paths.dedup();
        assert_eq!(paths.len(), 3);
        for (round, path) in paths.iter().enumerate() {
            assert_eq!(fs::read(path).unwrap(), vec![round as u8]);
        }

        let lineage = vault.lineage("state.sta").unwrap();
        assert_eq!(lineage.len(), 3);
        assert!(vault.lineage("other").unwrap().is_empty());
    }

    fn copy_record(source: &Path, entry: &Path, leaf: &str) -> BackupRecord {
        BackupRecord {
            original_path: source.to_path_buf(),
            backup_path: entry.join(leaf),
            created_at: OffsetDateTime::now_utc(),
            method: RelocationMethod::Copy,
        }
    }

    #[test]
    fn forced_copy_verifies_before_removing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("SAVE");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(source.join("nested/a.dat"), b"abc").unwrap();
        fs::write(source.join("b.dat"), b"def").unwrap();
        let entry = tmp.path().join("entry");
        fs::create_dir_all(&entry).unwrap();

        copy_verified(&source, &entry, "SAVE").unwrap();
        assert!(source.exists());
        finish_copy(&entry, &copy_record(&source, &entry, "SAVE")).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(entry.join("SAVE/nested/a.dat")).unwrap(), b"abc");
        assert!(!entry.join("SAVE.partial").exists());
        assert!(entry.join(META_FILE).is_file());
    }

    #[test]
    fn failed_copy_keeps_source() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("SAVE");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.dat"), b"abc").unwrap();

        let blocked_entry = tmp.path().join("not-a-dir");
        fs::write(&blocked_entry, b"file").unwrap();
        assert!(copy_verified(&source, &blocked_entry, "SAVE").is_err());
        assert_eq!(fs::read(source.join("a.dat")).unwrap(), b"abc");
    }

    #[test]
    fn failed_source_removal_still_reports_the_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("SAVE");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.dat"), b"abc").unwrap();
        let entry = tmp.path().join("entry");
        fs::create_dir_all(&entry).unwrap();
        copy_verified(&source, &entry, "SAVE").unwrap();

        // Removing the original fails once it has already vanished.
        fs::remove_dir_all(&source).unwrap();
        let record = copy_record(&source, &entry, "SAVE");
        let err = finish_copy(&entry, &record).unwrap_err();
        assert!(matches!(err, BackupError::SourceNotRemoved { .. }));
        assert_eq!(err.completed_record(), Some(&record));
        assert_eq!(fs::read(entry.join("SAVE/a.dat")).unwrap(), b"abc");

        let raw = fs::read_to_string(entry.join(META_FILE)).unwrap();
        let stored: BackupRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, record);
    }

    #[cfg(unix)]
    #[test]
    fn forced_copy_keeps_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("SAVE");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("real.dat"), b"abc").unwrap();
        std::os::unix::fs::symlink("real.dat", source.join("link.dat")).unwrap();
        let entry = tmp.path().join("entry");
        fs::create_dir_all(&entry).unwrap();

        copy_verified(&source, &entry, "SAVE").unwrap();
        let copied = entry.join("SAVE/link.dat");
        assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&copied).unwrap(), PathBuf::from("real.dat"));
    }

    #[cfg(unix)]
    #[test]
    fn verification_notices_a_missing_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("SAVE");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("real.dat"), b"abc").unwrap();
        std::os::unix::fs::symlink("real.dat", source.join("link.dat")).unwrap();
        let copy = tmp.path().join("COPY");
        fs::create_dir_all(&copy).unwrap();
        fs::write(copy.join("real.dat"), b"abc").unwrap();

        let err = verify_copy(&source, &copy).unwrap_err();
        assert!(matches!(err, BackupError::Verify { .. }));
    }
}

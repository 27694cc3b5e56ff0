use crate::{
    error::{PackError, UnpackError},
    identity::artifact_name_from_archive_top_entry,
    scanner::STAGING_PREFIX,
};
use filetime::{set_file_mtime, FileTime};
use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Component, Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time as TimeOfDay};
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

pub const DEFAULT_COMPRESSION_LEVEL: i64 = 9;

/// A packed artifact sitting in the scratch area. Dropping the value
/// leaves the file in place; call [`ArchiveBlob::dispose`] when done.
///
/// Packing the same name again replaces the file at `temp_path`, so an
/// older blob then reads the newer archive.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArchiveBlob {
    pub source_name: String,
    pub temp_path: PathBuf,
    pub byte_size: u64,
    #[serde(skip)]
    pub(crate) pack_id: String,
}

impl ArchiveBlob {
    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.temp_path)
    }

    /// Removes the archive unless a later pack has since replaced it.
    pub fn dispose(self) -> io::Result<()> {
        if !self.still_owns_file() {
            return Ok(());
        }
        match fs::remove_file(&self.temp_path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    fn still_owns_file(&self) -> bool {
        let Ok(file) = File::open(&self.temp_path) else {
            return false;
        };
        match ZipArchive::new(file) {
            Ok(archive) => archive.comment() == self.pack_id.as_bytes(),
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Packer {
    scratch_dir: PathBuf,
    compression_level: Option<i64>,
}

impl Packer {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            compression_level: Some(DEFAULT_COMPRESSION_LEVEL),
        }
    }

    pub fn with_compression_level(mut self, level: Option<i64>) -> Self {
        self.compression_level = level;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Packs a folder or file into `<scratch>/<name>.zip` whose only
    /// top-level entry is `name`. A previous archive of the same name is
    /// replaced once the new one is complete.
    pub fn pack(&self, source: &Path) -> Result<ArchiveBlob, PackError> {
        let meta = fs::metadata(source)
            .map_err(|_| PackError::SourceNotFound(source.to_path_buf()))?;
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PackError::InvalidSource(source.to_path_buf()))?
            .to_string();

        fs::create_dir_all(&self.scratch_dir).map_err(|source| PackError::Io {
            context: "create scratch dir",
            source,
        })?;
        let final_path = self.scratch_dir.join(format!("{name}.zip"));
        let partial_path = self
            .scratch_dir
            .join(format!("{STAGING_PREFIX}{name}.{}.partial", scratch_nonce()));
        let mut guard = ScratchGuard::new(partial_path.clone());

        let file = File::create(&partial_path).map_err(|source| PackError::Io {
            context: "create archive",
            source,
        })?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.compression_level);

        if meta.is_dir() {
            for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
                let entry = entry.map_err(|source_err| PackError::Walk {
                    path: source.to_path_buf(),
                    source: source_err,
                })?;
                let rel = entry.path().strip_prefix(source).unwrap_or(Path::new(""));
                let entry_name = archive_entry_name(&name, rel);
                let file_type = entry.file_type();
                if file_type.is_dir() {
                    writer.add_directory(entry_name, with_mtime(options, entry.path()))?;
                } else if file_type.is_symlink() {
                    let link = fs::read_link(entry.path()).map_err(|source| PackError::Io {
                        context: "read symlink",
                        source,
                    })?;
                    writer.add_symlink(entry_name, link.to_string_lossy(), options)?;
                } else if file_type.is_file() {
                    add_file(&mut writer, &entry_name, entry.path(), options)?;
                } else {
                    return Err(PackError::Unsupported(entry.path().to_path_buf()));
                }
            }
        } else {
            add_file(&mut writer, &name, source, options)?;
        }
        let pack_id = scratch_nonce();
        writer.set_comment(pack_id.clone());
        writer.finish()?;

        fs::rename(&partial_path, &final_path).map_err(|source| PackError::Io {
            context: "finalize archive",
            source,
        })?;
        guard.disarm();

        let byte_size = fs::metadata(&final_path)
            .map_err(|source| PackError::Io {
                context: "stat archive",
                source,
            })?
            .len();
        tracing::info!(
            source = %source.display(),
            archive = %final_path.display(),
            bytes = byte_size,
            "packed artifact"
        );
        Ok(ArchiveBlob {
            source_name: name,
            temp_path: final_path,
            byte_size,
            pack_id,
        })
    }
}

fn archive_entry_name(top: &str, rel: &Path) -> String {
    let mut out = top.to_string();
    for part in rel.components() {
        if let Component::Normal(part) = part {
            out.push('/');
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

fn add_file(
    writer: &mut ZipWriter<File>,
    entry_name: &str,
    path: &Path,
    options: SimpleFileOptions,
) -> Result<(), PackError> {
    let mut input = File::open(path).map_err(|source| PackError::Io {
        context: "open source file",
        source,
    })?;
    let large = input
        .metadata()
        .map(|meta| meta.len() >= u64::from(u32::MAX))
        .unwrap_or(false);
    writer.start_file(entry_name, with_mtime(options, path).large_file(large))?;
    io::copy(&mut input, writer).map_err(|source| PackError::Io {
        context: "write archive entry",
        source,
    })?;
    Ok(())
}

fn with_mtime(options: SimpleFileOptions, path: &Path) -> SimpleFileOptions {
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match modified.and_then(|time| zip::DateTime::try_from(OffsetDateTime::from(time)).ok()) {
        Some(stamp) => options.last_modified_time(stamp),
        None => options,
    }
}

pub fn inspect(archive_path: &Path) -> Result<String, UnpackError> {
    let archive = open_archive(archive_path)?;
    top_entry(&archive)
}

/// Extracts an archive into `destination`, replacing whatever already
/// sits at `destination/<top entry>`. Siblings are left alone.
///
/// Entries are first written to a staging folder inside `destination`
/// and moved into place only after every entry extracted cleanly.
pub fn unpack(archive_path: &Path, destination: &Path) -> Result<Extracted, UnpackError> {
    let mut archive = open_archive(archive_path)?;
    let top = top_entry(&archive)?;

    fs::create_dir_all(destination).map_err(|source| UnpackError::Extract {
        context: "create destination",
        source,
    })?;
    let stage = destination.join(format!("{STAGING_PREFIX}unpack-{}", scratch_nonce()));
    fs::create_dir(&stage).map_err(|source| UnpackError::Extract {
        context: "create staging dir",
        source,
    })?;
    let _guard = ScratchGuard::new(stage.clone());

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|err| UnpackError::CorruptArchive(err.to_string()))?;
        let Some(rel) = file.enclosed_name() else {
            return Err(UnpackError::CorruptArchive(format!(
                "unsafe entry path: {}",
                file.name()
            )));
        };
        let out_path = stage.join(&rel);
        if is_symlink_entry(&file) {
            let mut link = String::new();
            file.read_to_string(&mut link)
                .map_err(|err| UnpackError::CorruptArchive(err.to_string()))?;
            if !link_stays_inside(&rel, &link) {
                return Err(UnpackError::CorruptArchive(format!(
                    "symlink {} escapes the archive: {link}",
                    file.name()
                )));
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|source| UnpackError::Extract {
                    context: "create archive dir",
                    source,
                })?;
            }
            make_symlink(&link, &out_path).map_err(|source| UnpackError::Extract {
                context: "create symlink",
                source,
            })?;
            continue;
        }
        if file.is_dir() {
            fs::create_dir_all(&out_path).map_err(|source| UnpackError::Extract {
                context: "create archive dir",
                source,
            })?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|source| UnpackError::Extract {
                context: "create archive dir",
                source,
            })?;
        }
        let mut out_file = File::create(&out_path).map_err(|source| UnpackError::Extract {
            context: "write archive entry",
            source,
        })?;
        io::copy(&mut file, &mut out_file).map_err(|source| UnpackError::Extract {
            context: "extract archive entry",
            source,
        })?;
        drop(out_file);
        if let Some(mtime) = file.last_modified().and_then(zip_time_to_unix) {
            let _ = set_file_mtime(&out_path, FileTime::from_unix_time(mtime, 0));
        }
    }

    let staged = stage.join(&top);
    let target = destination.join(&top);
    remove_existing(&target).map_err(|source| UnpackError::Extract {
        context: "replace existing target",
        source,
    })?;
    fs::rename(&staged, &target).map_err(|source| UnpackError::Extract {
        context: "move extracted entry into place",
        source,
    })?;

    tracing::debug!(archive = %archive_path.display(), target = %target.display(), "unpacked archive");
    Ok(Extracted {
        name: top,
        path: target,
    })
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, UnpackError> {
    let file = File::open(path).map_err(|source| UnpackError::Extract {
        context: "open archive",
        source,
    })?;
    ZipArchive::new(file).map_err(|err| UnpackError::CorruptArchive(err.to_string()))
}

fn top_entry(archive: &ZipArchive<File>) -> Result<String, UnpackError> {
    let top = artifact_name_from_archive_top_entry(archive.file_names())?;
    if top == ".." || top.contains(':') {
        return Err(UnpackError::CorruptArchive(format!(
            "unsafe top-level entry: {top}"
        )));
    }
    Ok(top)
}

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

fn is_symlink_entry(file: &zip::read::ZipFile<'_>) -> bool {
    file.unix_mode()
        .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
}

/// Whether `link`, resolved from the directory holding `entry`, stays
/// within the entry's top-level folder.
fn link_stays_inside(entry: &Path, link: &str) -> bool {
    let mut resolved: Vec<Component<'_>> = entry.components().collect();
    let Some(top) = resolved.first().copied() else {
        return false;
    };
    resolved.pop();
    for part in Path::new(link).components() {
        match part {
            Component::Normal(_) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
        if resolved.first() != Some(&top) {
            return false;
        }
    }
    !resolved.is_empty()
}

#[cfg(unix)]
fn make_symlink(link: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, path)
}

#[cfg(not(unix))]
fn make_symlink(link: &str, path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot create symlink {} -> {link}", path.display()),
    ))
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    let datetime = PrimitiveDateTime::new(date, time).assume_utc();
    Some(datetime.unix_timestamp())
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique per call within this machine: nanos, pid and a process counter.
pub(crate) fn scratch_nonce() -> String {
    let counter = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{nanos}-{}-{counter}", std::process::id())
}

pub(crate) struct ScratchGuard {
    path: PathBuf,
    armed: bool,
}

impl ScratchGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = remove_existing(&self.path);
        }
    }
}

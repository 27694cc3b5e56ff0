use crate::backup::BackupRecord;
use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Machine-readable failure kinds shared by every core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RootNotFound,
    RootInvalid,
    UnrecognizedName,
    UnknownType,
    SourceNotFound,
    PackFailed,
    EmptyArchive,
    AmbiguousArchive,
    CorruptArchive,
    BackupFailed,
    ExtractFailed,
    DownloadFailed,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RootNotFound => "root_not_found",
            ErrorKind::RootInvalid => "root_invalid",
            ErrorKind::UnrecognizedName => "unrecognized_name",
            ErrorKind::UnknownType => "unknown_type",
            ErrorKind::SourceNotFound => "source_not_found",
            ErrorKind::PackFailed => "pack_failed",
            ErrorKind::EmptyArchive => "empty_archive",
            ErrorKind::AmbiguousArchive => "ambiguous_archive",
            ErrorKind::CorruptArchive => "corrupt_archive",
            ErrorKind::BackupFailed => "backup_failed",
            ErrorKind::ExtractFailed => "extract_failed",
            ErrorKind::DownloadFailed => "download_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("unrecognized artifact name: {0}")]
    UnrecognizedName(String),
    #[error("archive has no entries")]
    EmptyArchive,
    #[error("archive has more than one top-level entry: {}", .0.join(", "))]
    AmbiguousArchive(Vec<String>),
    #[error("unknown artifact type: {0}")]
    UnknownType(String),
}

impl NameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NameError::UnrecognizedName(_) => ErrorKind::UnrecognizedName,
            NameError::EmptyArchive => ErrorKind::EmptyArchive,
            NameError::AmbiguousArchive(_) => ErrorKind::AmbiguousArchive,
            NameError::UnknownType(_) => ErrorKind::UnknownType,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("emulator root not found: {}", .0.display())]
    RootNotFound(PathBuf),
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::RootNotFound(_) => ErrorKind::RootNotFound,
            ScanError::Read { .. } => ErrorKind::RootInvalid,
        }
    }
}

#[derive(Debug, Error)]
pub enum PackError {
    #[error("pack source not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("pack source has no usable file name: {}", .0.display())]
    InvalidSource(PathBuf),
    #[error("cannot pack special file: {}", .0.display())]
    Unsupported(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::SourceNotFound(_) | PackError::InvalidSource(_) => {
                ErrorKind::SourceNotFound
            }
            PackError::Unsupported(_)
            | PackError::Io { .. }
            | PackError::Zip(_)
            | PackError::Walk { .. } => ErrorKind::PackFailed,
        }
    }
}

#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    #[error(transparent)]
    Name(#[from] NameError),
    #[error("{context}: {source}")]
    Extract {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl UnpackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnpackError::CorruptArchive(_) => ErrorKind::CorruptArchive,
            UnpackError::Name(err) => err.kind(),
            UnpackError::Extract { .. } => ErrorKind::ExtractFailed,
        }
    }
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup target has no file name: {}", .0.display())]
    InvalidTarget(PathBuf),
    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("backup copy of {} did not verify: {reason}", .path.display())]
    Verify { path: PathBuf, reason: String },
    #[error(
        "backed up to {} but could not remove {}: {source}",
        .record.backup_path.display(),
        .record.original_path.display()
    )]
    SourceNotRemoved {
        record: Box<BackupRecord>,
        #[source]
        source: io::Error,
    },
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BackupFailed
    }

    /// The backup that was completed before this error, if any.
    pub fn completed_record(&self) -> Option<&BackupRecord> {
        match self {
            BackupError::SourceNotRemoved { record, .. } => Some(record.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("download {url}: {message}")]
    Transport { url: String, message: String },
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DownloadFailed
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("emulator root is missing or not a directory: {}", .0.display())]
    RootInvalid(PathBuf),
    #[error("stage archive: {0}")]
    Stage(#[source] io::Error),
    #[error(transparent)]
    Unpack(#[from] UnpackError),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::RootInvalid(_) => ErrorKind::RootInvalid,
            InstallError::Stage(_) => ErrorKind::ExtractFailed,
            InstallError::Unpack(err) => err.kind(),
            InstallError::Backup(err) => err.kind(),
            InstallError::Download(err) => err.kind(),
        }
    }
}

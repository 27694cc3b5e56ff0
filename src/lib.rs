//! Save data and savestate sync engine for emulator installations.
//!
//! [`scanner::Scanner`] turns an emulator root into a [`library::Library`],
//! [`packer::Packer`] turns one artifact into an upload-ready zip, and
//! [`installer::Installer`] puts a downloaded zip back in place, moving
//! existing saves into a [`backup::BackupVault`] lineage first.

pub mod backup;
pub mod config;
pub mod emulator;
pub mod error;
pub mod identity;
pub mod installer;
pub mod library;
pub mod logging;
pub mod packer;
pub mod remote;
pub mod rpcs3;
pub mod scanner;
pub mod sfo;

pub use backup::{BackupRecord, BackupVault};
pub use emulator::{EmulatorId, EmulatorLayout};
pub use error::ErrorKind;
pub use identity::SerialPattern;
pub use installer::{InstallOutcome, InstallRequest, Installer};
pub use library::{Artifact, ArtifactKind, ArtifactType, Library, Title};
pub use packer::{ArchiveBlob, Packer};
pub use scanner::Scanner;

use config::AppConfig;
use std::path::Path;

pub fn scan_library(config: &AppConfig, root: &Path) -> Result<Library, error::ScanError> {
    config.scanner().scan(root)
}

pub fn pack_artifact(config: &AppConfig, path: &Path) -> Result<ArchiveBlob, error::PackError> {
    config.packer().pack(path)
}

pub fn install_archive(
    config: &AppConfig,
    root: &Path,
    artifact_type: ArtifactType,
    archive_bytes: &[u8],
) -> InstallOutcome {
    config.installer().install(&InstallRequest {
        root,
        artifact_type,
        archive_bytes,
    })
}

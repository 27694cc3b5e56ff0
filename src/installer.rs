use crate::{
    backup::{BackupRecord, BackupVault},
    emulator::EmulatorLayout,
    error::{ErrorKind, InstallError},
    library::ArtifactType,
    packer::{self, scratch_nonce, ScratchGuard},
    remote::Downloader,
    scanner::STAGING_PREFIX,
};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStep {
    ResolveDestinationRoot,
    StageArchive,
    InspectArchive,
    BackupPolicy,
    Extract,
    Report,
}

impl InstallStep {
    pub const COUNT: usize = 6;

    fn index(self) -> usize {
        match self {
            InstallStep::ResolveDestinationRoot => 0,
            InstallStep::StageArchive => 1,
            InstallStep::InspectArchive => 2,
            InstallStep::BackupPolicy => 3,
            InstallStep::Extract => 4,
            InstallStep::Report => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InstallStep::ResolveDestinationRoot => "Resolving destination",
            InstallStep::StageArchive => "Staging archive",
            InstallStep::InspectArchive => "Inspecting archive",
            InstallStep::BackupPolicy => "Backing up existing data",
            InstallStep::Extract => "Extracting",
            InstallStep::Report => "Finishing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallProgress {
    pub step: InstallStep,
    pub step_index: usize,
    pub step_count: usize,
    pub overall_progress: f32,
}

pub type ProgressCallback = Arc<dyn Fn(InstallProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    pub root: &'a Path,
    pub artifact_type: ArtifactType,
    pub archive_bytes: &'a [u8],
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub ok: bool,
    pub installed_path: Option<PathBuf>,
    pub backup_record: Option<BackupRecord>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl InstallOutcome {
    fn success(installed_path: PathBuf, backup_record: Option<BackupRecord>) -> Self {
        Self {
            ok: true,
            installed_path: Some(installed_path),
            backup_record,
            error_kind: None,
            error: None,
        }
    }

    fn failure(err: &InstallError, backup_record: Option<BackupRecord>) -> Self {
        Self {
            ok: false,
            installed_path: None,
            backup_record,
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
        }
    }
}

/// Places downloaded archives into an emulator root. Holds no state
/// between calls; installs of different artifacts may run in parallel.
#[derive(Clone)]
pub struct Installer {
    layout: EmulatorLayout,
    scratch_dir: PathBuf,
    progress: Option<ProgressCallback>,
}

impl Installer {
    pub fn new(layout: EmulatorLayout, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            scratch_dir: scratch_dir.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn install(&self, request: &InstallRequest<'_>) -> InstallOutcome {
        let mut backup = None;
        let outcome = match self.run(request, &mut backup) {
            Ok(installed) => {
                tracing::info!(
                    artifact_type = %request.artifact_type,
                    installed = %installed.display(),
                    backed_up = backup.is_some(),
                    "installed archive"
                );
                InstallOutcome::success(installed, backup)
            }
            Err(err) => {
                tracing::warn!(
                    artifact_type = %request.artifact_type,
                    kind = %err.kind(),
                    backed_up = backup.is_some(),
                    "install failed: {err}"
                );
                InstallOutcome::failure(&err, backup)
            }
        };
        self.report(InstallStep::Report);
        outcome
    }

    /// Fetches the archive through `downloader`, then installs it. A failed
    /// download touches nothing on disk.
    pub fn install_from_url(
        &self,
        downloader: &dyn Downloader,
        root: &Path,
        artifact_type: ArtifactType,
        url: &str,
    ) -> InstallOutcome {
        match downloader.fetch(url) {
            Ok(bytes) => self.install(&InstallRequest {
                root,
                artifact_type,
                archive_bytes: &bytes,
            }),
            Err(err) => {
                let err = InstallError::from(err);
                tracing::warn!(url, "download failed: {err}");
                InstallOutcome::failure(&err, None)
            }
        }
    }

    fn run(
        &self,
        request: &InstallRequest<'_>,
        backup: &mut Option<BackupRecord>,
    ) -> Result<PathBuf, InstallError> {
        self.report(InstallStep::ResolveDestinationRoot);
        if !request.root.is_dir() {
            return Err(InstallError::RootInvalid(request.root.to_path_buf()));
        }
        let destination = self.layout.category_dir(request.root, request.artifact_type);

        self.report(InstallStep::StageArchive);
        fs::create_dir_all(&self.scratch_dir).map_err(InstallError::Stage)?;
        let staged = self
            .scratch_dir
            .join(format!("{STAGING_PREFIX}download-{}.zip", scratch_nonce()));
        let _guard = ScratchGuard::new(staged.clone());
        fs::write(&staged, request.archive_bytes).map_err(InstallError::Stage)?;

        self.report(InstallStep::InspectArchive);
        let top = packer::inspect(&staged)?;
        let target = destination.join(&top);

        self.report(InstallStep::BackupPolicy);
        if request.artifact_type.backs_up_on_install() {
            let vault = BackupVault::new(self.layout.backups_root(request.root));
            match vault.relocate(&target) {
                Ok(record) => *backup = record,
                Err(err) => {
                    *backup = err.completed_record().cloned();
                    return Err(err.into());
                }
            }
        }

        self.report(InstallStep::Extract);
        let extracted = packer::unpack(&staged, &destination)?;
        Ok(extracted.path)
    }

    fn report(&self, step: InstallStep) {
        tracing::debug!(step = step.label(), "install step");
        let Some(callback) = &self.progress else {
            return;
        };
        let step_index = step.index();
        callback(InstallProgress {
            step,
            step_index: step_index + 1,
            step_count: InstallStep::COUNT,
            overall_progress: (step_index as f32) / ((InstallStep::COUNT - 1) as f32),
        });
    }
}

use crate::{
    error::DownloadError,
    identity::object_key,
    library::{ArtifactType, Title},
    packer::ArchiveBlob,
};
use serde::{Deserialize, Serialize};
use std::{io::Read, time::Duration};
use time::OffsetDateTime;

const USER_AGENT: &str = concat!("SaveSmith/", env!("CARGO_PKG_VERSION"));

/// Fetches archive bytes for the installer. Retries and redirects are the
/// implementation's business.
pub trait Downloader {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

pub struct UreqDownloader {
    agent: ureq::Agent,
}

impl Default for UreqDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqDownloader {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(60))
            .timeout_write(Duration::from_secs(60))
            .build();
        Self { agent }
    }
}

impl Downloader for UreqDownloader {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(status, _) => DownloadError::Status {
                    url: url.to_string(),
                    status,
                },
                ureq::Error::Transport(transport) => DownloadError::Transport {
                    url: url.to_string(),
                    message: transport.to_string(),
                },
            })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|err| DownloadError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        tracing::debug!(url, bytes = bytes.len(), "downloaded archive");
        Ok(bytes)
    }
}

/// Catalog entry a host stores next to an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub serial: String,
    pub title: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub original_name: String,
    pub object_path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl RemoteRecord {
    pub fn for_blob(
        emulator: &str,
        title: &Title,
        artifact_type: ArtifactType,
        blob: &ArchiveBlob,
        created_at: OffsetDateTime,
    ) -> Self {
        let millis = (created_at.unix_timestamp_nanos() / 1_000_000) as i64;
        Self {
            serial: title.serial.clone(),
            title: title.display_name.clone(),
            artifact_type,
            original_name: blob.source_name.clone(),
            object_path: object_key(emulator, &title.serial, artifact_type, &blob.source_name, millis),
            created_at,
        }
    }
}

use std::path::PathBuf;
use shared::protocol::PXE_FILENAME_PREFIX;
use shared::types::MacAddress;
use crate::error::{BtyError, Result};
use crate::store::file::write_atomic;

/// File name the boot loader requests for `hwa`, e.g. `01-aa-bb-cc-11-22-33`
pub fn artifact_name(hwa: MacAddress) -> String {
    format!(
        "{}{}",
        PXE_FILENAME_PREFIX,
        hwa.to_string().to_lowercase().replace(':', "-")
    )
}

/// Installs rendered PXE configs into the boot loader's config directory.
/// The last install for a host wins.
#[derive(Debug, Clone)]
pub struct BootArtifactInstaller {
    cfg_dir: PathBuf,
}

impl BootArtifactInstaller {
    pub fn new(cfg_dir: impl Into<PathBuf>) -> Self {
        Self { cfg_dir: cfg_dir.into() }
    }

    pub fn artifact_path(&self, hwa: MacAddress) -> PathBuf {
        self.cfg_dir.join(artifact_name(hwa))
    }

    /// Atomically replace the PXE config for `hwa`. Returns the installed path.
    pub async fn install(&self, hwa: MacAddress, rendered: String) -> Result<PathBuf> {
        let path = self.artifact_path(hwa);
        let target = path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&target, rendered.as_bytes()))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|res| res)
            .map_err(BtyError::ArtifactWrite)?;

        tracing::info!("Installed PXE config {}", path.display());
        Ok(path)
    }
}

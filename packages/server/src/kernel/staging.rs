//! Local staging of submission payloads.
//!
//! Intake writes `<id>.<ext>` here so dispatch can read the payload without
//! pulling the code column back out of the store.

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::common::SubmissionId;
use crate::kernel::BaseArtifactStaging;

/// Filesystem-backed artifact staging.
pub struct FsArtifactStaging {
    dir: PathBuf,
    extension: String,
}

impl FsArtifactStaging {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    fn path_for(&self, id: SubmissionId) -> PathBuf {
        self.dir.join(self.artifact_name(id))
    }
}

#[async_trait]
impl BaseArtifactStaging for FsArtifactStaging {
    fn artifact_name(&self, id: SubmissionId) -> String {
        format!("{}.{}", id, self.extension)
    }

    async fn write(&self, id: SubmissionId, content: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create staging dir {}", self.dir.display()))?;

        // Write-then-rename so readers never observe a partial artifact
        let path = self.path_for(id);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", self.artifact_name(id), Uuid::new_v4().simple()));
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("failed to move artifact to {}", path.display()));
        }

        Ok(())
    }

    async fn read(&self, id: SubmissionId) -> Result<Option<String>> {
        let path = self.path_for(id);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }
}

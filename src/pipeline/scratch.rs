//! Per-run scratch directory for rendered page images.
//!
//! [`ScratchDir`] owns the directory for the whole document run. Dropping it
//! removes the directory and everything in it, so an early return with `?`
//! anywhere in the run still cleans up. If setup fails before the directory
//! is created there is no guard and nothing to remove.

use crate::error::AnnotateError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Scoped scratch directory, removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/<stem>_XXXXXX`. `root` defaults to the system temp dir
    /// and is created if missing.
    pub fn create(root: Option<&Path>, stem: &str) -> Result<Self, AnnotateError> {
        let root = root
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);

        std::fs::create_dir_all(&root).map_err(|source| AnnotateError::ScratchDirFailed {
            root: root.clone(),
            source,
        })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}_", sanitise_stem(stem)))
            .tempdir_in(&root)
            .map_err(|source| AnnotateError::ScratchDirFailed {
                root: root.clone(),
                source,
            })?;

        let path = dir.path().to_path_buf();
        debug!("Created scratch directory {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, logging the result.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => info!("Scratch directory {} cleaned up", self.path.display()),
                Err(e) => warn!(
                    "Could not remove scratch directory {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.release();
    }
}

/// Keep file-name-safe characters of the document stem.
fn sanitise_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    if cleaned.is_empty() {
        "deck".into()
    } else {
        cleaned
    }
}

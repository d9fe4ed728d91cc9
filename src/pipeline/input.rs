//! Input validation: make sure the deck exists, is readable and is a PDF
//! before any scratch space is created or any model is called.

use crate::error::AnnotateError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path: it must exist, be readable, and start with the
/// `%PDF` magic bytes.
pub fn resolve_local(path: &Path) -> Result<PathBuf, AnnotateError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(AnnotateError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(AnnotateError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AnnotateError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(AnnotateError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// File stem of the input, used to name the scratch directory.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deck".to_string())
}

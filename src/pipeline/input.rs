//! Input validation: make sure the deck is a readable PDF before any stage runs.
//!
//! Checking the `%PDF` magic up front turns "this is a PowerPoint file" into a
//! clear input error instead of a parser failure halfway through page
//! selection, and it happens before any directory is created.

use crate::error::DeckError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated local PDF and the base name used to key its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckInput {
    pub path: PathBuf,
    pub base_name: String,
}

/// Validate `path` and derive its base name.
pub fn resolve_input(path: impl AsRef<Path>) -> Result<DeckInput, DeckError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(DeckError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(DeckError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DeckError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(DeckError::FileNotFound { path });
        }
    }

    let base_name = base_name(&path).ok_or_else(|| DeckError::FileNotFound {
        path: path.clone(),
    })?;

    debug!("Resolved local PDF: {} (key '{}')", path.display(), base_name);
    Ok(DeckInput { path, base_name })
}

/// File name without directory or extension.
pub fn base_name(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
}

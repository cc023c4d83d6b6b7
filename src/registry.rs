//! Ownership of log directories across sinks.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// Directories already bound to a sink.
///
/// Two sinks in one process must never write into the same directory. Pass the same
/// registry to every sink that should be checked against the others.
#[derive(Debug, Default)]
pub struct DirectoryRegistry {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl DirectoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `dir` to the caller. Fails with [`Error::Config`] if it is already bound.
    pub fn claim(&self, dir: &Path) -> Result<PathBuf> {
        let normalized = normalize_dir(dir)?;
        let mut claimed = self.claimed.lock();
        if !claimed.insert(normalized.clone()) {
            return Err(Error::Config(format!(
                "log directory {} is already used by another sink",
                normalized.display()
            )));
        }
        Ok(normalized)
    }

    pub fn contains(&self, dir: &Path) -> bool {
        normalize_dir(dir).is_ok_and(|dir| self.claimed.lock().contains(&dir))
    }

    /// Undo a claim whose sink never finished initializing.
    pub(crate) fn release(&self, normalized: &Path) {
        self.claimed.lock().remove(normalized);
    }
}

/// Absolute, lexically normalized form of `dir`. The directory need not exist.
pub fn normalize_dir(dir: &Path) -> Result<PathBuf> {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Temp paths of requests currently in flight.
///
/// Only used to detect key collisions and to report what is outstanding;
/// request data itself is never shared through it.
#[derive(Debug, Default)]
pub struct TempRegistry {
    paths: Mutex<HashSet<PathBuf>>,
}

impl TempRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the path is already registered.
    pub fn insert(&self, path: &Path) -> bool {
        self.lock().insert(path.to_path_buf())
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.lock().remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        // The set stays consistent even if a holder panicked.
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

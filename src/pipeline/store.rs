//! Local storage fallback for encoded cards.

use crate::clock::Clock;
use crate::error::StoreError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Writes encoded requests verbatim, one file per card named by UTC second.
#[derive(Clone)]
pub struct LocalStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a card stored now, e.g. `2009-03-01-14-05-09.txt`.
    pub fn file_name(&self) -> String {
        self.clock.now().format("%Y-%m-%d-%H-%M-%S.txt").to_string()
    }

    /// Write `request` and return the path written.
    pub fn store(&self, request: &[u8]) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(self.file_name());
        std::fs::write(&path, request).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), bytes = request.len(), "Card stored");
        Ok(path)
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").field("dir", &self.dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn writes_request_under_utc_timestamp_name() {
        let dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2009, 3, 1, 14, 5, 9).unwrap();
        let store = LocalStore::new(dir.path().join("uploads"), Arc::new(FixedClock::new(at)));

        let path = store.store(b"POST / HTTP/1.1\r\n\r\nbody").unwrap();
        assert_eq!(path.file_name().unwrap(), "2009-03-01-14-05-09.txt");
        assert_eq!(std::fs::read(&path).unwrap(), b"POST / HTTP/1.1\r\n\r\nbody");
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = LocalStore::new(blocker.join("uploads"), Arc::new(FixedClock::new(Utc::now())));
        assert!(matches!(
            store.store(b"data"),
            Err(StoreError::CreateDir { .. })
        ));
    }
}

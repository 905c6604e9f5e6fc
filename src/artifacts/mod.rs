//! Artifact lifecycle management
//!
//! Every upload gets a fresh temp path (random token + original extension)
//! registered in a shared [`TempRegistry`]. The resulting [`InFlightRequest`]
//! is owned by the handling request and walks the [`RequestState`] machine.
//! Dropping it is the guaranteed cleanup step: the registry entry is removed
//! and a [`CleanupJob`] for the temp file, any encoded output and the
//! optional archive actions is scheduled.

pub mod archive;
pub mod cleanup;
pub mod registry;
pub mod state;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ArchiveConfig;

pub use cleanup::{CleanupJob, CleanupScheduler};
pub use registry::TempRegistry;
pub use state::RequestState;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Temp path {} is already in flight, random naming or a previous cleanup is broken", .0.display())]
    Collision(PathBuf),

    #[error("Invalid request state transition {from} -> {to}")]
    InvalidTransition { from: RequestState, to: RequestState },

    #[error("Failed to prepare temp directory {}: {source}", path.display())]
    TempDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Shared per-process artifact bookkeeping
#[derive(Debug)]
pub struct ArtifactManager {
    temp_dir: PathBuf,
    registry: TempRegistry,
    scheduler: CleanupScheduler,
    archive: ArchiveConfig,
}

impl ArtifactManager {
    pub fn new(temp_dir: PathBuf, archive: ArchiveConfig, scheduler: CleanupScheduler) -> Self {
        Self {
            temp_dir,
            registry: TempRegistry::new(),
            scheduler,
            archive,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn registry(&self) -> &TempRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &CleanupScheduler {
        &self.scheduler
    }

    /// Creates the temp directory and deletes files left by a previous run.
    /// Returns how many files were removed.
    pub async fn prepare(&self) -> Result<usize, ArtifactError> {
        let to_err = |source: io::Error| ArtifactError::TempDir {
            path: self.temp_dir.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.temp_dir).await.map_err(to_err)?;

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.temp_dir).await.map_err(to_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(to_err)? {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to purge leftover temp file"),
            }
        }

        if removed > 0 {
            info!(removed, dir = %self.temp_dir.display(), "Purged leftover temp files");
        }
        Ok(removed)
    }

    /// Fresh temp path keeping the upload's extension
    pub fn temp_path_for(&self, original_name: &str) -> PathBuf {
        let extension = Path::new(original_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        self.temp_dir
            .join(format!("{}{}", Uuid::new_v4().simple(), extension))
    }

    /// Opens a request for an upload called `original_name`.
    pub async fn open(
        self: &Arc<Self>,
        original_name: &str,
        declared_type: &str,
    ) -> Result<InFlightRequest, ArtifactError> {
        let temp_path = self.temp_path_for(original_name);
        self.open_at(temp_path, original_name, declared_type).await
    }

    /// Opens a request on an explicit temp path.
    ///
    /// A path that is already in flight is an invariant violation and is
    /// reported as [`ArtifactError::Collision`], never overwritten.
    pub async fn open_at(
        self: &Arc<Self>,
        temp_path: PathBuf,
        original_name: &str,
        declared_type: &str,
    ) -> Result<InFlightRequest, ArtifactError> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|source| ArtifactError::TempDir {
                path: self.temp_dir.clone(),
                source,
            })?;

        if !self.registry.insert(&temp_path) {
            error!(path = %temp_path.display(), "Generated temp path collided with an in-flight request");
            return Err(ArtifactError::Collision(temp_path));
        }

        let archive_dir = self.archive.directory.as_deref().map(archive::resolve_dir);
        let archive_existed = match (&archive_dir, archive::sanitize_file_name(original_name)) {
            (Some(dir), Some(name)) if self.archive.move_result_to_archive => {
                tokio::fs::try_exists(dir.join(name)).await.unwrap_or(false)
            }
            _ => false,
        };

        debug!(path = %temp_path.display(), original_name, archive_existed, "Request opened");

        Ok(InFlightRequest {
            manager: Arc::clone(self),
            final_path: temp_path.clone(),
            temp_path,
            state: RequestState::Received,
            original_name: original_name.to_string(),
            content_type: declared_type.to_string(),
            final_filename: original_name.to_string(),
            final_content_type: declared_type.to_string(),
            archive_dir,
            archive_existed,
            forwarded: false,
            scratch: Vec::new(),
        })
    }

    /// Runs all pending cleanups now and waits for them.
    pub async fn shutdown(&self) {
        let pending = self.scheduler.pending();
        if pending > 0 {
            info!(pending, "Flushing pending cleanups");
        }
        self.scheduler.shutdown().await;
    }
}

/// One upload's working data. Dropping it schedules cleanup.
#[derive(Debug)]
pub struct InFlightRequest {
    manager: Arc<ArtifactManager>,
    temp_path: PathBuf,
    state: RequestState,
    original_name: String,
    content_type: String,
    final_path: PathBuf,
    final_filename: String,
    final_content_type: String,
    archive_dir: Option<PathBuf>,
    archive_existed: bool,
    forwarded: bool,
    scratch: Vec<PathBuf>,
}

impl InFlightRequest {
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Resolved type of the uploaded file
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn final_filename(&self) -> &str {
        &self.final_filename
    }

    pub fn final_content_type(&self) -> &str {
        &self.final_content_type
    }

    /// Whether the archival directory held a file with the upload's name
    /// when the request was opened
    pub fn archive_existed(&self) -> bool {
        self.archive_existed
    }

    pub fn advance(&mut self, next: RequestState) -> Result<(), ArtifactError> {
        if !self.state.can_advance_to(next) {
            return Err(ArtifactError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(path = %self.temp_path.display(), from = %self.state, to = %next, "Request state");
        self.state = next;
        Ok(())
    }

    /// Replaces the declared type with the detected one.
    pub fn set_content_type(&mut self, content_type: String) {
        self.final_content_type = content_type.clone();
        self.content_type = content_type;
    }

    /// Registers an extra file (such as an encoder output that may be left
    /// half-written) for removal during cleanup.
    pub fn track_scratch(&mut self, path: PathBuf) {
        if !self.scratch.contains(&path) {
            self.scratch.push(path);
        }
    }

    /// Points the request at an encoded artifact.
    pub fn set_encoded(&mut self, path: PathBuf, extension: &str, content_type: Option<&str>) {
        let stem = Path::new(&self.original_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.final_filename = format!("{stem}{extension}");
        self.final_path = path;
        if let Some(content_type) = content_type {
            self.final_content_type = content_type.to_string();
        }
    }

    /// Records the downstream outcome. Archive actions only run after a
    /// successful response.
    pub fn finish_forward(&mut self, success: bool) -> Result<(), ArtifactError> {
        let next = if success {
            RequestState::Forwarded
        } else {
            RequestState::ForwardFailed
        };
        self.advance(next)?;
        self.forwarded = success;
        Ok(())
    }

    fn cleanup_job(&self) -> CleanupJob {
        let mut job = CleanupJob {
            label: self.temp_path.display().to_string(),
            remove: vec![self.temp_path.clone()],
            ..Default::default()
        };
        for path in std::iter::once(&self.final_path).chain(&self.scratch) {
            if !job.remove.contains(path) {
                job.remove.push(path.clone());
            }
        }

        let Some(dir) = self.archive_dir.as_ref().filter(|_| self.forwarded) else {
            return job;
        };
        let policy = &self.manager.archive;

        if policy.delete_original_after_success {
            if let Some(name) = archive::sanitize_file_name(&self.original_name) {
                job.archive_delete = Some(dir.join(name));
            }
        }

        if policy.move_result_to_archive && self.archive_existed {
            if let Some(name) = archive::sanitize_file_name(&self.final_filename) {
                job.archive_move = Some((self.final_path.clone(), dir.join(name)));
            }
        }

        job
    }
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        if self.state.can_advance_to(RequestState::Cleanup) {
            debug!(path = %self.temp_path.display(), from = %self.state, "Request cleanup");
            self.state = RequestState::Cleanup;
        }

        self.manager.registry.remove(&self.temp_path);
        self.manager.scheduler.schedule(self.cleanup_job());
        self.state = RequestState::Terminal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn manager(dir: &Path, archive: ArchiveConfig) -> Arc<ArtifactManager> {
        let scheduler = CleanupScheduler::new(Duration::from_millis(10), CancellationToken::new());
        Arc::new(ArtifactManager::new(dir.join("temp"), archive, scheduler))
    }

    fn archive_config(dir: &Path, delete: bool, mv: bool) -> ArchiveConfig {
        ArchiveConfig {
            directory: Some(dir.join("archive").to_string_lossy().into_owned()),
            delete_original_after_success: delete,
            move_result_to_archive: mv,
        }
    }

    #[tokio::test]
    async fn test_open_registers_unique_paths_with_original_extension() {
        let dir = TempDir::new().unwrap();
        let manager = manager(dir.path(), ArchiveConfig::default());

        let a = manager.open("holiday.MP4", "video/mp4").await.unwrap();
        let b = manager.open("holiday.MP4", "video/mp4").await.unwrap();

        assert_ne!(a.temp_path(), b.temp_path());
        assert!(a.temp_path().to_string_lossy().ends_with(".MP4"));
        assert!(manager.temp_dir().is_dir());
        assert_eq!(manager.registry().len(), 2);
        assert_eq!(a.state(), RequestState::Received);
        assert_eq!(a.final_path(), a.temp_path());
    }

    #[tokio::test]
    async fn test_forced_collision_is_reported() {
        let dir = TempDir::new().unwrap();
        let manager = manager(dir.path(), ArchiveConfig::default());
        let path = manager.temp_dir().join("fixed.bin");

        let _first = manager.open_at(path.clone(), "a.bin", "application/octet-stream").await.unwrap();
        let second = manager.open_at(path.clone(), "a.bin", "application/octet-stream").await;

        assert!(matches!(second, Err(ArtifactError::Collision(p)) if p == path));
        assert_eq!(manager.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_unregisters_and_removes_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let manager = manager(dir.path(), ArchiveConfig::default());

        let mut request = manager.open("clip.mp4", "video/mp4").await.unwrap();
        std::fs::write(request.temp_path(), b"original").unwrap();
        let encoded = manager.temp_dir().join("clip_x.webm");
        std::fs::write(&encoded, b"encoded").unwrap();
        request.set_encoded(encoded.clone(), ".webm", Some("video/webm"));

        assert_eq!(request.final_filename(), "clip.webm");
        assert_eq!(request.final_content_type(), "video/webm");
        assert_eq!(request.content_type(), "video/mp4");

        let temp = request.temp_path().to_path_buf();
        drop(request);

        assert!(manager.registry().is_empty());
        manager.shutdown().await;
        assert!(!temp.exists());
        assert!(!encoded.exists());
    }

    #[tokio::test]
    async fn test_scratch_files_are_removed_even_without_encoded_result() {
        let dir = TempDir::new().unwrap();
        let manager = manager(dir.path(), ArchiveConfig::default());

        let mut request = manager.open("clip.mp4", "video/mp4").await.unwrap();
        let partial = manager.temp_dir().join("clip_partial.webm");
        std::fs::write(&partial, b"half").unwrap();
        request.track_scratch(partial.clone());
        request.track_scratch(partial.clone());
        assert_eq!(request.cleanup_job().remove.len(), 2);
        drop(request);

        manager.shutdown().await;
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_invalid_transition_is_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = manager(dir.path(), ArchiveConfig::default());
        let mut request = manager.open("a.png", "image/png").await.unwrap();

        assert!(request.advance(RequestState::Forwarding).is_err());
        request.advance(RequestState::Downloaded).unwrap();
        request.advance(RequestState::Forwarding).unwrap();
        request.finish_forward(true).unwrap();
        assert_eq!(request.state(), RequestState::Forwarded);
    }

    #[tokio::test]
    async fn test_archive_presence_is_captured_at_open() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archive");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::write(archive.join("clip.mp4"), b"old").unwrap();

        let manager = manager(dir.path(), archive_config(dir.path(), false, true));
        let present = manager.open("clip.mp4", "video/mp4").await.unwrap();
        let absent = manager.open("other.mp4", "video/mp4").await.unwrap();

        std::fs::remove_file(archive.join("clip.mp4")).unwrap();
        assert!(present.archive_existed());
        assert!(!absent.archive_existed());
    }

    #[tokio::test]
    async fn test_successful_forward_deletes_original_and_moves_result() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archive");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::write(archive.join("clip.mp4"), b"old").unwrap();

        let manager = manager(dir.path(), archive_config(dir.path(), true, true));
        let mut request = manager.open("clip.mp4", "video/mp4").await.unwrap();
        std::fs::write(request.temp_path(), b"upload").unwrap();
        let encoded = manager.temp_dir().join("clip_token.webm");
        std::fs::write(&encoded, b"encoded").unwrap();

        request.advance(RequestState::Downloaded).unwrap();
        request.advance(RequestState::Encoding).unwrap();
        request.advance(RequestState::Encoded).unwrap();
        request.set_encoded(encoded.clone(), ".webm", Some("video/webm"));
        request.advance(RequestState::Forwarding).unwrap();
        request.finish_forward(true).unwrap();
        let temp = request.temp_path().to_path_buf();
        drop(request);

        manager.shutdown().await;
        assert!(!archive.join("clip.mp4").exists());
        assert_eq!(std::fs::read(archive.join("clip.webm")).unwrap(), b"encoded");
        assert!(!temp.exists());
        assert!(!encoded.exists());
    }

    #[tokio::test]
    async fn test_failed_forward_leaves_archive_untouched() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archive");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::write(archive.join("photo.png"), b"old").unwrap();

        let manager = manager(dir.path(), archive_config(dir.path(), true, true));
        let mut request = manager.open("photo.png", "image/png").await.unwrap();
        std::fs::write(request.temp_path(), b"upload").unwrap();
        request.advance(RequestState::Downloaded).unwrap();
        request.advance(RequestState::Forwarding).unwrap();
        request.finish_forward(false).unwrap();
        drop(request);

        manager.shutdown().await;
        assert_eq!(std::fs::read(archive.join("photo.png")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(manager.temp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_move_never_overwrites_existing_destination() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archive");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::write(archive.join("photo.png"), b"old").unwrap();

        let manager = manager(dir.path(), archive_config(dir.path(), false, true));
        let mut request = manager.open("photo.png", "image/png").await.unwrap();
        std::fs::write(request.temp_path(), b"new").unwrap();
        request.advance(RequestState::Downloaded).unwrap();
        request.advance(RequestState::Forwarding).unwrap();
        request.finish_forward(true).unwrap();
        drop(request);

        manager.shutdown().await;
        assert_eq!(std::fs::read(archive.join("photo.png")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(manager.temp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_prepare_purges_leftovers() {
        let dir = TempDir::new().unwrap();
        let manager = manager(dir.path(), ArchiveConfig::default());
        std::fs::create_dir_all(manager.temp_dir()).unwrap();
        std::fs::write(manager.temp_dir().join("stale1"), b"x").unwrap();
        std::fs::write(manager.temp_dir().join("stale2"), b"x").unwrap();

        assert_eq!(manager.prepare().await.unwrap(), 2);
        assert_eq!(std::fs::read_dir(manager.temp_dir()).unwrap().count(), 0);
    }
}

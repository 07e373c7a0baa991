//! Per-session transient storage.
//!
//! A [`Workspace`] is a directory exclusively owned by one session. It holds
//! the uploaded or resolved cover, the source audio, and the rendered
//! output, and it never outlives the session that allocated it.

use std::io;
use std::path::{Path, PathBuf};

use crate::types::SessionKey;

/// Canonical file name for an uploaded image.
pub const IMAGE_FILE: &str = "image.jpg";
/// Canonical file name for a resolved or synthesized cover.
pub const COVER_FILE: &str = "cover.jpg";
/// Stem for the source audio; the extension depends on the source.
pub const AUDIO_STEM: &str = "audio";
/// Canonical file name for the rendered artifact.
pub const OUTPUT_FILE: &str = "video.mp4";

/// Allocates workspaces under a single base directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a fresh, empty workspace for `key`.
    ///
    /// Directory names are `<key>_<8 hex chars>` so a session that restarts
    /// never reuses the directory of a previous round.
    pub async fn allocate(&self, key: SessionKey) -> io::Result<Workspace> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let root = self.base_dir.join(format!("{key}_{}", &suffix[..8]));
        tokio::fs::create_dir_all(&root).await?;
        Ok(Workspace { root })
    }
}

/// An allocated session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Wrap an existing directory. Used when restoring a workspace handle
    /// and by tests.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_path(&self) -> PathBuf {
        self.root.join(IMAGE_FILE)
    }

    pub fn cover_path(&self) -> PathBuf {
        self.root.join(COVER_FILE)
    }

    pub fn audio_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("{AUDIO_STEM}.{extension}"))
    }

    pub fn output_path(&self) -> PathBuf {
        self.root.join(OUTPUT_FILE)
    }

    /// Whether the directory is still present on disk.
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.root).await.unwrap_or(false)
    }

    /// Remove the directory and everything in it.
    ///
    /// Removing a workspace that is already gone is a no-op, never an
    /// error. Other failures are returned so the caller can log them; they
    /// must not fail the session.
    pub async fn destroy(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocate_creates_unique_directories() {
        let base = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(base.path());

        let first = manager.allocate(42).await.unwrap();
        let second = manager.allocate(42).await.unwrap();

        assert_ne!(first.root(), second.root());
        assert!(first.exists().await);
        assert!(second.exists().await);
        let name = first.root().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("42_"));
        assert_eq!(name.len(), "42_".len() + 8);
    }

    #[tokio::test]
    async fn destroy_removes_contents() {
        let base = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(base.path()).allocate(1).await.unwrap();
        tokio::fs::write(ws.image_path(), b"jpeg").await.unwrap();

        ws.destroy().await.unwrap();

        assert!(!ws.exists().await);
    }

    #[tokio::test]
    async fn destroy_absent_workspace_is_noop() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::at(base.path().join("never-created"));

        assert!(ws.destroy().await.is_ok());
        assert!(ws.destroy().await.is_ok());
    }

    #[test]
    fn canonical_paths() {
        let ws = Workspace::at("/tmp/ws");
        assert_eq!(ws.image_path(), PathBuf::from("/tmp/ws/image.jpg"));
        assert_eq!(ws.cover_path(), PathBuf::from("/tmp/ws/cover.jpg"));
        assert_eq!(ws.audio_path("m4a"), PathBuf::from("/tmp/ws/audio.m4a"));
        assert_eq!(ws.output_path(), PathBuf::from("/tmp/ws/video.mp4"));
    }
}

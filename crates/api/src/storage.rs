//! On-disk artifact store.
//!
//! A flat layout under two base directories: uploaded originals and
//! compressed outputs. Artifacts are written to their final path in one
//! step; a job record only references a path after the write returns, so no
//! temp-rename dance is needed. Every job writes to unique paths, so writers
//! never contend.

use std::io;
use std::path::{Path, PathBuf};

/// Extension used when an uploaded filename carries none.
const DEFAULT_EXTENSION: &str = "gif";

#[derive(Debug)]
pub struct ArtifactStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            upload_dir,
            output_dir,
        }
    }

    /// Create both base directories if absent. Called once at startup.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// Path for a job's original artifact, preserving the upload's file
    /// extension.
    pub fn original_path(&self, job_id: &str, original_filename: &str) -> PathBuf {
        let ext = sanitized_extension(original_filename);
        self.upload_dir.join(format!("{job_id}.{ext}"))
    }

    /// Allocate a fresh path for a compressed output.
    pub fn allocate_output(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{DEFAULT_EXTENSION}", uuid::Uuid::new_v4()))
    }

    /// Write artifact bytes to their final path.
    pub async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, bytes).await
    }

    /// Open an artifact for streaming, returning the file and its length.
    pub async fn open(&self, path: &str) -> io::Result<(tokio::fs::File, u64)> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Remove an artifact. A missing file is not an error; deletes are
    /// best-effort and may race with the reaper.
    pub async fn remove(&self, path: &str) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Size of an artifact on disk.
    pub async fn size(&self, path: &str) -> io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }
}

/// Extract a safe lowercase extension from an uploaded filename.
fn sanitized_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ArtifactStore {
        ArtifactStore::new(PathBuf::from("/up"), PathBuf::from("/out"))
    }

    #[test]
    fn original_path_preserves_extension() {
        let path = store().original_path("job-1", "dance.GIF");
        assert_eq!(path, PathBuf::from("/up/job-1.gif"));
    }

    #[test]
    fn original_path_defaults_missing_extension() {
        let path = store().original_path("job-1", "no-extension");
        assert_eq!(path, PathBuf::from("/up/job-1.gif"));
    }

    #[test]
    fn original_path_rejects_suspicious_extension() {
        let path = store().original_path("job-1", "evil.g/../if");
        assert_eq!(path, PathBuf::from("/up/job-1.gif"));
    }

    #[test]
    fn allocated_outputs_are_unique() {
        let s = store();
        assert_ne!(s.allocate_output(), s.allocate_output());
    }

    #[tokio::test]
    async fn write_open_remove_round_trip() {
        let dir = std::env::temp_dir().join(format!("gifpress-store-{}", uuid::Uuid::new_v4()));
        let s = ArtifactStore::new(dir.join("up"), dir.join("out"));
        s.ensure_dirs().await.unwrap();

        let path = s.original_path("job-1", "a.gif");
        s.write(&path, b"GIF89a").await.unwrap();

        let path_str = path.to_string_lossy();
        assert_eq!(s.size(&path_str).await.unwrap(), 6);
        let (_file, len) = s.open(&path_str).await.unwrap();
        assert_eq!(len, 6);

        s.remove(&path_str).await.unwrap();
        assert!(s.open(&path_str).await.is_err());
        // Removing a missing file is not an error.
        s.remove(&path_str).await.unwrap();

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}

//! Payload storage: the read-only source file on the sending side and the
//! incoming files written on the receiving side.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Storage trait for payload files.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a payload for sending. The file is opened read-only.
    async fn open_payload(&self, path: &Path) -> Result<PayloadFile>;

    /// Create a fresh file for an incoming payload named `name`.
    async fn create_incoming(&self, name: &str) -> Result<IncomingFile>;
}

/// An opened payload source. Dropping it closes the file.
#[derive(Debug)]
pub struct PayloadFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
    pub file: File,
}

/// A file being written for an incoming payload.
#[derive(Debug)]
pub struct IncomingFile {
    pub path: PathBuf,
    file: File,
    written: u64,
}

impl IncomingFile {
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and close the file, returning its final path.
    pub async fn finish(mut self) -> Result<PathBuf> {
        self.file.flush().await?;
        self.file.sync_all().await.ok();
        tracing::debug!("Finished incoming file {} ({} bytes)", self.path.display(), self.written);
        Ok(self.path)
    }
}

/// Local filesystem-based storage implementation.
#[derive(Clone)]
pub struct LocalStorage {
    incoming_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(incoming_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&incoming_dir)
            .context("Failed to create incoming directory")?;

        Ok(Self { incoming_dir })
    }

    pub fn incoming_dir(&self) -> &Path {
        &self.incoming_dir
    }

    /// First free path for `name`, adding " (n)" before the extension on collision.
    async fn free_path(&self, name: &str) -> PathBuf {
        let candidate = self.incoming_dir.join(name);
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }

        let path = Path::new(name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
        let ext = path.extension().and_then(|e| e.to_str());

        let mut n = 1;
        loop {
            let numbered = match ext {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            let candidate = self.incoming_dir.join(numbered);
            if !fs::try_exists(&candidate).await.unwrap_or(false) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Strip any directory components a peer may have put into a payload name.
pub fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .trim();

    if base.is_empty() || base == "." || base == ".." {
        "payload.bin".to_string()
    } else {
        base.to_string()
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn open_payload(&self, path: &Path) -> Result<PayloadFile> {
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open payload: {}", path.display()))?;

        let size = file.metadata().await?.len();

        // Extract just the filename, not the full path
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| "payload.bin".to_string());

        tracing::debug!("Opened payload {} ({} bytes)", path.display(), size);
        Ok(PayloadFile {
            name,
            size,
            path: path.to_path_buf(),
            file,
        })
    }

    async fn create_incoming(&self, name: &str) -> Result<IncomingFile> {
        let name = sanitize_name(name);
        let path = self.free_path(&name).await;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        tracing::debug!("Created incoming file {}", path.display());
        Ok(IncomingFile {
            path,
            file,
            written: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_payload_reports_name_and_size() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("clip.mp4");
        std::fs::write(&path, vec![7u8; 3000])?;

        let storage = LocalStorage::new(temp.path().join("incoming"))?;
        let payload = storage.open_payload(&path).await?;

        assert_eq!(payload.name, "clip.mp4");
        assert_eq!(payload.size, 3000);
        Ok(())
    }

    #[tokio::test]
    async fn test_open_missing_payload_fails() -> Result<()> {
        let temp = TempDir::new()?;
        let storage = LocalStorage::new(temp.path().to_path_buf())?;

        assert!(storage.open_payload(&temp.path().join("gone.bin")).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_incoming_never_overwrites() -> Result<()> {
        let temp = TempDir::new()?;
        let storage = LocalStorage::new(temp.path().to_path_buf())?;

        let mut first = storage.create_incoming("notes.txt").await?;
        first.write_chunk(b"first").await?;
        let first_path = first.finish().await?;

        let mut second = storage.create_incoming("notes.txt").await?;
        second.write_chunk(b"second").await?;
        assert_eq!(second.written(), 6);
        let second_path = second.finish().await?;

        assert_eq!(first_path, temp.path().join("notes.txt"));
        assert_eq!(second_path, temp.path().join("notes (1).txt"));
        assert_eq!(std::fs::read(&first_path)?, b"first");
        assert_eq!(std::fs::read(&second_path)?, b"second");
        Ok(())
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("video.mp4"), "video.mp4");
        assert_eq!(sanitize_name(".."), "payload.bin");
        assert_eq!(sanitize_name(""), "payload.bin");
    }
}

//! Filesystem blob storage for uploaded media.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Public URL prefix under which stored blobs are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
}

/// Where a payload landed and what it hashed to.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: u64,
}

impl StoredBlob {
    pub fn url(&self) -> String {
        format!("{PUBLIC_PREFIX}/{}", self.stored_path)
    }
}

#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Root the storage at `root`, creating the directory if needed.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` under a fresh dated path.
    pub async fn store(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredBlob, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }

        let stored_path = build_stored_path(original_name);
        let absolute = self.resolve(&stored_path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        if let Err(err) = write_all(&mut file, &data).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(err.into());
        }

        Ok(StoredBlob {
            stored_path,
            checksum: hex::encode(Sha256::digest(&data)),
            size_bytes: data.len() as u64,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove a stored payload. Missing files count as removed.
    pub async fn delete(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    /// Total bytes held under the storage root.
    pub async fn usage_bytes(&self) -> Result<u64, UploadStorageError> {
        let mut total = 0u64;
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else {
                    total = total.saturating_add(metadata.len());
                }
            }
        }
        Ok(total)
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

async fn write_all(file: &mut fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.flush().await
}

fn build_stored_path(original_name: &str) -> String {
    let (year, month, day) = time::OffsetDateTime::now_utc().to_calendar_date();
    let identifier = Uuid::new_v4();
    let filename = sanitize_filename(original_name);
    format!("{year}/{:02}/{day:02}/{identifier}-{filename}", month as u8)
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("upload");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "upload".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

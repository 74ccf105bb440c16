use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};
use uuid::Uuid;

/// Folder under a user's media root holding metadata attachments.
pub const DOCS_AREA: &str = "docs";
/// Folder under a user's media root holding uploaded form definitions.
pub const DEFINITIONS_AREA: &str = "formdefs";

const MAX_FILE_NAME_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum MediaStorageError {
    #[error("file not found")]
    NotFound,
    #[error("invalid file path")]
    InvalidPath,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaStorageError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// A file written by [`MediaStorage::put`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Path relative to the storage root, always `/`-separated.
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

pub struct MediaStorage {
    base_path: PathBuf,
}

impl MediaStorage {
    pub fn new(media_dir: &Path) -> Self {
        Self {
            base_path: media_dir.to_path_buf(),
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, MediaStorageError> {
        let rel = Path::new(relative);
        if relative.is_empty()
            || !rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(MediaStorageError::InvalidPath);
        }
        Ok(self.base_path.join(rel))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    pub async fn exists(&self, relative: &str) -> Result<bool, MediaStorageError> {
        let path = self.resolve(relative)?;
        Ok(fs::try_exists(&path).await?)
    }

    pub async fn get(&self, relative: &str) -> Result<(BufReader<File>, u64), MediaStorageError> {
        let path = self.resolve(relative)?;
        let file = File::open(&path).await.map_err(MediaStorageError::from_io)?;

        let metadata = file.metadata().await?;
        Ok((BufReader::new(file), metadata.len()))
    }

    /// Writes `data` as `<username>/<area>/<file_name>`, picking a free name
    /// when one already exists. The name is claimed with a hard link, which
    /// fails if another upload got there first.
    pub async fn put(
        &self,
        username: &str,
        area: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<StoredFile, MediaStorageError> {
        let file_name = sanitize_file_name(file_name).ok_or(MediaStorageError::InvalidPath)?;
        let dir = format!("{username}/{area}");
        fs::create_dir_all(self.resolve(&dir)?).await?;

        let mut hasher = Sha256::new();
        hasher.update(data);
        let sha256 = hex::encode(hasher.finalize());

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;
        drop(temp_file);

        let (stem, ext) = split_extension(&file_name);
        let mut relative = format!("{dir}/{file_name}");
        let mut attempt = 1;
        let linked = loop {
            match fs::hard_link(&temp_path, self.resolve(&relative)?).await {
                Ok(()) => break Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    relative = match ext {
                        Some(ext) => format!("{dir}/{stem}_{attempt}.{ext}"),
                        None => format!("{dir}/{stem}_{attempt}"),
                    };
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = fs::remove_file(&temp_path).await {
            tracing::warn!("Failed to remove temp upload {}: {e}", temp_path.display());
        }
        linked?;

        Ok(StoredFile {
            path: relative,
            sha256,
            size: data.len() as u64,
        })
    }

    pub async fn delete(&self, relative: &str) -> Result<bool, MediaStorageError> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MediaStorageError::Io(e)),
        }
    }
}

/// Keeps only the final path segment of an uploaded name and drops
/// characters that are unsafe in file names.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .take(MAX_FILE_NAME_LEN)
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Splits a stored file name into (stem, extension without the dot).
#[must_use]
pub fn file_name_parts(path: &str) -> (String, String) {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = split_extension(name);
    (stem.to_string(), ext.unwrap_or_default().to_string())
}

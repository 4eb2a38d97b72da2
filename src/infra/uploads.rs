//! Filesystem storage for post images.
//!
//! Images live under `<media_root>/posts/` and are referenced from the
//! database by their path relative to the media root, e.g.
//! `posts/3f2a9c0d1b7e4a55-cat.gif`. The same relative path is served at
//! `/media/<path>`.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use imagesize::{ImageError, ImageSize};
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::fs;

pub const POSTS_PREFIX: &str = "posts";
const DIGEST_PREFIX_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum MediaStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("uploaded file is not a readable image")]
    NotAnImage,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Image accepted into storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub stored_path: String,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    /// Open storage rooted at `root`, creating the directory when missing.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(root.join(POSTS_PREFIX))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the dimensions of an image payload without decoding pixels.
    pub fn probe_image(data: &[u8]) -> Result<ImageSize, MediaStorageError> {
        if data.is_empty() {
            return Err(MediaStorageError::EmptyPayload);
        }
        match imagesize::blob_size(data) {
            Ok(size) if size.width > 0 && size.height > 0 => Ok(size),
            Ok(_) | Err(ImageError::NotSupported) | Err(ImageError::CorruptedImage) => {
                Err(MediaStorageError::NotAnImage)
            }
            Err(ImageError::IoError(err)) => Err(MediaStorageError::Io(err)),
        }
    }

    /// Validate and persist a post image. Identical payloads with the same
    /// name map to the same stored path.
    pub async fn store_post_image(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredImage, MediaStorageError> {
        let size = Self::probe_image(&data)?;

        let digest = hex::encode(Sha256::digest(&data));
        let stored_path = format!(
            "{POSTS_PREFIX}/{}-{}",
            &digest[..DIGEST_PREFIX_LEN],
            sanitize_filename(original_name)
        );
        let absolute = self.resolve(&stored_path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&absolute, &data).await?;

        Ok(StoredImage {
            stored_path,
            width: size.width,
            height: size.height,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, MediaStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, MediaStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(MediaStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
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

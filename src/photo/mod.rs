//! Photo stores: whole images persisted by key.
//!
//! Every backend applies [`with_photo_extension`] to keys on both `save`
//! and `load`, and encodes the image in the format named by the resulting
//! extension, so a key resolves the same way on any backend.

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use std::io::Cursor;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use image::{ImageFormat, RgbImage};

use crate::error::StoreError;
use crate::naming::with_photo_extension;

pub use local::LocalPhotoStore;
#[cfg(feature = "s3")]
pub use s3::S3PhotoStore;

/// Where a stored photo can be read by collaborators outside the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhotoRef {
    Local { path: PathBuf },
    Object { bucket: String, key: String },
}

impl std::fmt::Display for PhotoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhotoRef::Local { path } => write!(f, "{}", path.display()),
            PhotoRef::Object { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

pub trait PhotoStore: Send + Sync {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Store `image` under `key`, replacing any existing entry.
    ///
    /// Returns the effective key (with extension).
    fn save(&self, image: &RgbImage, key: &str) -> Result<String, StoreError>;

    /// Fetch the image stored under `key`; [`StoreError::PhotoNotFound`] if absent.
    fn load(&self, key: &str) -> Result<RgbImage, StoreError>;

    /// Reference to the stored object for the detection collaborator.
    fn locate(&self, key: &str) -> Result<PhotoRef, StoreError>;
}

/// Normalized key for any backend: extension applied, no path tricks.
pub(crate) fn store_key(key: &str) -> Result<String, StoreError> {
    let trimmed = key.trim();
    if trimmed.is_empty()
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.starts_with('.')
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(with_photo_extension(trimmed))
}

/// Encode `image` in the format implied by the key's extension.
pub(crate) fn encode_for_key(image: &RgbImage, key: &str) -> Result<Vec<u8>, StoreError> {
    let format = ImageFormat::from_path(key).unwrap_or(ImageFormat::Jpeg);
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

pub(crate) fn decode_stored(bytes: &[u8]) -> Result<RgbImage, StoreError> {
    Ok(image::load_from_memory(bytes)?.into_rgb8())
}

/// Content type matching [`encode_for_key`].
#[allow(dead_code)]
pub(crate) fn content_type_for_key(key: &str) -> &'static str {
    match ImageFormat::from_path(key) {
        Ok(ImageFormat::Png) => "image/png",
        _ => "image/jpeg",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhotoBackendKind {
    Local,
    S3,
}

impl FromStr for PhotoBackendKind {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(PhotoBackendKind::Local),
            "s3" => Ok(PhotoBackendKind::S3),
            other => Err(StoreError::unsupported("photo storage", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoStoreSettings {
    pub kind: PhotoBackendKind,
    pub path: PathBuf,
    pub bucket: String,
    pub region: String,
}

/// Open the configured photo store.
pub fn open_photo_store(settings: &PhotoStoreSettings) -> Result<Arc<dyn PhotoStore>, StoreError> {
    match settings.kind {
        PhotoBackendKind::Local => Ok(Arc::new(LocalPhotoStore::open(&settings.path)?)),
        #[cfg(feature = "s3")]
        PhotoBackendKind::S3 => Ok(Arc::new(S3PhotoStore::connect(
            &settings.bucket,
            &settings.region,
        )?)),
        #[cfg(not(feature = "s3"))]
        PhotoBackendKind::S3 => Err(StoreError::not_compiled("photo storage", "s3", "s3")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings() {
        assert_eq!("LOCAL".parse::<PhotoBackendKind>().unwrap(), PhotoBackendKind::Local);
        assert_eq!("s3".parse::<PhotoBackendKind>().unwrap(), PhotoBackendKind::S3);
        let err = "gcs".parse::<PhotoBackendKind>().unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedBackend { .. }));
    }

    #[test]
    fn store_key_rules() {
        assert_eq!(store_key("cam_2024-01-01_00:00:00").unwrap(), "cam_2024-01-01_00:00:00.jpg");
        assert_eq!(store_key("cam.png").unwrap(), "cam.png");
        assert!(store_key("").is_err());
        assert!(store_key("../etc/passwd").is_err());
        assert!(store_key("a/b").is_err());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for_key("a.png"), "image/png");
        assert_eq!(content_type_for_key("a.jpeg"), "image/jpeg");
    }
}

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::RgbImage;

use super::{decode_stored, encode_for_key, store_key, PhotoRef, PhotoStore};
use crate::error::StoreError;

/// Photos as files in one directory.
pub struct LocalPhotoStore {
    directory: PathBuf,
}

impl LocalPhotoStore {
    /// Open (and create if needed) the photo directory.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> Result<(String, PathBuf), StoreError> {
        let key = store_key(key)?;
        let path = self.directory.join(&key);
        Ok((key, path))
    }
}

impl PhotoStore for LocalPhotoStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn save(&self, image: &RgbImage, key: &str) -> Result<String, StoreError> {
        let (key, path) = self.path_for(key)?;
        let bytes = encode_for_key(image, &key)?;

        // Write-then-rename so readers never observe a partial file.
        let staging = self.directory.join(format!(".{}.partial", key));
        fs::write(&staging, &bytes)?;
        fs::rename(&staging, &path)?;
        log::debug!("saved {} ({} bytes) to {}", key, bytes.len(), path.display());
        Ok(key)
    }

    fn load(&self, key: &str) -> Result<RgbImage, StoreError> {
        let (key, path) = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::PhotoNotFound(key))
            }
            Err(e) => return Err(e.into()),
        };
        decode_stored(&bytes)
    }

    fn locate(&self, key: &str) -> Result<PhotoRef, StoreError> {
        let (key, path) = self.path_for(key)?;
        if !path.exists() {
            return Err(StoreError::PhotoNotFound(key));
        }
        Ok(PhotoRef::Local { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8]))
    }

    #[test]
    fn png_round_trip_is_pixel_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::open(dir.path().join("images")).unwrap();
        let image = gradient(32, 24);

        let key = store.save(&image, "main_gate_lane_1_2024-07-09_14:17:10.png").unwrap();
        assert_eq!(key, "main_gate_lane_1_2024-07-09_14:17:10.png");
        let loaded = store.load(&key).unwrap();
        assert_eq!(loaded, image);
    }

    #[test]
    fn default_extension_is_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::open(dir.path()).unwrap();
        let image = RgbImage::from_pixel(16, 16, Rgb([200, 40, 40]));

        let key = store.save(&image, "red_square").unwrap();
        assert_eq!(key, "red_square.jpg");
        assert!(dir.path().join("red_square.jpg").exists());

        // Same key with or without the extension.
        let a = store.load("red_square").unwrap();
        let b = store.load("red_square.jpg").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), (16, 16));
    }

    #[test]
    fn save_overwrites_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::open(dir.path()).unwrap();
        store.save(&gradient(8, 8), "cam.png").unwrap();
        let second = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        store.save(&second, "cam.png").unwrap();
        assert_eq!(store.load("cam.png").unwrap(), second);
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::open(dir.path()).unwrap();
        let err = store.load("non_existent.jpg").unwrap_err();
        assert!(err.is_not_found());
        assert!(store.locate("non_existent").unwrap_err().is_not_found());
    }

    #[test]
    fn locate_points_at_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::open(dir.path()).unwrap();
        store.save(&gradient(4, 4), "cam").unwrap();
        let photo = store.locate("cam").unwrap();
        assert_eq!(
            photo,
            PhotoRef::Local {
                path: dir.path().join("cam.jpg")
            }
        );
        assert!(dir.path().join("cam.jpg").metadata().unwrap().len() > 0);
    }
}

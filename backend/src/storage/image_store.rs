use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid file format")]
    InvalidFormat,
    #[error("File too large")]
    FileTooLarge,
}

/// Local directory holding the images referenced by history records.
/// Uniqueness of saved names relies on one-second timestamp granularity plus
/// the original name; concurrent same-second saves of the same file by the
/// same user are an accepted risk.
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ImageStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unique_filename(username: &str, original_name: &str, now: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}",
            username,
            now.format("%Y%m%d_%H%M%S"),
            original_name
        )
    }

    pub fn extract_file_extension(mime_type: &str) -> Result<&str, ImageStoreError> {
        match mime_type {
            "image/jpeg" => Ok("jpg"),
            "image/png" => Ok("png"),
            _ => Err(ImageStoreError::InvalidFormat),
        }
    }

    pub fn validate_image_size(image_data: &[u8]) -> Result<(), ImageStoreError> {
        const MAX_SIZE: usize = 50 * 1024 * 1024;
        if image_data.len() > MAX_SIZE {
            return Err(ImageStoreError::FileTooLarge);
        }
        Ok(())
    }

    /// Write the original upload bytes under `filename`, returning the path
    /// stored in the history record.
    pub fn save_image(&self, filename: &str, image_data: &[u8]) -> Result<PathBuf, ImageStoreError> {
        ImageStore::validate_image_size(image_data)?;

        let path = self.root.join(filename);
        std::fs::write(&path, image_data)?;
        log::debug!("saved upload image to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filename_follows_the_username_timestamp_pattern() {
        let when = Utc.with_ymd_and_hms(2025, 8, 6, 9, 30, 5).unwrap();
        assert_eq!(
            ImageStore::unique_filename("budi", "daun.png", when),
            "budi_20250806_093005_daun.png"
        );
    }

    #[test]
    fn only_png_and_jpeg_are_accepted() {
        assert_eq!(ImageStore::extract_file_extension("image/png").unwrap(), "png");
        assert_eq!(ImageStore::extract_file_extension("image/jpeg").unwrap(), "jpg");
        assert!(ImageStore::extract_file_extension("image/webp").is_err());
        assert!(ImageStore::extract_file_extension("text/plain").is_err());
    }

    #[test]
    fn oversized_uploads_are_rejected() {
        assert!(ImageStore::validate_image_size(&[0u8; 1024]).is_ok());
        let huge = vec![0u8; 50 * 1024 * 1024 + 1];
        assert!(matches!(
            ImageStore::validate_image_size(&huge),
            Err(ImageStoreError::FileTooLarge)
        ));
    }
}

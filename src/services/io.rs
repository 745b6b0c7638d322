//! Image decode/encode service
//!
//! Centralizes the image I/O boundary so decode failures surface as one
//! error kind with source context.

use crate::error::{Result, RestoreError};
use image::RgbImage;
use std::path::Path;

/// Image loading and saving for the pipeline boundary
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image from raw bytes into the pipeline's RGB form
    ///
    /// # Errors
    /// Returns `RestoreError::Image` for malformed or unsupported data.
    pub fn decode_bytes(bytes: &[u8]) -> Result<RgbImage> {
        let image = image::load_from_memory(bytes)?;
        Ok(image.to_rgb8())
    }

    /// Load an image from a file path
    ///
    /// # Errors
    /// Returns `RestoreError::Processing` with path context on decode
    /// failures.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
        let path_ref = path.as_ref();
        let image = image::open(path_ref)
            .map_err(|e| RestoreError::decode_error(path_ref, e))?;
        Ok(image.to_rgb8())
    }

    /// Save a single-channel raster as PNG
    ///
    /// # Errors
    /// Returns `RestoreError::Image` on encoding failures.
    pub fn save_gray<P: AsRef<Path>>(image: &image::GrayImage, path: P) -> Result<()> {
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_decode_bytes_round_trip() {
        let original = RgbImage::from_pixel(16, 16, Rgb([9, 90, 200]));
        let mut bytes = Vec::new();
        original
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = ImageIOService::decode_bytes(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = ImageIOService::decode_bytes(&[0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(RestoreError::Image(_))));
    }

    #[test]
    fn test_load_missing_file_has_path_context() {
        let err = ImageIOService::load("/nonexistent/mural.png").unwrap_err();
        assert!(err.to_string().contains("mural.png"));
    }
}

//! Image decoding.
//!
//! Every texture is decoded to 8-bit RGBA regardless of the source channel
//! count, matching the `R8G8B8A8_UNORM` format of GPU textures.

use std::path::Path;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Decoded pixels, four bytes per pixel, rows top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Byte length the pixel data must have for the stored dimensions.
    #[inline]
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Loads and decodes an image file to RGBA8.
///
/// # Errors
///
/// - [`ResourceError::FileNotFound`] if `path` does not exist
/// - [`ResourceError::Image`] if decoding fails
/// - [`ResourceError::ZeroSize`] if either dimension is zero
pub fn load_image(path: &Path) -> ResourceResult<ImageData> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let rgba = image::open(path)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(ResourceError::ZeroSize(path.to_path_buf()));
    }

    debug!("Decoded {:?} ({}x{})", path, width, height);

    Ok(ImageData {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("vbparts-no-such-texture.png");
        assert!(matches!(
            load_image(&path),
            Err(ResourceError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_rgb_is_expanded_to_rgba() {
        let path = std::env::temp_dir().join(format!("vbparts-rgb-{}.png", std::process::id()));
        let rgb = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        rgb.save(&path).unwrap();

        let data = load_image(&path).unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.pixels.len(), data.expected_len());
        assert_eq!(&data.pixels[0..4], &[10, 20, 30, 255]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let path = std::env::temp_dir().join(format!("vbparts-garbage-{}.png", std::process::id()));
        std::fs::write(&path, b"not a png").unwrap();

        assert!(matches!(load_image(&path), Err(ResourceError::Image(_))));

        std::fs::remove_file(&path).unwrap();
    }
}

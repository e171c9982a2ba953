//! Frame: one captured screen, in grayscale.

use std::sync::{Arc, OnceLock};

use image::{DynamicImage, GrayImage, ImageResult};

use crate::matcher::PreparedFrame;

/// A single grayscale screen capture.
///
/// Frames are ephemeral: the engine captures a fresh one for every
/// decision and drops it afterwards. Search data is built on the first
/// template lookup and reused by the following ones.
#[derive(Clone)]
pub struct Frame {
    image: GrayImage,
    prepared: OnceLock<Arc<PreparedFrame>>,
}

impl Frame {
    #[must_use]
    pub fn new(image: GrayImage) -> Self {
        Self {
            image,
            prepared: OnceLock::new(),
        }
    }

    /// Decode an encoded screenshot (PNG, JPEG) and convert it to grayscale.
    ///
    /// # Errors
    ///
    /// Returns the decoder error if `bytes` is not a supported image.
    pub fn decode(bytes: &[u8]) -> ImageResult<Self> {
        image::load_from_memory(bytes).map(|img| Self::from(&img))
    }

    #[must_use]
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Only called for non-empty frames.
    pub(crate) fn prepared(&self) -> &PreparedFrame {
        self.prepared
            .get_or_init(|| Arc::new(PreparedFrame::new(&self.image)))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("prepared", &self.prepared.get().is_some())
            .finish()
    }
}

impl From<&DynamicImage> for Frame {
    fn from(image: &DynamicImage) -> Self {
        Self::new(image.to_luma8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn should_decode_png_to_grayscale() {
        let rgb = RgbImage::from_pixel(4, 3, Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let frame = Frame::decode(&bytes).unwrap();

        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(frame.image().get_pixel(0, 0), &Luma([255]));
    }

    #[test]
    fn should_reject_garbage_bytes() {
        assert!(Frame::decode(b"not an image").is_err());
    }
}

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

use super::error::CaptureError;

/// One RGBA8 video frame.
///
/// Pixel data is shared (`Arc`), so cloning a frame is cheap and a frame
/// handed to a consumer is never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(CaptureError::ConfigurationFailed(format!(
                "frame buffer of {} bytes does not match {}x{} RGBA",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
        })
    }

    /// A frame filled with a single opaque color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width.max(1) as usize * height.max(1) as usize * 4)
            .collect();
        Self {
            width: width.max(1),
            height: height.max(1),
            data: data.into(),
        }
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw().into(),
        }
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.to_vec())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGBA at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

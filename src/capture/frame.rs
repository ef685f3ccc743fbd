use std::{fmt, io::Cursor};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use image::{imageops::FilterType, DynamicImage, ImageFormat, ImageResult};
use serde::{Serialize, Serializer};

/// A PNG still, already shrunk to the fixed square raster.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    png: Vec<u8>,
    size: u32,
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Squash `image` into a `size`×`size` raster regardless of the source
    /// aspect ratio, then encode it as PNG.
    pub fn from_image(image: &DynamicImage, size: u32) -> ImageResult<Self> {
        let resized = image.resize_exact(size, size, FilterType::Triangle);
        let rgba = DynamicImage::ImageRgba8(resized.to_rgba8());

        let mut png = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        Ok(Self {
            png,
            size,
            captured_at: Utc::now(),
        })
    }

    /// Wrap bytes that are already encoded. Used by sources that downsample
    /// on their own.
    pub fn from_png(png: Vec<u8>, size: u32) -> Self {
        Self {
            png,
            size,
            captured_at: Utc::now(),
        }
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.to_base64())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.png.len())
            .field("size", &self.size)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.data_url())
    }
}

// ============================================================================
// RASTER HANDLES: decoded pixel buffers and immutable panel sources
// ============================================================================

use std::io::Cursor;
use std::sync::{Arc, OnceLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, ExportError};

/// Encoded form requested from a [`RasterHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodedFormat {
    Png,
    Jpeg(u8),
}

/// A decoded RGBA buffer shared by reference.
///
/// Baked panel images, thumbnails and export canvases all travel as a
/// `RasterHandle`; cloning is a reference-count bump, never a pixel copy.
#[derive(Clone, Debug)]
pub struct RasterHandle(Arc<RgbaImage>);

impl RasterHandle {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    /// Pixel-level equality (used to verify deterministic rebakes).
    pub fn same_pixels(&self, other: &RasterHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.dimensions() == other.0.dimensions() && self.0.as_raw() == other.0.as_raw())
    }

    /// Encode for storage or display. The raster itself stays the source of truth.
    pub fn to_encoded_bytes(&self, format: EncodedFormat) -> Result<Vec<u8>, ExportError> {
        let mut out = Cursor::new(Vec::new());
        match format {
            EncodedFormat::Png => {
                DynamicImage::ImageRgba8((*self.0).clone()).write_to(&mut out, ImageOutputFormat::Png)?;
            }
            EncodedFormat::Jpeg(quality) => {
                let rgb = DynamicImage::ImageRgba8((*self.0).clone()).to_rgb8();
                DynamicImage::ImageRgb8(rgb).write_to(&mut out, ImageOutputFormat::Jpeg(quality))?;
            }
        }
        Ok(out.into_inner())
    }
}

impl From<RgbaImage> for RasterHandle {
    fn from(image: RgbaImage) -> Self {
        Self::new(image)
    }
}

/// The immutable canonical source of a panel: the encoded upload bytes.
///
/// Every bake recomputes from these bytes. The decoded raster is cached on
/// first use and shared between clones (history snapshots, layout
/// simulations, export working copies).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "PristineRepr", into = "PristineRepr")]
pub struct PristineSource {
    bytes: Arc<[u8]>,
    filename: String,
    file_type: String,
    decoded: Arc<OnceLock<Arc<RgbaImage>>>,
}

impl PristineSource {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::from(bytes),
            filename: filename.into(),
            file_type: file_type.into(),
            decoded: Arc::new(OnceLock::new()),
        }
    }

    /// Wrap an already-decoded raster (e.g. generated content) as PNG bytes.
    pub fn from_image(image: RgbaImage, filename: impl Into<String>) -> Result<Self, ExportError> {
        let bytes = RasterHandle::new(image.clone()).to_encoded_bytes(EncodedFormat::Png)?;
        let source = Self::new(bytes, filename, "image/png");
        let _ = source.decoded.set(Arc::new(image));
        Ok(source)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    /// Decode (once) and return the source raster.
    pub fn decode(&self) -> Result<Arc<RgbaImage>, DecodeError> {
        if let Some(img) = self.decoded.get() {
            return Ok(img.clone());
        }
        let img = image::load_from_memory(&self.bytes)
            .map_err(|e| DecodeError::new(self.filename.clone(), e.to_string()))?
            .into_rgba8();
        if img.width() == 0 || img.height() == 0 {
            return Err(DecodeError::new(self.filename.clone(), "image has no pixels"));
        }
        let img = Arc::new(img);
        // A concurrent decode may have won the race; either value is identical.
        let _ = self.decoded.set(img.clone());
        Ok(img)
    }
}

impl PartialEq for PristineSource {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.bytes, &other.bytes) || self.bytes == other.bytes)
            && self.filename == other.filename
            && self.file_type == other.file_type
    }
}

/// On-disk form: bytes as base64 inside the project JSON.
#[derive(Serialize, Deserialize)]
struct PristineRepr {
    filename: String,
    file_type: String,
    data: String,
}

impl From<PristineSource> for PristineRepr {
    fn from(src: PristineSource) -> Self {
        Self {
            data: BASE64.encode(&src.bytes),
            filename: src.filename,
            file_type: src.file_type,
        }
    }
}

impl From<PristineRepr> for PristineSource {
    fn from(repr: PristineRepr) -> Self {
        // Invalid base64 keeps the raw text as bytes; the next bake then reports
        // a DecodeError naming the file instead of failing the whole load.
        let bytes = BASE64
            .decode(repr.data.as_bytes())
            .unwrap_or_else(|_| repr.data.into_bytes());
        Self::new(bytes, repr.filename, repr.file_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn pristine_from_image_decodes_to_same_pixels() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        let src = PristineSource::from_image(img.clone(), "gen.png").unwrap();
        let decoded = src.decode().unwrap();
        assert_eq!(decoded.as_raw(), img.as_raw());
    }

    #[test]
    fn pristine_serde_round_trip_keeps_bytes() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let src = PristineSource::from_image(img, "a.png").unwrap();
        let json = serde_json::to_string(&src).unwrap();
        let back: PristineSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, src);
        assert_eq!(back.decode().unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn undecodable_bytes_report_filename() {
        let src = PristineSource::new(b"not an image".to_vec(), "broken.png", "image/png");
        let err = src.decode().unwrap_err();
        assert_eq!(err.filename, "broken.png");
    }

    #[test]
    fn raster_handle_png_round_trip() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([200, 0, 0, 255]));
        let handle = RasterHandle::new(img);
        let bytes = handle.to_encoded_bytes(EncodedFormat::Png).unwrap();
        let back = image::load_from_memory(&bytes).unwrap().into_rgba8();
        assert_eq!(back.dimensions(), (4, 4));
        assert_eq!(back.get_pixel(1, 1), &Rgba([200, 0, 0, 255]));
    }
}

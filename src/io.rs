#[cfg(test)]
#[path = "io_test.rs"]
mod io_test;

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tiff::decoder::{Decoder as TiffDecoder, DecodingResult};
use tiff::encoder::{Rational, TiffEncoder, colortype, compression::Lzw};
use tiff::tags::ResolutionUnit;

use crate::bake::{DEFAULT_MAX_DIMENSION, bake_with_ceiling};
use crate::components::snapshot::ProjectSnapshot;
use crate::error::{ExportError, ImportError, ProjectError};
use crate::export::{ExportFormat, clamp_dpi, clamp_quality};
use crate::ops::text::FontCache;
use crate::panel::{Panel, PanelEdits};
use crate::project::{Figure, Project};
use crate::raster::{EncodedFormat, PristineSource, RasterHandle};

/// File extensions offered to file pickers and glob expansion.
pub const IMPORT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

pub const DEFAULT_TIFF_CONVERT_THRESHOLD: u64 = 20 * 1024 * 1024;

const METERS_PER_INCH: f64 = 0.0254;

fn mime_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

// ============================================================================
// TIFF CONVERSION
// ============================================================================

/// A TIFF re-encoded as PNG.
#[derive(Debug, Clone)]
pub struct ConvertedTiff {
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Fallback decoder for TIFFs the regular image stack cannot (or should not) read.
pub trait TiffConverter: Send + Sync {
    fn convert(&self, bytes: &[u8], filename: &str) -> Result<ConvertedTiff, ImportError>;
}

/// In-process converter built on the `tiff` crate.
///
/// Reads the first frame. 8-bit samples pass through; wider integer and float
/// samples are stretched to 0..=255 by their global min/max (a flat image
/// becomes black). Grey and RGB are expanded to opaque RGBA.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTiffConverter;

fn stretch_to_u8(samples: &[f64]) -> Vec<u8> {
    let (mn, mx) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if mx <= mn {
        return vec![0; samples.len()];
    }
    let k = 255.0 / (mx - mn);
    samples.iter().map(|&v| ((v - mn) * k).clamp(0.0, 255.0) as u8).collect()
}

fn to_u8_samples(data: DecodingResult) -> Vec<u8> {
    fn widen<T: Copy + Into<f64>>(v: &[T]) -> Vec<f64> {
        v.iter().map(|&x| x.into()).collect()
    }
    match data {
        DecodingResult::U8(v) => v,
        DecodingResult::U16(v) => stretch_to_u8(&widen(&v)),
        DecodingResult::U32(v) => stretch_to_u8(&widen(&v)),
        DecodingResult::U64(v) => stretch_to_u8(&v.iter().map(|&x| x as f64).collect::<Vec<_>>()),
        DecodingResult::I8(v) => stretch_to_u8(&widen(&v)),
        DecodingResult::I16(v) => stretch_to_u8(&widen(&v)),
        DecodingResult::I32(v) => stretch_to_u8(&widen(&v)),
        DecodingResult::I64(v) => stretch_to_u8(&v.iter().map(|&x| x as f64).collect::<Vec<_>>()),
        DecodingResult::F32(v) => stretch_to_u8(&widen(&v)),
        DecodingResult::F64(v) => stretch_to_u8(&v),
    }
}

impl LocalTiffConverter {
    fn decode_first_frame(bytes: &[u8]) -> Result<RgbaImage, String> {
        let mut decoder = TiffDecoder::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
        let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;
        let channels = match decoder.colortype().map_err(|e| e.to_string())? {
            tiff::ColorType::Gray(_) => 1,
            tiff::ColorType::GrayA(_) => 2,
            tiff::ColorType::RGB(_) => 3,
            tiff::ColorType::RGBA(_) => 4,
            other => return Err(format!("unsupported TIFF colour type {:?}", other)),
        };
        let samples = to_u8_samples(decoder.read_image().map_err(|e| e.to_string())?);
        let pixels = width as usize * height as usize;
        if width == 0 || height == 0 || samples.len() < pixels * channels {
            return Err("truncated TIFF image data".to_string());
        }
        let mut rgba = Vec::with_capacity(pixels * 4);
        for px in samples.chunks_exact(channels).take(pixels) {
            match channels {
                1 => rgba.extend_from_slice(&[px[0], px[0], px[0], 255]),
                2 => rgba.extend_from_slice(&[px[0], px[0], px[0], px[1]]),
                3 => rgba.extend_from_slice(&[px[0], px[1], px[2], 255]),
                _ => rgba.extend_from_slice(&px[..4]),
            }
        }
        RgbaImage::from_raw(width, height, rgba).ok_or_else(|| "TIFF buffer size mismatch".to_string())
    }
}

impl TiffConverter for LocalTiffConverter {
    fn convert(&self, bytes: &[u8], filename: &str) -> Result<ConvertedTiff, ImportError> {
        let unsupported = |reason: String| ImportError::Unsupported { filename: filename.to_string(), reason };
        let image = Self::decode_first_frame(bytes).map_err(unsupported)?;
        let (width, height) = image.dimensions();
        let png_bytes = RasterHandle::new(image)
            .to_encoded_bytes(EncodedFormat::Png)
            .map_err(|e| unsupported(e.to_string()))?;
        tracing::debug!(filename, width, height, "converted TIFF to PNG");
        Ok(ConvertedTiff { png_bytes, width, height })
    }
}

// ============================================================================
// UPLOAD BOUNDARY
// ============================================================================

#[derive(Clone)]
pub struct ImportOptions {
    pub converter: Arc<dyn TiffConverter>,
    /// TIFFs larger than this skip the regular decoder.
    pub tiff_convert_threshold_bytes: u64,
    pub max_dimension: u32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            converter: Arc::new(LocalTiffConverter),
            tiff_convert_threshold_bytes: DEFAULT_TIFF_CONVERT_THRESHOLD,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// A validated upload with its first bake.
#[derive(Debug, Clone)]
pub struct ImportedImage {
    pub pristine: PristineSource,
    pub baked: RasterHandle,
    /// MIME type of the file as uploaded (before any conversion).
    pub file_type: String,
}

impl ImportedImage {
    pub fn into_panel(self, order: usize) -> Panel {
        let mut panel = Panel::new(self.pristine, self.baked, order);
        panel.original_file_type = self.file_type;
        panel
    }

    /// Append to `figure`; returns the new panel's id.
    pub fn add_to(self, figure: &mut Figure) -> uuid::Uuid {
        let file_type = self.file_type.clone();
        let id = figure.add_panel(self.pristine, self.baked);
        if let Some(panel) = figure.panel_mut(id) {
            panel.original_file_type = file_type;
        }
        id
    }
}

/// Validate and decode an upload. Anything that is not PNG, JPEG, GIF, BMP,
/// WEBP or TIFF is rejected before it reaches the model.
pub fn import_bytes(bytes: Vec<u8>, filename: &str, opts: &ImportOptions) -> Result<ImportedImage, ImportError> {
    let unsupported = |reason: &str| ImportError::Unsupported {
        filename: filename.to_string(),
        reason: reason.to_string(),
    };
    if bytes.is_empty() {
        return Err(unsupported("file is empty"));
    }
    let format = image::guess_format(&bytes).map_err(|_| unsupported("unrecognised file signature"))?;
    let file_type = mime_for(format).ok_or_else(|| unsupported(&format!("{:?} is not an accepted format", format)))?;

    let pristine = if format == ImageFormat::Tiff {
        let oversized = bytes.len() as u64 > opts.tiff_convert_threshold_bytes;
        let direct = PristineSource::new(bytes.clone(), filename, file_type);
        if !oversized && direct.decode().is_ok() {
            direct
        } else {
            tracing::info!(filename, oversized, "routing TIFF through converter");
            let converted = opts.converter.convert(&bytes, filename)?;
            PristineSource::new(converted.png_bytes, filename, "image/png")
        }
    } else {
        PristineSource::new(bytes, filename, file_type)
    };

    // Neutral edits draw no text, so no font lookup is needed.
    let baked = bake_with_ceiling(&pristine, &PanelEdits::default(), 1.0, &FontCache::offline(), opts.max_dimension)?;
    tracing::debug!(filename, width = baked.width(), height = baked.height(), "imported panel");
    Ok(ImportedImage { pristine, baked, file_type: file_type.to_string() })
}

pub fn import_path(path: &Path, opts: &ImportOptions) -> Result<ImportedImage, ImportError> {
    let bytes = fs::read(path).map_err(|source| ImportError::Io { path: path.to_path_buf(), source })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    import_bytes(bytes, &filename, opts)
}

// ============================================================================
// EXPORT ENCODERS
// ============================================================================

/// Encode a rendered figure with resolution metadata.
///
/// PNG keeps alpha; JPEG and TIFF drop it.
pub fn encode_export(image: &RgbaImage, format: ExportFormat, dpi: u32, quality: u8) -> Result<Vec<u8>, ExportError> {
    let dpi = clamp_dpi(dpi);
    let mut out = Cursor::new(Vec::new());
    match format {
        ExportFormat::Png => {
            let ppm = (dpi as f64 / METERS_PER_INCH).round() as u32;
            let mut encoder = png::Encoder::new(&mut out, image.width(), image.height());
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: png::Unit::Meter,
            }));
            let mut writer = encoder.write_header()?;
            writer.write_image_data(image.as_raw())?;
            writer.finish()?;
        }
        ExportFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, clamp_quality(quality));
            encoder.set_pixel_density(PixelDensity::dpi(dpi.min(u16::MAX as u32) as u16));
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)?;
        }
        ExportFormat::Tiff => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = TiffEncoder::new(&mut out)?;
            let mut tiff_image =
                encoder.new_image_with_compression::<colortype::RGB8, _>(rgb.width(), rgb.height(), Lzw)?;
            tiff_image.resolution(ResolutionUnit::Inch, Rational { n: dpi, d: 1 });
            tiff_image.write_data(rgb.as_raw())?;
        }
        ExportFormat::Pdf => return Err(ExportError::Unsupported("pdf".to_string())),
    }
    Ok(out.into_inner())
}

// ============================================================================
// PROJECT FILES
// ============================================================================

/// Write `project` as snapshot JSON and adopt `path` as its location.
pub fn save_project(project: &mut Project, path: &Path) -> Result<(), ProjectError> {
    let json = ProjectSnapshot::capture(project).to_json()?;
    fs::write(path, json)?;
    project.path = Some(path.to_path_buf());
    project.update_name_from_path();
    project.mark_clean();
    tracing::info!(path = %path.display(), "project saved");
    Ok(())
}

/// Read a project file and re-bake every panel.
pub fn load_project(path: &Path, fonts: &FontCache, max_dimension: u32) -> Result<Project, ProjectError> {
    let json = fs::read_to_string(path)?;
    let snapshot = ProjectSnapshot::from_json(&json)?;
    let mut project = snapshot.into_project(fonts, max_dimension)?;
    project.path = Some(path.to_path_buf());
    project.update_name_from_path();
    tracing::info!(path = %path.display(), panels = snapshot.panel_count(), "project loaded");
    Ok(project)
}

#[cfg(test)]
#[path = "bake_test.rs"]
mod bake_test;

// ============================================================================
// EDIT BAKING: pristine source + edit descriptor → raster at any scale
// ============================================================================
//
// The pipeline is deterministic: the same (source, edits, scale) always
// produces the same pixels, which is what lets undo/redo and project loading
// store recipes instead of images.
//
//   crop (clamped) → resize to crop·scale (ceiling-capped)
//   → brightness/contrast/greyscale → rotate about buffer centre
//   → annotations on their own layer, rotated the same way → composite
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc;

use image::RgbaImage;
use uuid::Uuid;

use crate::error::DecodeError;
use crate::geometry::Point;
use crate::ops::shapes;
use crate::ops::text::{FontCache, TextAlignment, TextBaseline, TextStyle, draw_text};
use crate::ops::transform::{self, Interpolation};
use crate::ops::{adjustments, composite_over};
use crate::panel::{Annotation, CropRect, PanelEdits, parse_color};
use crate::raster::{PristineSource, RasterHandle};

/// Largest side a baked raster may have.
pub const DEFAULT_MAX_DIMENSION: u32 = 4000;

/// Map a point from original-image space into a baked buffer of
/// `out_w`×`out_h` produced from `crop`.
pub fn map_to_output(p: Point, crop: &CropRect, out_w: u32, out_h: u32) -> Point {
    let sx = out_w as f64 / crop.width;
    let sy = out_h as f64 / crop.height;
    Point::new((p.x - crop.x) * sx, (p.y - crop.y) * sy)
}

/// Output size for a crop at `scale`, capped so neither side exceeds `max_dimension`.
pub fn target_size(crop: &CropRect, scale: f64, max_dimension: u32) -> (u32, u32) {
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    let mut w = (crop.width * scale).round().max(1.0);
    let mut h = (crop.height * scale).round().max(1.0);
    let ceiling = max_dimension.max(1) as f64;
    if w > ceiling || h > ceiling {
        let factor = ceiling / w.max(h);
        let (nw, nh) = ((w * factor).round().max(1.0), (h * factor).round().max(1.0));
        tracing::warn!(
            requested_w = w,
            requested_h = h,
            capped_w = nw,
            capped_h = nh,
            "bake target exceeds {} px; downscaling",
            max_dimension
        );
        w = nw;
        h = nh;
    }
    (w as u32, h as u32)
}

/// Bake with the default size ceiling.
pub fn bake(source: &PristineSource, edits: &PanelEdits, scale: f64, fonts: &FontCache) -> Result<RasterHandle, DecodeError> {
    bake_with_ceiling(source, edits, scale, fonts, DEFAULT_MAX_DIMENSION)
}

/// Rasterize `source` with every edit applied at `scale`.
///
/// Never mutates `edits`. A malformed crop is clamped, never rejected; the
/// only failure is an undecodable source.
pub fn bake_with_ceiling(
    source: &PristineSource,
    edits: &PanelEdits,
    scale: f64,
    fonts: &FontCache,
    max_dimension: u32,
) -> Result<RasterHandle, DecodeError> {
    let src = source.decode()?;
    let (src_w, src_h) = src.dimensions();
    let crop = edits
        .crop
        .unwrap_or_else(|| CropRect::full(src_w, src_h))
        .clamped(src_w, src_h);
    let (out_w, out_h) = target_size(&crop, scale, max_dimension);

    let cropped = if crop == CropRect::full(src_w, src_h) {
        None
    } else {
        Some(transform::crop(&src, crop.x as u32, crop.y as u32, crop.width as u32, crop.height as u32))
    };
    let cropped_ref: &RgbaImage = cropped.as_ref().unwrap_or(&*src);
    let factor = out_w as f64 / crop.width;
    let mut image = transform::resize(cropped_ref, out_w, out_h, Interpolation::for_scale(factor));

    if edits.has_filter() {
        adjustments::brightness_contrast_greyscale(&mut image, edits.brightness, edits.contrast, edits.greyscale);
    }

    let rotation = if edits.rotation.is_finite() { edits.rotation } else { 0.0 };
    if rotation != 0.0 {
        image = transform::rotate_about_center(&image, rotation);
    }

    if !edits.annotations.is_empty() {
        let mut layer = RgbaImage::new(out_w, out_h);
        draw_annotations(&mut layer, &edits.annotations, &crop, fonts);
        if rotation != 0.0 {
            layer = transform::rotate_about_center(&layer, rotation);
        }
        composite_over(&mut image, &layer, 0, 0, 1.0);
    }

    tracing::trace!(file = source.filename(), out_w, out_h, "baked panel");
    Ok(RasterHandle::new(image))
}

/// Draw annotations into an output-space layer the size of the baked buffer.
fn draw_annotations(layer: &mut RgbaImage, annotations: &[Annotation], crop: &CropRect, fonts: &FontCache) {
    let (out_w, out_h) = layer.dimensions();
    // Output is crop·factor on both axes up to rounding; average the two.
    let factor = ((out_w as f64 / crop.width) + (out_h as f64 / crop.height)) * 0.5;
    let map = |x: f64, y: f64| map_to_output(Point::new(x, y), crop, out_w, out_h);

    for annotation in annotations {
        let color = parse_color(annotation.color());
        match annotation {
            Annotation::Rect { x1, y1, x2, y2, line_width, .. } => {
                let width = (line_width * factor).max(0.5) as f32;
                shapes::draw_rect_outline(layer, map(*x1, *y1), map(*x2, *y2), width, color);
            }
            Annotation::Arrow { x1, y1, x2, y2, line_width, .. } => {
                let width = (line_width * factor).max(0.5) as f32;
                shapes::draw_arrow(layer, map(*x1, *y1), map(*x2, *y2), width, color);
            }
            Annotation::Text { x, y, text, size, font_family, font_weight, font_style, .. } => {
                let italic = matches!(font_style.to_ascii_lowercase().as_str(), "italic" | "oblique");
                let Some(font) = fonts.resolve(font_family, font_weight, italic) else {
                    continue;
                };
                let anchor = map(*x, *y);
                let style = TextStyle {
                    size: (size * factor) as f32,
                    color,
                    alignment: TextAlignment::Left,
                    baseline: TextBaseline::Alphabetic,
                    italic: false,
                };
                draw_text(layer, &font, text, anchor.x as f32, anchor.y as f32, &style);
            }
        }
    }
}

// ============================================================================
// BAKE QUEUE: generation-keyed background bakes
// ============================================================================

/// One finished background bake.
#[derive(Debug)]
pub struct BakeResult {
    pub panel_id: Uuid,
    pub generation: u64,
    pub result: Result<RasterHandle, DecodeError>,
}

/// Background baker for interactive editing.
///
/// Every [`request`](Self::request) supersedes the previous one for the same
/// panel. Bakes run on the rayon pool; results come back over a channel and
/// anything whose generation is no longer the latest is dropped.
pub struct BakeQueue {
    fonts: Arc<FontCache>,
    max_dimension: u32,
    next_generation: u64,
    latest: HashMap<Uuid, u64>,
    ready: HashMap<Uuid, BakeResult>,
    tx: mpsc::Sender<BakeResult>,
    rx: mpsc::Receiver<BakeResult>,
}

impl BakeQueue {
    pub fn new(fonts: Arc<FontCache>, max_dimension: u32) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            fonts,
            max_dimension,
            next_generation: 0,
            latest: HashMap::new(),
            ready: HashMap::new(),
            tx,
            rx,
        }
    }

    /// Start a bake for `panel_id`; returns its generation.
    pub fn request(&mut self, panel_id: Uuid, source: PristineSource, edits: PanelEdits, scale: f64) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.latest.insert(panel_id, generation);
        self.ready.remove(&panel_id);

        let tx = self.tx.clone();
        let fonts = self.fonts.clone();
        let max_dimension = self.max_dimension;
        rayon::spawn(move || {
            let result = bake_with_ceiling(&source, &edits, scale, &fonts, max_dimension);
            let _ = tx.send(BakeResult { panel_id, generation, result });
        });
        generation
    }

    /// Forget any in-flight bake for `panel_id`; its result will be discarded.
    pub fn cancel(&mut self, panel_id: Uuid) {
        self.latest.remove(&panel_id);
        self.ready.remove(&panel_id);
    }

    /// Whether a bake for `panel_id` has been requested and not yet handed out.
    pub fn is_pending(&self, panel_id: Uuid) -> bool {
        self.latest.contains_key(&panel_id)
    }

    fn accept(&mut self, result: BakeResult) {
        if self.latest.get(&result.panel_id) == Some(&result.generation) {
            self.ready.insert(result.panel_id, result);
        } else {
            tracing::trace!(panel = %result.panel_id, generation = result.generation, "dropping superseded bake");
        }
    }

    /// Non-blocking: every fresh result that has arrived since the last drain.
    pub fn drain(&mut self) -> Vec<BakeResult> {
        while let Ok(result) = self.rx.try_recv() {
            self.accept(result);
        }
        let mut out: Vec<BakeResult> = self.ready.drain().map(|(_, r)| r).collect();
        for r in &out {
            self.latest.remove(&r.panel_id);
        }
        out.sort_by_key(|r| r.generation);
        out
    }

    /// Block until the latest requested bake for `panel_id` finishes.
    /// Returns `None` when nothing is pending for that panel.
    pub fn wait_for(&mut self, panel_id: Uuid) -> Option<Result<RasterHandle, DecodeError>> {
        if !self.latest.contains_key(&panel_id) {
            return None;
        }
        loop {
            if let Some(r) = self.ready.remove(&panel_id) {
                self.latest.remove(&panel_id);
                return Some(r.result);
            }
            // The queue holds a sender, so this only fails if a worker panicked mid-send.
            let result = self.rx.recv().ok()?;
            self.accept(result);
        }
    }
}

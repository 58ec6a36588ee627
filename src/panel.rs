use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Point, Rect};
use crate::layout::grid::MAX_SCAN_ROWS;
use crate::raster::{PristineSource, RasterHandle};

/// Crop box in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    /// Clamp into a `src_w`×`src_h` source. Never fails: non-finite fields
    /// fall back to the full extent and the result is at least 1×1.
    pub fn clamped(&self, src_w: u32, src_h: u32) -> CropRect {
        let sw = src_w.max(1) as f64;
        let sh = src_h.max(1) as f64;
        let finite_or = |v: f64, d: f64| if v.is_finite() { v } else { d };

        let x = finite_or(self.x, 0.0).floor().clamp(0.0, sw - 1.0);
        let y = finite_or(self.y, 0.0).floor().clamp(0.0, sh - 1.0);
        let width = finite_or(self.width, sw).round().clamp(1.0, sw - x);
        let height = finite_or(self.height, sh).round().clamp(1.0, sh - y);
        CropRect { x, y, width, height }
    }
}

/// Grid-cell footprint of a panel in a spanning grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub colspan: u32,
    pub rowspan: u32,
}

impl Default for Span {
    fn default() -> Self {
        Self { colspan: 1, rowspan: 1 }
    }
}

impl Span {
    pub fn new(colspan: u32, rowspan: u32) -> Self {
        Self { colspan, rowspan }
    }

    /// `colspan` into `[1, num_cols]`, `rowspan` into `[1, MAX_SCAN_ROWS]`.
    pub fn clamped(&self, num_cols: u32) -> Span {
        Span {
            colspan: self.colspan.clamp(1, num_cols.max(1)),
            rowspan: self.rowspan.clamp(1, MAX_SCAN_ROWS),
        }
    }
}

/// Free-hand annotation, stored in original-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Annotation {
    Rect {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: String,
        #[serde(rename = "lineWidth")]
        line_width: f64,
    },
    Arrow {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: String,
        #[serde(rename = "lineWidth")]
        line_width: f64,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        color: String,
        size: f64,
        #[serde(rename = "fontFamily", default = "default_font_family")]
        font_family: String,
        #[serde(rename = "fontWeight", default = "default_font_weight")]
        font_weight: String,
        #[serde(rename = "fontStyle", default = "default_font_style")]
        font_style: String,
    },
}

fn default_font_family() -> String {
    "Arial".to_string()
}

fn default_font_weight() -> String {
    "normal".to_string()
}

fn default_font_style() -> String {
    "normal".to_string()
}

impl Annotation {
    pub fn color(&self) -> &str {
        match self {
            Annotation::Rect { color, .. }
            | Annotation::Arrow { color, .. }
            | Annotation::Text { color, .. } => color,
        }
    }

    /// Anchor points in original-image space (endpoints for shapes, origin for text).
    pub fn points(&self) -> Vec<Point> {
        match self {
            Annotation::Rect { x1, y1, x2, y2, .. } | Annotation::Arrow { x1, y1, x2, y2, .. } => {
                vec![Point::new(*x1, *y1), Point::new(*x2, *y2)]
            }
            Annotation::Text { x, y, .. } => vec![Point::new(*x, *y)],
        }
    }
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (and a handful of names) into RGBA.
/// Unknown input draws in opaque red so a bad colour stays visible.
pub fn parse_color(s: &str) -> [u8; 4] {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#').filter(|h| h.is_ascii()) {
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let parsed = match hex.len() {
            3 => nibble(0).zip(nibble(1)).zip(nibble(2)).map(|((r, g), b)| [r, g, b, 255]),
            6 => byte(0).zip(byte(2)).zip(byte(4)).map(|((r, g), b)| [r, g, b, 255]),
            8 => byte(0)
                .zip(byte(2))
                .zip(byte(4))
                .zip(byte(6))
                .map(|(((r, g), b), a)| [r, g, b, a]),
            _ => None,
        };
        if let Some(c) = parsed {
            return c;
        }
    }
    match s.to_ascii_lowercase().as_str() {
        "black" => [0, 0, 0, 255],
        "white" => [255, 255, 255, 255],
        "red" => [255, 0, 0, 255],
        "green" => [0, 128, 0, 255],
        "blue" => [0, 0, 255, 255],
        "yellow" => [255, 255, 0, 255],
        _ => [255, 0, 0, 255],
    }
}

/// Everything the user has done to a panel. Baking recomputes from the
/// pristine source plus this descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelEdits {
    pub crop: Option<CropRect>,
    /// Percent, 100 = unchanged.
    pub brightness: f64,
    /// Percent, 100 = unchanged.
    pub contrast: f64,
    /// Percent, 0 = unchanged.
    pub greyscale: f64,
    /// Degrees, clockwise.
    pub rotation: f64,
    pub annotations: Vec<Annotation>,
    #[serde(rename = "layoutSpan")]
    pub layout_span: Span,
}

impl Default for PanelEdits {
    fn default() -> Self {
        Self {
            crop: None,
            brightness: 100.0,
            contrast: 100.0,
            greyscale: 0.0,
            rotation: 0.0,
            annotations: Vec::new(),
            layout_span: Span::default(),
        }
    }
}

impl PanelEdits {
    pub fn has_filter(&self) -> bool {
        self.brightness != 100.0 || self.contrast != 100.0 || self.greyscale != 0.0
    }
}

/// Free-form placement for the custom layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Layout output. Recomputed on every layout pass; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PanelGeometry {
    /// Outer box including the label strip.
    pub frame: Rect,
    /// Box available to the image after the label reservation.
    pub image_area: Rect,
    pub display_width: f64,
    pub display_height: f64,
    /// Top-left of the drawn image.
    pub image_pos: Point,
    /// Anchor of the label text.
    pub label_pos: Point,
    /// Grid cell (column, row) for spanning-grid layouts.
    pub cell: Option<(u32, u32)>,
}

/// One image element in a figure.
#[derive(Debug, Clone)]
pub struct Panel {
    pub id: Uuid,
    pub label: String,
    pub order: usize,
    pub pristine: PristineSource,
    pub edits: PanelEdits,
    pub baked: Option<RasterHandle>,
    /// Dimensions of the baked image.
    pub original_width: u32,
    pub original_height: u32,
    /// Pre-export-scale dimensions on export working copies.
    pub true_original: Option<(u32, u32)>,
    pub original_file_type: String,
    pub custom: Option<CustomRect>,
    pub geometry: PanelGeometry,
}

impl Panel {
    /// A fresh panel whose baked image is the given raster.
    pub fn new(pristine: PristineSource, baked: RasterHandle, order: usize) -> Self {
        let original_file_type = pristine.file_type().to_string();
        Self {
            id: Uuid::new_v4(),
            label: String::new(),
            order,
            original_width: baked.width(),
            original_height: baked.height(),
            baked: Some(baked),
            pristine,
            edits: PanelEdits::default(),
            true_original: None,
            original_file_type,
            custom: None,
            geometry: PanelGeometry::default(),
        }
    }

    /// Install a new baked image, keeping the cached dimensions in sync.
    pub fn set_baked(&mut self, baked: RasterHandle) {
        self.original_width = baked.width();
        self.original_height = baked.height();
        self.baked = Some(baked);
    }

    /// Dimensions layout math should use: pre-export-scale when known.
    pub fn layout_dimensions(&self) -> (f64, f64) {
        let (w, h) = self
            .true_original
            .unwrap_or((self.original_width, self.original_height));
        (w.max(1) as f64, h.max(1) as f64)
    }

    pub fn aspect_ratio(&self) -> f64 {
        let (w, h) = self.layout_dimensions();
        w / h
    }

    pub fn reset_geometry(&mut self) {
        self.geometry = PanelGeometry::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_clamps_negative_origin_and_oversize() {
        let c = CropRect::new(-10.0, 0.0, 1000.0, 1000.0).clamped(400, 300);
        assert_eq!(c, CropRect::new(0.0, 0.0, 400.0, 300.0));
    }

    #[test]
    fn crop_clamps_non_finite_fields() {
        let c = CropRect::new(f64::NAN, 20.0, f64::INFINITY, 10.0).clamped(100, 50);
        assert_eq!(c, CropRect::new(0.0, 20.0, 100.0, 10.0));
    }

    #[test]
    fn crop_outside_source_keeps_one_pixel() {
        let c = CropRect::new(500.0, 500.0, 10.0, 10.0).clamped(400, 300);
        assert_eq!(c, CropRect::new(399.0, 299.0, 1.0, 1.0));
    }

    #[test]
    fn span_clamps_to_columns() {
        assert_eq!(Span::new(5, 0).clamped(3), Span::new(3, 1));
        assert_eq!(Span::new(0, 4).clamped(2), Span::new(1, 4));
        assert_eq!(Span::new(1, u32::MAX).clamped(2), Span::new(1, MAX_SCAN_ROWS));
    }

    #[test]
    fn parse_color_variants() {
        assert_eq!(parse_color("#ff0000"), [255, 0, 0, 255]);
        assert_eq!(parse_color("#0f0"), [0, 255, 0, 255]);
        assert_eq!(parse_color("#00000080"), [0, 0, 0, 128]);
        assert_eq!(parse_color("white"), [255, 255, 255, 255]);
        assert_eq!(parse_color("not-a-colour"), [255, 0, 0, 255]);
    }

    #[test]
    fn annotation_json_uses_type_tag() {
        let a = Annotation::Arrow { x1: 1.0, y1: 2.0, x2: 3.0, y2: 4.0, color: "#000".into(), line_width: 2.0 };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "arrow");
        assert_eq!(v["lineWidth"], 2.0);
        let back: Annotation = serde_json::from_value(v).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn edits_default_is_neutral() {
        let e = PanelEdits::default();
        assert!(!e.has_filter());
        assert_eq!(e.layout_span, Span::new(1, 1));
    }
}

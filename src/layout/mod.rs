// ============================================================================
// LAYOUT ENGINE: stack, spanning grid and free-form placement
// ============================================================================
//
// Each placement function mutates `Panel::geometry` in place and returns the
// canvas size. All three share the label reservation and fit-within helpers
// below, and all size images from `Panel::layout_dimensions`, which prefers
// pre-export-scale dimensions so export working copies lay out identically.
// ============================================================================

pub mod custom;
pub mod grid;
pub mod scoring;
pub mod stack;

use serde::Serialize;

use crate::geometry::{Point, Rect};
use crate::panel::Panel;
use crate::project::{FigureSettings, LabelPosition, LayoutKind};

/// Screen pixels per millimetre at 96 dpi.
pub const PIXELS_PER_MM: f64 = 3.78;
pub const INCHES_PER_MM: f64 = 1.0 / 25.4;
/// Gap between a label and its image.
pub const DEFAULT_LABEL_SPACING: f64 = 5.0;
/// Average glyph advance as a fraction of the font size.
const LABEL_CHAR_WIDTH: f64 = 0.65;

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutOptions {
    pub canvas_width: f64,
    pub spacing: f64,
    pub label_position: LabelPosition,
    pub label_font_size: f64,
    pub label_spacing: f64,
    pub num_cols: u32,
}

impl LayoutOptions {
    pub fn from_settings(settings: &FigureSettings, canvas_width: f64, num_cols: u32) -> Self {
        Self {
            canvas_width,
            spacing: settings.spacing.max(0.0),
            label_position: settings.label_position,
            label_font_size: settings.label_font_size.max(0.0),
            label_spacing: DEFAULT_LABEL_SPACING,
            num_cols: num_cols.max(1),
        }
    }
}

/// Column and row extents of a spanning grid, for the overlay.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GridLines {
    /// Left edge of each column.
    pub col_x: Vec<f64>,
    pub col_width: f64,
    /// Top edge of each row.
    pub row_y: Vec<f64>,
    pub row_heights: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct LayoutOutcome {
    pub width: f64,
    pub height: f64,
    pub grid: Option<GridLines>,
}

/// Canvas-level summary used by reports and the CLI.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayoutReport {
    pub width_mm: f64,
    pub height_mm: f64,
    pub min_dpi: f64,
    pub chosen: LayoutKind,
}

/// Approximate rendered width of a label.
pub fn label_width(label: &str, font_size: f64) -> f64 {
    label.chars().count() as f64 * LABEL_CHAR_WIDTH * font_size
}

/// Space taken by the label strip: `(left, top)`.
pub fn label_reservation(label: &str, opts: &LayoutOptions) -> (f64, f64) {
    match opts.label_position {
        LabelPosition::Top => (0.0, opts.label_font_size + opts.label_spacing),
        LabelPosition::Left => (label_width(label, opts.label_font_size) + opts.label_spacing, 0.0),
    }
}

/// Contain-fit a `src_w`×`src_h` image into `area`, centred.
/// Returns the drawn size and its top-left corner.
pub fn fit_within(src_w: f64, src_h: f64, area: Rect) -> (f64, f64, Point) {
    if src_w <= 0.0 || src_h <= 0.0 || area.width <= 0.0 || area.height <= 0.0 {
        return (0.0, 0.0, Point::new(area.x, area.y));
    }
    let scale = (area.width / src_w).min(area.height / src_h);
    let w = src_w * scale;
    let h = src_h * scale;
    let pos = Point::new(area.x + (area.width - w) * 0.5, area.y + (area.height - h) * 0.5);
    (w, h, pos)
}

/// Fill in a panel's geometry for a settled frame.
pub(crate) fn place_in_frame(panel: &mut Panel, frame: Rect, opts: &LayoutOptions) {
    let (left, top) = label_reservation(&panel.label, opts);
    let image_area = Rect::new(
        frame.x + left,
        frame.y + top,
        (frame.width - left).max(0.0),
        (frame.height - top).max(0.0),
    );
    let (src_w, src_h) = panel.layout_dimensions();
    let (w, h, pos) = fit_within(src_w, src_h, image_area);

    let g = &mut panel.geometry;
    g.frame = frame;
    g.image_area = image_area;
    g.display_width = w;
    g.display_height = h;
    g.image_pos = pos;
    g.label_pos = match opts.label_position {
        LabelPosition::Top => Point::new(frame.x, frame.y),
        LabelPosition::Left => Point::new(frame.x, frame.y + frame.height * 0.5),
    };
}

/// Frame height a panel needs when its frame is `frame_width` wide and the
/// image fills the width.
pub(crate) fn natural_frame_height(panel: &Panel, frame_width: f64, opts: &LayoutOptions) -> f64 {
    let (left, top) = label_reservation(&panel.label, opts);
    let (src_w, src_h) = panel.layout_dimensions();
    let image_w = (frame_width - left).max(0.0);
    top + image_w * src_h / src_w
}

/// Run the placement algorithm for `kind`.
pub fn run_layout(kind: LayoutKind, panels: &mut [Panel], opts: &LayoutOptions) -> LayoutOutcome {
    match kind {
        LayoutKind::Stack => stack::layout(panels, opts),
        LayoutKind::Grid2x2 | LayoutKind::Grid3x3 | LayoutKind::Grid4xn => {
            let cols = kind.num_cols().unwrap_or(opts.num_cols);
            grid::layout(panels, &LayoutOptions { num_cols: cols, ..opts.clone() })
        }
        LayoutKind::Custom => custom::layout(panels, opts),
    }
}

/// Smallest effective print resolution across panels, given the canvas is
/// printed at its mm size.
pub fn min_dpi(panels: &[Panel]) -> f64 {
    panels
        .iter()
        .filter(|p| p.geometry.display_width > 0.0)
        .map(|p| {
            let inches = (p.geometry.display_width / PIXELS_PER_MM) * INCHES_PER_MM;
            p.layout_dimensions().0 / inches
        })
        .fold(f64::INFINITY, f64::min)
}

pub fn report(kind: LayoutKind, panels: &[Panel], outcome: &LayoutOutcome) -> LayoutReport {
    let dpi = min_dpi(panels);
    LayoutReport {
        width_mm: outcome.width / PIXELS_PER_MM,
        height_mm: outcome.height / PIXELS_PER_MM,
        min_dpi: if dpi.is_finite() { dpi } else { 0.0 },
        chosen: kind,
    }
}

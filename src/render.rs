// ============================================================================
// FIGURE RENDERER: background, panels, labels, overlay and drag feedback
// ============================================================================

use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::geometry::{Point, Rect};
use crate::layout::LayoutOutcome;
use crate::ops::shapes::{self, Dash};
use crate::ops::text::{FontCache, TextAlignment, TextBaseline, TextStyle, draw_text};
use crate::ops::transform::{self, Interpolation};
use crate::ops::composite_over;
use crate::panel::{Panel, parse_color};
use crate::project::{Figure, GridStyle, LabelPosition, LineStyle};

/// Largest canvas side the renderer will allocate.
pub const MAX_CANVAS_SIDE: f64 = 30_000.0;

/// Screen-only grid overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct GridOverlay {
    pub line_style: LineStyle,
    pub color: [u8; 4],
    pub thickness: f32,
}

impl From<&GridStyle> for GridOverlay {
    fn from(style: &GridStyle) -> Self {
        Self {
            line_style: style.line_style,
            color: parse_color(&style.color),
            thickness: style.thickness.max(0.5) as f32,
        }
    }
}

/// Drag-and-drop state to visualise.
#[derive(Clone, Debug, PartialEq)]
pub struct DragFeedback {
    pub dragged: Uuid,
    /// Pointer displacement since the drag started, in model pixels.
    pub delta: Point,
    pub swap_target: Option<Uuid>,
    pub highlight: [u8; 4],
}

#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Output pixels per model pixel.
    pub scale: f64,
    pub overlay: Option<GridOverlay>,
    pub feedback: Option<DragFeedback>,
    pub background: [u8; 4],
}

impl RenderOptions {
    /// Screen rendering for `figure`: overlay when the figure asks for one.
    pub fn screen(figure: &Figure) -> Self {
        Self {
            scale: 1.0,
            overlay: figure
                .settings
                .show_grid
                .then(|| GridOverlay::from(&figure.settings.grid_style)),
            feedback: None,
            background: parse_color(&figure.settings.background),
        }
    }

    /// Export rendering: no overlay, no feedback.
    pub fn export(figure: &Figure, scale: f64) -> Self {
        Self {
            scale,
            overlay: None,
            feedback: None,
            background: parse_color(&figure.settings.background),
        }
    }
}

fn dash_for(style: LineStyle, thickness: f32) -> Dash {
    let t = thickness.max(1.0);
    match style {
        LineStyle::Solid => Dash::Solid,
        LineStyle::Dashed => Dash::Pattern { on: 6.0 * t, off: 4.0 * t },
        LineStyle::Dotted => Dash::Pattern { on: t, off: 2.0 * t },
    }
}

/// Largest scale not above `scale` at which `outcome` fits the canvas side limit.
pub fn fit_scale(outcome: &LayoutOutcome, scale: f64) -> f64 {
    let longest = outcome.width.max(outcome.height) * scale;
    if longest > MAX_CANVAS_SIDE { scale * MAX_CANVAS_SIDE / longest } else { scale }
}

/// Paint `figure` (already laid out into `outcome`) at `opts.scale`.
///
/// A canvas longer than `MAX_CANVAS_SIDE` is rendered whole at a reduced scale.
pub fn render_figure(figure: &Figure, outcome: &LayoutOutcome, opts: &RenderOptions, fonts: &FontCache) -> RgbaImage {
    let requested = if opts.scale.is_finite() && opts.scale > 0.0 { opts.scale } else { 1.0 };
    let scale = fit_scale(outcome, requested);
    if scale < requested {
        tracing::warn!(requested, applied = scale, max_side = MAX_CANVAS_SIDE, "canvas too large; rendering at reduced scale");
    }
    // Absorb float noise so an exact fit does not gain a pixel.
    let w = (outcome.width * scale - 1e-6).ceil().clamp(1.0, MAX_CANVAS_SIDE) as u32;
    let h = (outcome.height * scale - 1e-6).ceil().clamp(1.0, MAX_CANVAS_SIDE) as u32;
    let mut canvas = RgbaImage::from_pixel(w, h, Rgba(opts.background));

    let dragged = opts.feedback.as_ref().map(|f| f.dragged);
    let mut panels: Vec<&Panel> = figure.panels.iter().collect();
    panels.sort_by_key(|p| p.order);

    for panel in &panels {
        if Some(panel.id) == dragged {
            continue;
        }
        draw_panel_image(&mut canvas, panel, scale, Point::default(), 1.0);
    }

    draw_labels(&mut canvas, figure, &panels, scale, fonts);

    if let Some(overlay) = &opts.overlay {
        draw_overlay(&mut canvas, figure, &panels, outcome, overlay, scale);
    }

    if let Some(feedback) = &opts.feedback {
        if let Some(target) = feedback.swap_target.and_then(|id| figure.panel(id)) {
            shapes::draw_rect_dashed(
                &mut canvas,
                target.geometry.frame.scaled(scale),
                (3.0 * scale) as f32,
                feedback.highlight,
                Dash::Solid,
            );
        }
        if let Some(panel) = figure.panel(feedback.dragged) {
            draw_panel_image(&mut canvas, panel, scale, feedback.delta, 0.5);
        }
    }
    canvas
}

fn draw_panel_image(canvas: &mut RgbaImage, panel: &Panel, scale: f64, delta: Point, opacity: f32) {
    let Some(baked) = &panel.baked else { return };
    let g = &panel.geometry;
    if g.display_width <= 0.0 || g.display_height <= 0.0 {
        return;
    }
    let tw = (g.display_width * scale).round().max(1.0) as u32;
    let th = (g.display_height * scale).round().max(1.0) as u32;
    let x = ((g.image_pos.x + delta.x) * scale).round() as i64;
    let y = ((g.image_pos.y + delta.y) * scale).round() as i64;

    let factor = tw as f64 / baked.width().max(1) as f64;
    if baked.width() == tw && baked.height() == th {
        composite_over(canvas, baked.image(), x, y, opacity);
    } else {
        let sized = transform::resize(baked.image(), tw, th, Interpolation::for_scale(factor));
        composite_over(canvas, &sized, x, y, opacity);
    }
}

fn draw_labels(canvas: &mut RgbaImage, figure: &Figure, panels: &[&Panel], scale: f64, fonts: &FontCache) {
    let settings = &figure.settings;
    let Some(font) = fonts.resolve(&settings.label_font_family, &settings.label_font_weight, false) else {
        return;
    };
    let baseline = match settings.label_position {
        LabelPosition::Top => TextBaseline::Top,
        LabelPosition::Left => TextBaseline::Middle,
    };
    let style = TextStyle {
        size: (settings.label_font_size * scale) as f32,
        color: [0, 0, 0, 255],
        alignment: TextAlignment::Left,
        baseline,
        italic: false,
    };
    for panel in panels {
        if panel.label.is_empty() {
            continue;
        }
        let pos = panel.geometry.label_pos;
        draw_text(canvas, &font, &panel.label, (pos.x * scale) as f32, (pos.y * scale) as f32, &style);
    }
}

fn draw_overlay(
    canvas: &mut RgbaImage,
    figure: &Figure,
    panels: &[&Panel],
    outcome: &LayoutOutcome,
    overlay: &GridOverlay,
    scale: f64,
) {
    let thickness = (overlay.thickness as f64 * scale) as f32;
    let dash = dash_for(overlay.line_style, thickness);
    let color = overlay.color;
    let faint = [color[0], color[1], color[2], (color[3] as u16 * 2 / 3) as u8];

    for panel in panels {
        shapes::draw_rect_dashed(canvas, panel.geometry.frame.scaled(scale), thickness, color, dash);
        // label strip boundary
        let area = panel.geometry.image_area.scaled(scale);
        let frame = panel.geometry.frame.scaled(scale);
        match figure.settings.label_position {
            LabelPosition::Top => shapes::draw_line(
                canvas,
                Point::new(frame.x, area.y),
                Point::new(frame.right(), area.y),
                thickness,
                faint,
                dash,
            ),
            LabelPosition::Left => shapes::draw_line(
                canvas,
                Point::new(area.x, frame.y),
                Point::new(area.x, frame.bottom()),
                thickness,
                faint,
                dash,
            ),
        }
    }

    let Some(grid) = &outcome.grid else { return };
    let gap = if grid.col_x.len() > 1 { grid.col_x[1] - grid.col_x[0] - grid.col_width } else { 0.0 };
    let bounds = Rect::new(0.0, 0.0, outcome.width, outcome.height).scaled(scale);
    for x in grid.col_x.iter().skip(1) {
        let sx = (x - gap * 0.5) * scale;
        shapes::draw_line(canvas, Point::new(sx, bounds.y), Point::new(sx, bounds.bottom()), thickness, color, dash);
    }
    for y in grid.row_y.iter().skip(1) {
        let sy = (y - gap * 0.5) * scale;
        shapes::draw_line(canvas, Point::new(bounds.x, sy), Point::new(bounds.right(), sy), thickness, color, dash);
    }
}

/// Small preview of a laid-out figure, longest side at most `max_side`.
pub fn render_thumbnail(figure: &Figure, outcome: &LayoutOutcome, max_side: u32, fonts: &FontCache) -> RgbaImage {
    let longest = outcome.width.max(outcome.height).max(1.0);
    let scale = (max_side.max(1) as f64 / longest).min(1.0);
    let opts = RenderOptions {
        scale,
        overlay: None,
        feedback: None,
        background: parse_color(&figure.settings.background),
    };
    render_figure(figure, outcome, &opts, fonts)
}

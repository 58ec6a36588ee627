// ============================================================================
// SHAPE RASTERIZATION: SDF strokes for annotations and overlay lines
// ============================================================================
//
// Every primitive is a signed-distance function evaluated per pixel over its
// bounding box; coverage comes from a one-pixel smoothstep so edges are
// anti-aliased at any scale. Rows are rasterized in parallel.
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use super::blend_over;
use crate::geometry::{Point, Rect};

/// Stroke pattern along a segment, in output pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dash {
    Solid,
    /// `on` pixels drawn, then `off` pixels skipped.
    Pattern { on: f32, off: f32 },
}

/// SDF for distance to a line segment. Degenerate segments measure to `a`.
#[inline]
fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> (f32, f32) {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    (((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt(), t * len_sq.sqrt())
}

/// SDF for a triangle (negative inside).
fn sdf_triangle(px: f32, py: f32, v: &[(f32, f32); 3]) -> f32 {
    let mut d = f32::MAX;
    let mut inside = true;
    // Winding-independent: inside when all edge cross products share a sign.
    let mut sign = 0.0f32;
    for i in 0..3 {
        let (ax, ay) = v[i];
        let (bx, by) = v[(i + 1) % 3];
        d = d.min(sdf_line_segment(px, py, ax, ay, bx, by).0);
        let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
        if cross != 0.0 {
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                inside = false;
            }
        }
    }
    if inside { -d } else { d }
}

/// Smoothstep between edge0 and edge1.
#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Evaluate `coverage(px, py)` over the clipped box and blend `color` in.
fn rasterize_region<F>(img: &mut RgbaImage, min: (f32, f32), max: (f32, f32), color: [u8; 4], coverage: F)
where
    F: Fn(f32, f32) -> f32 + Sync,
{
    let w = img.width() as i32;
    let h = img.height() as i32;
    if !(min.0.is_finite() && min.1.is_finite() && max.0.is_finite() && max.1.is_finite()) {
        return;
    }
    let x0 = (min.0.floor() as i32).max(0);
    let y0 = (min.1.floor() as i32).max(0);
    let x1 = (max.0.ceil() as i32).min(w);
    let y1 = (max.1.ceil() as i32).min(h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let row_bytes = w as usize * 4;
    img.as_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(row, row_buf)| {
            let py = row as f32 + 0.5;
            for col in x0..x1 {
                let px = col as f32 + 0.5;
                let cov = coverage(px, py);
                if cov > 0.001 {
                    let i = col as usize * 4;
                    blend_over(&mut row_buf[i..i + 4], color, cov);
                }
            }
        });
}

/// Stroke the segment `a`→`b` with round caps.
pub fn draw_line(img: &mut RgbaImage, a: Point, b: Point, width: f32, color: [u8; 4], dash: Dash) {
    let half = (width * 0.5).max(0.5);
    let (ax, ay, bx, by) = (a.x as f32, a.y as f32, b.x as f32, b.y as f32);
    let pad = half + 2.0;
    let min = (ax.min(bx) - pad, ay.min(by) - pad);
    let max = (ax.max(bx) + pad, ay.max(by) + pad);

    rasterize_region(img, min, max, color, |px, py| {
        let (d, along) = sdf_line_segment(px, py, ax, ay, bx, by);
        if let Dash::Pattern { on, off } = dash {
            let period = on + off;
            if period > 0.0 && along.rem_euclid(period) >= on {
                return 0.0;
            }
        }
        smoothstep(0.5, -0.5, d - half)
    });
}

/// Outline an axis-aligned rectangle given by two opposite corners.
/// The stroke is centred on the rectangle's edge.
pub fn draw_rect_outline(img: &mut RgbaImage, p1: Point, p2: Point, width: f32, color: [u8; 4]) {
    let half = (width * 0.5).max(0.5);
    let x0 = p1.x.min(p2.x) as f32;
    let y0 = p1.y.min(p2.y) as f32;
    let x1 = p1.x.max(p2.x) as f32;
    let y1 = p1.y.max(p2.y) as f32;
    let hx = (x1 - x0) * 0.5;
    let hy = (y1 - y0) * 0.5;
    let cx = x0 + hx;
    let cy = y0 + hy;
    let pad = half + 2.0;

    rasterize_region(img, (x0 - pad, y0 - pad), (x1 + pad, y1 + pad), color, |px, py| {
        // Box SDF, then the band |d| < half is the outline.
        let qx = (px - cx).abs() - hx;
        let qy = (py - cy).abs() - hy;
        let outside = (qx.max(0.0) * qx.max(0.0) + qy.max(0.0) * qy.max(0.0)).sqrt();
        let inside = qx.max(qy).min(0.0);
        let d = outside + inside;
        smoothstep(0.5, -0.5, d.abs() - half)
    });
}

/// Rect outline in overlay form (dashed/dotted allowed): four independent segments.
pub fn draw_rect_dashed(img: &mut RgbaImage, rect: Rect, width: f32, color: [u8; 4], dash: Dash) {
    let tl = Point::new(rect.x, rect.y);
    let tr = Point::new(rect.right(), rect.y);
    let br = Point::new(rect.right(), rect.bottom());
    let bl = Point::new(rect.x, rect.bottom());
    for (a, b) in [(tl, tr), (tr, br), (br, bl), (bl, tl)] {
        draw_line(img, a, b, width, color, dash);
    }
}

/// Head length for an arrow stroked at `width`.
pub fn arrow_head_length(width: f32) -> f32 {
    (width * 4.0).max(8.0)
}

/// Arrow from `from` to `to`: a shaft plus a filled triangular head at `to`.
pub fn draw_arrow(img: &mut RgbaImage, from: Point, to: Point, width: f32, color: [u8; 4]) {
    let dx = (to.x - from.x) as f32;
    let dy = (to.y - from.y) as f32;
    let len = (dx * dx + dy * dy).sqrt();
    if len <= 0.0 {
        return;
    }
    let head = arrow_head_length(width).min(len);
    let (ux, uy) = (dx / len, dy / len);
    let (tx, ty) = (to.x as f32, to.y as f32);
    let base = (tx - ux * head, ty - uy * head);

    // Shaft stops inside the head so the tip stays sharp.
    let shaft_end = Point::new((base.0 + ux * head * 0.5) as f64, (base.1 + uy * head * 0.5) as f64);
    draw_line(img, from, shaft_end, width, color, Dash::Solid);

    // 30° half-angle head
    let spread = head * (std::f32::consts::PI / 6.0).tan();
    let (nx, ny) = (-uy, ux);
    let tri = [
        (tx, ty),
        (base.0 + nx * spread, base.1 + ny * spread),
        (base.0 - nx * spread, base.1 - ny * spread),
    ];
    let min = (
        tri.iter().map(|v| v.0).fold(f32::MAX, f32::min) - 2.0,
        tri.iter().map(|v| v.1).fold(f32::MAX, f32::min) - 2.0,
    );
    let max = (
        tri.iter().map(|v| v.0).fold(f32::MIN, f32::max) + 2.0,
        tri.iter().map(|v| v.1).fold(f32::MIN, f32::max) + 2.0,
    );
    rasterize_region(img, min, max, color, |px, py| smoothstep(0.5, -0.5, sdf_triangle(px, py, &tri)));
}

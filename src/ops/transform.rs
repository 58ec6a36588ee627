// ============================================================================
// TRANSFORM OPERATIONS: crop, resize, rotate about the buffer centre
// ============================================================================

use image::{RgbaImage, imageops};
use rayon::prelude::*;

use crate::geometry::Point;

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest  => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic  => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }

    /// Upscales stay soft (bilinear); downscales use a wider kernel to avoid aliasing.
    pub fn for_scale(factor: f64) -> Interpolation {
        if factor < 0.999 { Interpolation::Bicubic } else { Interpolation::Bilinear }
    }
}

/// Copy out an integer pixel region. The caller guarantees it lies inside `src`.
pub fn crop(src: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> RgbaImage {
    imageops::crop_imm(src, x, y, w, h).to_image()
}

/// Resize to exactly `w`×`h` (each at least 1). Same-size requests return a copy.
pub fn resize(src: &RgbaImage, w: u32, h: u32, interp: Interpolation) -> RgbaImage {
    let w = w.max(1);
    let h = h.max(1);
    if src.dimensions() == (w, h) {
        return src.clone();
    }
    imageops::resize(src, w, h, interp.to_filter())
}

/// Rotate a point clockwise by `degrees` about `center` (y axis pointing down).
pub fn rotate_point(p: Point, center: Point, degrees: f64) -> Point {
    let (s, c) = degrees.to_radians().sin_cos();
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    Point::new(center.x + dx * c - dy * s, center.y + dx * s + dy * c)
}

/// Rotate an image clockwise by `degrees` about its own centre, keeping the
/// buffer size. Content rotated out of the buffer is clipped; uncovered
/// corners become transparent. Bilinear sampling against a transparent border.
pub fn rotate_about_center(src: &RgbaImage, degrees: f64) -> RgbaImage {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        return src.clone();
    }

    let w = src.width();
    let h = src.height();
    let mut dst = RgbaImage::new(w, h);
    if w == 0 || h == 0 {
        return dst;
    }

    let cx = w as f32 * 0.5;
    let cy = h as f32 * 0.5;
    // Inverse mapping: sample the source at R(-θ)·(dst − c) + c.
    let (sin, cos) = (normalized as f32).to_radians().sin_cos();

    let src_w = w as i32;
    let src_h = h as i32;
    let src_stride = w as usize * 4;
    let src_raw = src.as_raw();
    let row_bytes = w as usize * 4;

    dst.as_mut().par_chunks_mut(row_bytes).enumerate().for_each(|(dy, row)| {
        let py = dy as f32 + 0.5 - cy;
        for dx in 0..w as usize {
            let px = dx as f32 + 0.5 - cx;
            let src_x = px * cos + py * sin + cx - 0.5;
            let src_y = -px * sin + py * cos + cy - 0.5;

            let x0 = src_x.floor() as i32;
            let y0 = src_y.floor() as i32;
            if x0 < -1 || y0 < -1 || x0 >= src_w || y0 >= src_h {
                continue;
            }
            let fx = src_x - x0 as f32;
            let fy = src_y - y0 as f32;

            let sample = |sx: i32, sy: i32| -> [f32; 4] {
                if sx < 0 || sy < 0 || sx >= src_w || sy >= src_h {
                    [0.0; 4]
                } else {
                    let idx = sy as usize * src_stride + sx as usize * 4;
                    [
                        src_raw[idx]     as f32,
                        src_raw[idx + 1] as f32,
                        src_raw[idx + 2] as f32,
                        src_raw[idx + 3] as f32,
                    ]
                }
            };

            let tl = sample(x0, y0);
            let tr = sample(x0 + 1, y0);
            let bl = sample(x0, y0 + 1);
            let br = sample(x0 + 1, y0 + 1);

            // Interpolate premultiplied so transparent neighbours do not darken edges.
            let pm = |p: [f32; 4]| [p[0] * p[3], p[1] * p[3], p[2] * p[3], p[3]];
            let (tl, tr, bl, br) = (pm(tl), pm(tr), pm(bl), pm(br));
            let mut out = [0.0f32; 4];
            for c in 0..4 {
                let top = tl[c] + (tr[c] - tl[c]) * fx;
                let bot = bl[c] + (br[c] - bl[c]) * fx;
                out[c] = top + (bot - top) * fy;
            }
            let a = out[3];
            if a <= 0.0 {
                continue;
            }
            let i = dx * 4;
            row[i]     = (out[0] / a).round().clamp(0.0, 255.0) as u8;
            row[i + 1] = (out[1] / a).round().clamp(0.0, 255.0) as u8;
            row[i + 2] = (out[2] / a).round().clamp(0.0, 255.0) as u8;
            row[i + 3] = a.round().clamp(0.0, 255.0) as u8;
        }
    });
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::gradient_image;
    use image::Rgba;

    #[test]
    fn zero_rotation_is_identity() {
        let img = gradient_image(7, 5);
        assert_eq!(rotate_about_center(&img, 0.0).as_raw(), img.as_raw());
        assert_eq!(rotate_about_center(&img, 360.0).as_raw(), img.as_raw());
    }

    #[test]
    fn quarter_turn_on_square_moves_corner_clockwise() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let out = rotate_about_center(&img, 90.0);
        // top-left ends up top-right under a clockwise turn
        assert_eq!(out.get_pixel(3, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn rotation_keeps_buffer_size_and_clears_corners() {
        let img = RgbaImage::from_pixel(20, 10, Rgba([255, 255, 255, 255]));
        let out = rotate_about_center(&img, 45.0);
        assert_eq!(out.dimensions(), (20, 10));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(10, 5)[3], 255);
    }

    #[test]
    fn rotate_point_matches_image_rotation() {
        let c = Point::new(2.0, 2.0);
        let p = rotate_point(Point::new(0.0, 0.0), c, 90.0);
        assert!((p.x - 4.0).abs() < 1e-9);
        assert!((p.y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn resize_same_size_is_copy() {
        let img = gradient_image(3, 3);
        assert_eq!(resize(&img, 3, 3, Interpolation::Bilinear).as_raw(), img.as_raw());
        assert_eq!(resize(&img, 6, 0, Interpolation::Bilinear).dimensions(), (6, 1));
    }
}

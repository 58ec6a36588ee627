// ============================================================================
// ADJUSTMENT OPERATIONS: brightness / contrast / greyscale compositing filter
// ============================================================================
//
// Matches the browser's `filter: brightness(b%) contrast(c%) grayscale(g%)`
// chain: each stage works on normalised channels and clamps before the next.
// Alpha is never touched. Rows are processed in parallel via rayon.
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

/// Apply a per-pixel transform in place.
/// `transform` receives (r, g, b) in 0..1 and returns the new (r, g, b).
fn apply_pixel_transform<F>(img: &mut RgbaImage, transform: F)
where
    F: Fn(f32, f32, f32) -> (f32, f32, f32) + Sync,
{
    let w = img.width() as usize;
    if w == 0 || img.height() == 0 {
        return;
    }
    let stride = w * 4;
    img.as_mut().par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            if px[3] == 0 {
                continue;
            }
            let (r, g, b) = transform(
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            );
            px[0] = (r * 255.0).round().clamp(0.0, 255.0) as u8;
            px[1] = (g * 255.0).round().clamp(0.0, 255.0) as u8;
            px[2] = (b * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    });
}

/// Brightness / contrast / greyscale, all in percent.
/// `brightness` and `contrast` are neutral at 100, `greyscale` at 0.
pub fn brightness_contrast_greyscale(img: &mut RgbaImage, brightness: f64, contrast: f64, greyscale: f64) {
    let b = (brightness / 100.0).max(0.0) as f32;
    let c = (contrast / 100.0).max(0.0) as f32;
    let g = (greyscale / 100.0).clamp(0.0, 1.0) as f32;
    if b == 1.0 && c == 1.0 && g == 0.0 {
        return;
    }
    apply_pixel_transform(img, move |r, gr, bl| {
        let stage = |v: f32| {
            let v = (v * b).clamp(0.0, 1.0);
            ((v - 0.5) * c + 0.5).clamp(0.0, 1.0)
        };
        let (r, gr, bl) = (stage(r), stage(gr), stage(bl));
        if g == 0.0 {
            return (r, gr, bl);
        }
        let luma = 0.2126 * r + 0.7152 * gr + 0.0722 * bl;
        (
            r + (luma - r) * g,
            gr + (luma - gr) * g,
            bl + (luma - bl) * g,
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn neutral_values_leave_pixels_untouched() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([12, 200, 77, 255]));
        brightness_contrast_greyscale(&mut img, 100.0, 100.0, 0.0);
        assert_eq!(img.get_pixel(0, 0), &Rgba([12, 200, 77, 255]));
    }

    #[test]
    fn brightness_scales_channels() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([100, 50, 200, 255]));
        brightness_contrast_greyscale(&mut img, 50.0, 100.0, 0.0);
        assert_eq!(img.get_pixel(0, 0), &Rgba([50, 25, 100, 255]));
    }

    #[test]
    fn zero_contrast_is_mid_grey() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([0, 255, 30, 200]));
        brightness_contrast_greyscale(&mut img, 100.0, 0.0, 0.0);
        assert_eq!(img.get_pixel(0, 0), &Rgba([128, 128, 128, 200]));
    }

    #[test]
    fn full_greyscale_equalises_channels() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        brightness_contrast_greyscale(&mut img, 100.0, 100.0, 100.0);
        let p = img.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(p[0], 54); // 0.2126 * 255
    }
}

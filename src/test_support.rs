//! Fixtures shared by the unit tests.

use ab_glyph::FontArc;
use image::{Rgba, RgbaImage};

use crate::ops::text::FontCache;
use crate::panel::Panel;
use crate::project::Figure;
use crate::raster::{PristineSource, RasterHandle};

pub fn solid_image(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(color))
}

/// Image whose pixels all differ, so crops and rotations are observable.
pub fn gradient_image(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        Rgba([
            (x * 255 / w.max(1)) as u8,
            (y * 255 / h.max(1)) as u8,
            ((x + y) % 256) as u8,
            255,
        ])
    })
}

pub fn pristine(img: RgbaImage, name: &str) -> PristineSource {
    PristineSource::from_image(img, name).expect("png encode")
}

pub fn panel(w: u32, h: u32) -> Panel {
    let img = solid_image(w, h, [120, 130, 140, 255]);
    Panel::new(pristine(img.clone(), "panel.png"), RasterHandle::new(img), 0)
}

/// Figure with `n` panels of `w`×`h`.
pub fn figure_with(n: usize, w: u32, h: u32) -> Figure {
    let mut fig = Figure::new("Figure 1");
    for i in 0..n {
        let img = solid_image(w, h, [(i * 20 % 256) as u8, 100, 150, 255]);
        fig.add_panel(pristine(img.clone(), &format!("p{}.png", i)), RasterHandle::new(img));
    }
    fig
}

/// Figure whose panels have the given sizes, in order.
pub fn figure_with_sizes(sizes: &[(u32, u32)]) -> Figure {
    let mut fig = Figure::new("Figure 1");
    for (i, &(w, h)) in sizes.iter().enumerate() {
        let img = solid_image(w, h, [50, (i * 30 % 256) as u8, 200, 255]);
        fig.add_panel(pristine(img.clone(), &format!("p{}.png", i)), RasterHandle::new(img));
    }
    fig
}

/// Font cache that always resolves to a bundled monospace face.
pub fn fixture_fonts() -> FontCache {
    static BYTES: &[u8] = include_bytes!("../tests/fixtures/DejaVuSansMono.ttf");
    let font = FontArc::try_from_slice(BYTES).expect("bundled font parses");
    FontCache::offline().with_fallback(font)
}

/// Pixels whose colour is close to `color`.
pub fn count_near(img: &RgbaImage, color: [u8; 3], tolerance: u8) -> usize {
    img.pixels()
        .filter(|p| (0..3).all(|i| p.0[i].abs_diff(color[i]) <= tolerance))
        .count()
}

/// Bounding box `(min_x, min_y, max_x, max_y)` of pixels close to `color`.
pub fn bounds_near(img: &RgbaImage, color: [u8; 3], tolerance: u8) -> Option<(u32, u32, u32, u32)> {
    img.enumerate_pixels()
        .filter(|(_, _, p)| (0..3).all(|i| p.0[i].abs_diff(color[i]) <= tolerance))
        .fold(None, |acc, (x, y, _)| match acc {
            None => Some((x, y, x, y)),
            Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
        })
}

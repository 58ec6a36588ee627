// ============================================================================
// PIXEL OPERATIONS: filters, transforms, shape and text rasterization
// ============================================================================

pub mod adjustments;
pub mod shapes;
pub mod text;
pub mod transform;

use image::RgbaImage;
use rayon::prelude::*;

/// Source-over blend of one straight-alpha colour into a pixel slice,
/// with `coverage` (0..1) multiplying the source alpha.
#[inline]
pub fn blend_over(dst: &mut [u8], src: [u8; 4], coverage: f32) {
    let sa = (src[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let s = src[c] as f32;
        let d = dst[c] as f32;
        dst[c] = ((s * sa + d * da * (1.0 - sa)) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Composite `src` over `dst` with its top-left at (`dx`, `dy`).
/// `opacity` scales the source alpha; pixels outside `dst` are dropped.
pub fn composite_over(dst: &mut RgbaImage, src: &RgbaImage, dx: i64, dy: i64, opacity: f32) {
    let dst_w = dst.width() as i64;
    let dst_h = dst.height() as i64;
    let src_w = src.width() as i64;
    let src_h = src.height() as i64;

    let x0 = dx.max(0);
    let y0 = dy.max(0);
    let x1 = (dx + src_w).min(dst_w);
    let y1 = (dy + src_h).min(dst_h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let stride = dst_w as usize * 4;
    let src_raw = src.as_raw();
    let src_stride = src_w as usize * 4;

    dst.as_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            let sy = (y as i64 - dy) as usize;
            for x in x0..x1 {
                let sx = (x - dx) as usize;
                let si = sy * src_stride + sx * 4;
                let px = [src_raw[si], src_raw[si + 1], src_raw[si + 2], src_raw[si + 3]];
                if px[3] == 0 {
                    continue;
                }
                let di = x as usize * 4;
                blend_over(&mut row[di..di + 4], px, opacity);
            }
        });
}

//! Bilinear rotation of planar images.

use crate::image::Image;
use crate::util::math::sin_cos_deg;

/// Rotates every plane of `src` by `angle_deg` about `(cy, cx)`.
///
/// Each destination pixel is mapped to the source by the inverse rotation
/// and sampled bilinearly. Samples falling outside the source are zero.
pub(crate) fn rotate_bilinear(src: &Image, angle_deg: f32, cy: f32, cx: f32) -> Image {
    let width = src.width();
    let height = src.height();
    let mut out = src.clone();
    out.clear();

    let (sin_a, cos_a) = sin_cos_deg(angle_deg);
    let max_x = width as f32 - 1.0;
    let max_y = height as f32 - 1.0;
    let epsilon = 1e-6;

    for (plane, dst) in src.planes().zip(out.planes_mut()) {
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let src_x = cos_a * dx + sin_a * dy + cx;
                let src_y = -sin_a * dx + cos_a * dy + cy;
                if !src_x.is_finite()
                    || !src_y.is_finite()
                    || src_x < -epsilon
                    || src_y < -epsilon
                    || src_x > max_x + epsilon
                    || src_y > max_y + epsilon
                {
                    continue;
                }
                dst[y * width + x] = sample_bilinear(plane, width, height, src_y, src_x);
            }
        }
    }
    out
}

/// Bilinear sample of a row-major plane at a point clamped to its bounds.
pub(crate) fn sample_bilinear(plane: &[f32], width: usize, height: usize, y: f32, x: f32) -> f32 {
    let y = y.clamp(0.0, height as f32 - 1.0);
    let x = x.clamp(0.0, width as f32 - 1.0);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let a = plane[y0 * width + x0];
    let b = plane[y0 * width + x1];
    let c = plane[y1 * width + x0];
    let d = plane[y1 * width + x1];
    a * (1.0 - fx) * (1.0 - fy) + b * fx * (1.0 - fy) + c * (1.0 - fx) * fy + d * fx * fy
}

//! 3x3 smoothing of output-grid channels.

use crate::image::Image;

const KERNEL: [[f32; 3]; 3] = [[0.3, 0.5, 0.3], [0.5, 1.0, 0.5], [0.3, 0.5, 0.3]];
const KERNEL_SUM: f32 = 4.2;

/// Smooths one row-major plane with the normalized 3x3 kernel, treating
/// samples outside the plane as zero.
pub fn smooth_plane(plane: &[f32], height: usize, width: usize) -> Vec<f32> {
    let mut out = vec![0.0; plane.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (ky, row) in KERNEL.iter().enumerate() {
                let Some(yy) = (y + ky).checked_sub(1).filter(|&v| v < height) else {
                    continue;
                };
                for (kx, k) in row.iter().enumerate() {
                    let Some(xx) = (x + kx).checked_sub(1).filter(|&v| v < width) else {
                        continue;
                    };
                    acc += k * plane[yy * width + xx];
                }
            }
            out[y * width + x] = acc / KERNEL_SUM;
        }
    }
    out
}

/// Smooths the first `channels` planes of `grid` (all when `None`).
pub fn smooth_grid(grid: &mut Image, channels: Option<usize>) {
    let (h, w) = (grid.height(), grid.width());
    let n = channels.unwrap_or(grid.channels()).min(grid.channels());
    for plane in grid.planes_mut().take(n) {
        let smoothed = smooth_plane(plane, h, w);
        plane.copy_from_slice(&smoothed);
    }
}

/// Parallel version of [`smooth_grid`], one task per channel.
#[cfg(feature = "rayon")]
pub fn smooth_grid_par(grid: &mut Image, channels: Option<usize>) {
    use rayon::prelude::*;

    let (h, w) = (grid.height(), grid.width());
    let n = channels.unwrap_or(grid.channels()).min(grid.channels());
    let plane_len = h * w;
    grid.as_mut_slice()[..n * plane_len]
        .par_chunks_exact_mut(plane_len.max(1))
        .for_each(|plane| {
            let smoothed = smooth_plane(plane, h, w);
            plane.copy_from_slice(&smoothed);
        });
}

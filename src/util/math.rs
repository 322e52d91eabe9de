//! Small numeric helpers.

/// Computes sine and cosine for an angle in degrees.
pub(crate) fn sin_cos_deg(angle_deg: f32) -> (f32, f32) {
    angle_deg.to_radians().sin_cos()
}

/// Floors `value`, absorbing float noise just below an integer.
///
/// Used where a product such as `0.6 * 240` must land on `144` rather than
/// `143.99998`.
pub(crate) fn floor_eps(value: f64) -> f64 {
    (value + 1e-6).floor()
}

/// Normalized 1-D Gaussian kernel of radius `ceil(3 * sigma)`.
pub(crate) fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

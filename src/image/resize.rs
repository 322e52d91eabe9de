//! Resampling into fixed-size canvases.
//!
//! The detector only talks to the [`Resizer`] trait. [`BuiltinResizer`]
//! covers the three interpolation modes over planar `f32` images; callers
//! with their own resampler can pass a closure instead.

use crate::geometry::{CanvasRect, Dims, OriginalRect};
use crate::image::rotate::sample_bilinear;
use crate::image::Image;
use crate::util::math::gaussian_kernel;
use crate::util::{DetectError, DetectResult};

/// Interpolation used when resizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResizeMode {
    /// Box averaging of the covered source pixels.
    Mean,
    /// Bilinear sampling at the destination pixel centers.
    #[default]
    Bilinear,
    /// Gaussian pre-filter followed by bilinear sampling.
    Gaussian,
}

/// Parameters of one resize call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResizeRequest {
    /// Part of the source image to resize.
    pub region: OriginalRect,
    /// Output size.
    pub target: Dims,
    pub mode: ResizeMode,
    /// Fit the region inside `target` without distortion, centering it.
    pub preserve_aspect_ratio: bool,
}

/// Output of a resize: a `target`-sized image plus where the content sits.
#[derive(Clone, Debug, PartialEq)]
pub struct Resized {
    pub image: Image,
    /// Rectangle covered by resized content; the rest is zero.
    pub placement: CanvasRect,
}

/// Image resampler used to build canvases.
pub trait Resizer {
    fn resize(&self, image: &Image, request: &ResizeRequest) -> DetectResult<Resized>;
}

impl<F> Resizer for F
where
    F: Fn(&Image, &ResizeRequest) -> DetectResult<Resized>,
{
    fn resize(&self, image: &Image, request: &ResizeRequest) -> DetectResult<Resized> {
        self(image, request)
    }
}

/// Default resampler implementing every [`ResizeMode`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinResizer;

impl Resizer for BuiltinResizer {
    fn resize(&self, image: &Image, request: &ResizeRequest) -> DetectResult<Resized> {
        let target = request.target;
        if target.height == 0 || target.width == 0 {
            return Err(DetectError::Resize {
                reason: format!("empty target {target}"),
            });
        }
        let region = request.region;
        let bounds = OriginalRect::from_dims(image.dims());
        if !region.is_finite() || region.intersection(&bounds).is_none() {
            return Err(DetectError::InvalidRegion {
                top: region.top,
                left: region.left,
                height: region.height,
                width: region.width,
                img_height: image.height(),
                img_width: image.width(),
            });
        }

        let content = content_dims(&region, target, request.preserve_aspect_ratio);
        let top = (target.height - content.height) / 2;
        let left = (target.width - content.width) / 2;
        let placement = CanvasRect::new(
            top as f32,
            left as f32,
            content.height as f32,
            content.width as f32,
        );

        let sampler = Sampler {
            region,
            step_h: region.height / content.height as f32,
            step_w: region.width / content.width as f32,
            src_dims: image.dims(),
        };
        let mut out = Image::zeros(image.channels(), target)?;
        for (src, dst) in image.planes().zip(out.planes_mut()) {
            let blurred;
            let src = match request.mode {
                ResizeMode::Gaussian if sampler.step_h > 1.0 || sampler.step_w > 1.0 => {
                    let sigma = 0.5 * sampler.step_h.max(sampler.step_w);
                    blurred = blur(src, image.dims(), sigma);
                    blurred.as_slice()
                }
                _ => src,
            };
            for y in 0..content.height {
                let row = (top + y) * target.width + left;
                for x in 0..content.width {
                    dst[row + x] = match request.mode {
                        ResizeMode::Mean => sampler.mean(src, y, x),
                        ResizeMode::Bilinear | ResizeMode::Gaussian => sampler.bilinear(src, y, x),
                    };
                }
            }
        }
        Ok(Resized {
            image: out,
            placement,
        })
    }
}

/// Size of the resized content inside a `target` canvas.
fn content_dims(region: &OriginalRect, target: Dims, preserve_aspect_ratio: bool) -> Dims {
    if !preserve_aspect_ratio {
        return target;
    }
    let ratio = (region.height / target.height as f32).max(region.width / target.width as f32);
    if ratio <= 0.0 {
        return target;
    }
    let h = (region.height / ratio).round().clamp(1.0, target.height as f32);
    let w = (region.width / ratio).round().clamp(1.0, target.width as f32);
    Dims::new(h as usize, w as usize)
}

struct Sampler {
    region: OriginalRect,
    step_h: f32,
    step_w: f32,
    src_dims: Dims,
}

impl Sampler {
    fn bilinear(&self, plane: &[f32], y: usize, x: usize) -> f32 {
        let sy = self.region.top + (y as f32 + 0.5) * self.step_h - 0.5;
        let sx = self.region.left + (x as f32 + 0.5) * self.step_w - 0.5;
        let (h, w) = (self.src_dims.height as f32, self.src_dims.width as f32);
        if sy < -0.5 || sx < -0.5 || sy > h - 0.5 || sx > w - 0.5 {
            return 0.0;
        }
        sample_bilinear(plane, self.src_dims.width, self.src_dims.height, sy, sx)
    }

    fn mean(&self, plane: &[f32], y: usize, x: usize) -> f32 {
        if self.step_h <= 1.0 && self.step_w <= 1.0 {
            return self.bilinear(plane, y, x);
        }
        let y0 = self.region.top + y as f32 * self.step_h;
        let x0 = self.region.left + x as f32 * self.step_w;
        let (ys, ye) = span(y0, self.step_h, self.src_dims.height);
        let (xs, xe) = span(x0, self.step_w, self.src_dims.width);
        if ys >= ye || xs >= xe {
            return 0.0;
        }
        let mut sum = 0.0;
        for row in ys..ye {
            sum += plane[row * self.src_dims.width + xs..row * self.src_dims.width + xe]
                .iter()
                .sum::<f32>();
        }
        sum / ((ye - ys) * (xe - xs)) as f32
    }
}

/// Integer pixel range covered by `[start, start + len)`, clipped to `[0, max)`.
fn span(start: f32, len: f32, max: usize) -> (usize, usize) {
    let len = len.max(1.0);
    let s = start.round().max(0.0) as usize;
    let e = ((start + len).round().max(0.0) as usize).min(max);
    (s.min(max), e.max(s.min(max) + 1).min(max))
}

/// Separable Gaussian blur with clamped borders.
fn blur(plane: &[f32], dims: Dims, sigma: f32) -> Vec<f32> {
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let (h, w) = (dims.height as isize, dims.width as isize);
    let mut tmp = vec![0.0; plane.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let xx = (x + k as isize - radius).clamp(0, w - 1);
                acc += weight * plane[(y * w + xx) as usize];
            }
            tmp[(y * w + x) as usize] = acc;
        }
    }
    let mut out = vec![0.0; plane.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let yy = (y + k as isize - radius).clamp(0, h - 1);
                acc += weight * tmp[(yy * w + x) as usize];
            }
            out[(y * w + x) as usize] = acc;
        }
    }
    out
}

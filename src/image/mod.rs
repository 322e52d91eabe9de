//! Planar floating-point images.
//!
//! [`Image`] stores `channels` planes of `height * width` samples each, one
//! plane after the other. The same type carries source images, resized
//! canvases and the scoring module's output grids.

use crate::geometry::{Dims, Rect};
use crate::util::{DetectError, DetectResult};

#[cfg(feature = "image-io")]
pub mod io;
pub mod resize;
pub(crate) mod rotate;

pub use resize::{BuiltinResizer, ResizeMode, ResizeRequest, Resized, Resizer};

/// Owned planar image with `f32` samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    data: Vec<f32>,
    channels: usize,
    height: usize,
    width: usize,
}

impl Image {
    /// Wraps a planar buffer of `channels * height * width` samples.
    pub fn from_vec(
        data: Vec<f32>,
        channels: usize,
        height: usize,
        width: usize,
    ) -> DetectResult<Self> {
        let needed = required_len(channels, height, width)?;
        if data.len() < needed {
            return Err(DetectError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        let mut data = data;
        data.truncate(needed);
        Ok(Self {
            data,
            channels,
            height,
            width,
        })
    }

    /// Creates a zero-filled image.
    pub fn zeros(channels: usize, dims: Dims) -> DetectResult<Self> {
        let needed = required_len(channels, dims.height, dims.width)?;
        Ok(Self {
            data: vec![0.0; needed],
            channels,
            height: dims.height,
            width: dims.width,
        })
    }

    /// Creates a single-channel image from a function of `(y, x)`.
    pub fn from_fn<F>(dims: Dims, mut f: F) -> DetectResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        let mut image = Self::zeros(1, dims)?;
        for y in 0..dims.height {
            for x in 0..dims.width {
                image.data[y * dims.width + x] = f(y, x);
            }
        }
        Ok(image)
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns `(height, width)` of each plane.
    #[inline]
    pub fn dims(&self) -> Dims {
        Dims::new(self.height, self.width)
    }

    /// Returns the whole planar buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// Returns channel `c` as a row-major slice.
    pub fn plane(&self, c: usize) -> DetectResult<&[f32]> {
        let len = self.plane_len();
        if c >= self.channels {
            return Err(DetectError::IndexOutOfBounds {
                index: c,
                len: self.channels,
                context: "channel",
            });
        }
        Ok(&self.data[c * len..(c + 1) * len])
    }

    /// Returns channel `c` as a mutable row-major slice.
    pub fn plane_mut(&mut self, c: usize) -> DetectResult<&mut [f32]> {
        let len = self.plane_len();
        if c >= self.channels {
            return Err(DetectError::IndexOutOfBounds {
                index: c,
                len: self.channels,
                context: "channel",
            });
        }
        Ok(&mut self.data[c * len..(c + 1) * len])
    }

    /// Iterates over all planes.
    pub fn planes(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.plane_len().max(1))
    }

    /// Iterates mutably over all planes.
    pub fn planes_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        let len = self.plane_len().max(1);
        self.data.chunks_exact_mut(len)
    }

    /// Returns the sample at `(c, y, x)` if it is within bounds.
    pub fn get(&self, c: usize, y: usize, x: usize) -> Option<f32> {
        if c >= self.channels || y >= self.height || x >= self.width {
            return None;
        }
        self.data
            .get(c * self.plane_len() + y * self.width + x)
            .copied()
    }

    /// Writes the sample at `(c, y, x)`; out-of-bounds writes are ignored.
    pub fn set(&mut self, c: usize, y: usize, x: usize, value: f32) {
        if c >= self.channels || y >= self.height || x >= self.width {
            return;
        }
        let idx = c * self.plane_len() + y * self.width + x;
        self.data[idx] = value;
    }

    /// Returns the channel values of cell `(y, x)`.
    pub fn cell(&self, y: usize, x: usize) -> Option<Vec<f32>> {
        if y >= self.height || x >= self.width {
            return None;
        }
        let len = self.plane_len();
        Some(
            (0..self.channels)
                .map(|c| self.data[c * len + y * self.width + x])
                .collect(),
        )
    }

    /// Copies the integer-aligned part of `region` into a new image.
    ///
    /// The region is rounded to whole pixels and must lie inside the image.
    pub fn crop<S>(&self, region: &Rect<S>) -> DetectResult<Image> {
        let top = region.top.round();
        let left = region.left.round();
        let height = region.height.round();
        let width = region.width.round();
        if !region.is_finite()
            || top < 0.0
            || left < 0.0
            || height < 1.0
            || width < 1.0
            || top + height > self.height as f32
            || left + width > self.width as f32
        {
            return Err(DetectError::InvalidRegion {
                top: region.top,
                left: region.left,
                height: region.height,
                width: region.width,
                img_height: self.height,
                img_width: self.width,
            });
        }
        let (top, left) = (top as usize, left as usize);
        let dims = Dims::new(height as usize, width as usize);
        let mut out = Image::zeros(self.channels, dims)?;
        let src_len = self.plane_len();
        for (c, dst) in out.planes_mut().enumerate() {
            let src = &self.data[c * src_len..(c + 1) * src_len];
            for y in 0..dims.height {
                let start = (top + y) * self.width + left;
                dst[y * dims.width..(y + 1) * dims.width]
                    .copy_from_slice(&src[start..start + dims.width]);
            }
        }
        Ok(out)
    }

    /// Copies `src` into this image with its top-left corner at `(top, left)`.
    ///
    /// Parts of `src` falling outside this image are dropped.
    pub fn blit(&mut self, src: &Image, top: usize, left: usize) -> DetectResult<()> {
        if src.channels != self.channels {
            return Err(DetectError::InvalidDimensions {
                channels: src.channels,
                height: src.height,
                width: src.width,
            });
        }
        let rows = src.height.min(self.height.saturating_sub(top));
        let cols = src.width.min(self.width.saturating_sub(left));
        let dst_len = self.plane_len();
        let src_len = src.plane_len();
        for c in 0..self.channels {
            for y in 0..rows {
                let s = c * src_len + y * src.width;
                let d = c * dst_len + (top + y) * self.width + left;
                self.data[d..d + cols].copy_from_slice(&src.data[s..s + cols]);
            }
        }
        Ok(())
    }

    /// Sets every sample to zero.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Changes the shape in place and zeroes every sample.
    ///
    /// The existing allocation is kept whenever it is large enough.
    pub fn reset_to(&mut self, channels: usize, dims: Dims) -> DetectResult<()> {
        let needed = required_len(channels, dims.height, dims.width)?;
        self.data.clear();
        self.data.resize(needed, 0.0);
        self.channels = channels;
        self.height = dims.height;
        self.width = dims.width;
        Ok(())
    }

    /// Minimum and maximum sample value.
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

pub(crate) fn required_len(channels: usize, height: usize, width: usize) -> DetectResult<usize> {
    if channels == 0 || height == 0 || width == 0 {
        return Err(DetectError::InvalidDimensions {
            channels,
            height,
            width,
        });
    }
    channels
        .checked_mul(height)
        .and_then(|v| v.checked_mul(width))
        .ok_or(DetectError::InvalidDimensions {
            channels,
            height,
            width,
        })
}

//! Loading and saving images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::Image;
use crate::util::{DetectError, DetectResult};
use std::path::Path;

/// Converts a dynamic image into a 3-channel planar image with samples in
/// `[0, 255]`.
pub fn from_dynamic_image(img: &image::DynamicImage) -> DetectResult<Image> {
    let rgb = img.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in rgb.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = px.0[c] as f32;
        }
    }
    Image::from_vec(data, 3, height, width)
}

/// Loads an image from disk as a 3-channel planar image.
pub fn load_image<P: AsRef<Path>>(path: P) -> DetectResult<Image> {
    let img = image::open(path).map_err(|err| DetectError::ImageIo {
        reason: err.to_string(),
    })?;
    from_dynamic_image(&img)
}

/// Writes an image as PNG.
///
/// Three-channel images are written as RGB, anything else as grayscale from
/// the first channel. Samples already in `[0, 255]` are written as is;
/// other ranges are stretched to `[0, 255]`.
pub fn save_png<P: AsRef<Path>>(img: &Image, path: P) -> DetectResult<()> {
    let (lo, hi) = img.min_max();
    let stretch = lo < 0.0 || hi > 255.0;
    let to_u8 = |v: f32| -> u8 {
        let v = if stretch && hi > lo {
            (v - lo) / (hi - lo) * 255.0
        } else {
            v
        };
        v.round().clamp(0.0, 255.0) as u8
    };
    let (width, height) = (img.width() as u32, img.height() as u32);
    let plane = img.height() * img.width();
    let data = img.as_slice();
    let path = path.as_ref();
    let result = if img.channels() == 3 {
        let mut raw = Vec::with_capacity(3 * plane);
        for i in 0..plane {
            for c in 0..3 {
                raw.push(to_u8(data[c * plane + i]));
            }
        }
        image::RgbImage::from_raw(width, height, raw).map(|buf| buf.save(path))
    } else {
        let raw = data[..plane].iter().map(|&v| to_u8(v)).collect();
        image::GrayImage::from_raw(width, height, raw).map(|buf| buf.save(path))
    };
    match result {
        Some(Ok(())) => Ok(()),
        Some(Err(err)) => Err(DetectError::ImageIo {
            reason: err.to_string(),
        }),
        None => Err(DetectError::BufferTooSmall {
            needed: plane,
            got: data.len(),
        }),
    }
}

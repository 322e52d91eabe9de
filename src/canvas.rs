//! Canvas construction for one pyramid level.
//!
//! A canvas is the fixed-size, zero-padded input of the scoring module. The
//! [`Placement`] recorded alongside it says which part of the original image
//! was resized into which part of the canvas, and is all that is needed to
//! map detections back.

use crate::geometry::{Canvas, CanvasRect, Dims, Original, OriginalRect};
use crate::image::rotate::rotate_bilinear;
use crate::image::{Image, ResizeMode, ResizeRequest, Resizer};
use crate::util::{DetectError, DetectResult};

/// Geometric perturbation applied to the input region before resizing.
///
/// Identity by default; detection normally runs without jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Jitter {
    /// Scale of the input region about its center.
    pub scale: f32,
    /// Vertical shift in output pixels.
    pub shift_h: f32,
    /// Horizontal shift in output pixels.
    pub shift_w: f32,
    /// Rotation of the resized content in degrees.
    pub rotation_deg: f32,
}

impl Default for Jitter {
    fn default() -> Self {
        Self {
            scale: 1.0,
            shift_h: 0.0,
            shift_w: 0.0,
            rotation_deg: 0.0,
        }
    }
}

/// Zero padding around the content, as a fraction of the network size.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PadFactors {
    pub height: f32,
    pub width: f32,
}

impl PadFactors {
    pub fn validate(&self) -> DetectResult<()> {
        let ok = |f: f32| (0.0..=1.0).contains(&f);
        if !ok(self.height) || !ok(self.width) {
            return Err(DetectError::InvalidPadFactor {
                hpad: self.height,
                wpad: self.width,
            });
        }
        Ok(())
    }

    /// Padding in pixels on each side for a network of size `network`.
    pub fn pixels(&self, network: Dims) -> Dims {
        Dims::new(
            (self.height * network.height as f32) as usize,
            (self.width * network.width as f32) as usize,
        )
    }
}

/// How canvases are built.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CanvasConfig {
    pub resize_mode: ResizeMode,
    pub pad: PadFactors,
    pub preserve_aspect_ratio: bool,
    pub jitter: Jitter,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            resize_mode: ResizeMode::Bilinear,
            pad: PadFactors::default(),
            preserve_aspect_ratio: true,
            jitter: Jitter::default(),
        }
    }
}

/// Where original content lives inside a canvas.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Placement {
    /// Region of the original image that was resized.
    pub source: OriginalRect,
    /// Area of the canvas covered by that region.
    pub canvas: CanvasRect,
}

impl Placement {
    /// Maps a canvas rectangle back into original image coordinates.
    ///
    /// `original = (canvas - placement.origin) * source / placement + source.origin`
    /// per axis.
    pub fn to_original(&self, rect: &CanvasRect) -> OriginalRect {
        let fh = if self.canvas.height > 0.0 {
            self.source.height / self.canvas.height
        } else {
            1.0
        };
        let fw = if self.canvas.width > 0.0 {
            self.source.width / self.canvas.width
        } else {
            1.0
        };
        rect.shifted(-self.canvas.top, -self.canvas.left)
            .rescaled(fh, fw)
            .cast::<Original>()
            .shifted(self.source.top, self.source.left)
    }

    /// Maps an original image rectangle into canvas coordinates.
    pub fn to_canvas(&self, rect: &OriginalRect) -> CanvasRect {
        let fh = if self.source.height > 0.0 {
            self.canvas.height / self.source.height
        } else {
            1.0
        };
        let fw = if self.source.width > 0.0 {
            self.canvas.width / self.source.width
        } else {
            1.0
        };
        rect.shifted(-self.source.top, -self.source.left)
            .rescaled(fh, fw)
            .cast::<Canvas>()
            .shifted(self.canvas.top, self.canvas.left)
    }
}

/// Per-pixel transform applied to resized content, e.g. a color-space
/// conversion or normalization.
pub trait ChannelPreprocessor {
    fn preprocess(&self, image: &Image) -> DetectResult<Image>;
}

impl<F> ChannelPreprocessor for F
where
    F: Fn(&Image) -> DetectResult<Image>,
{
    fn preprocess(&self, image: &Image) -> DetectResult<Image> {
        self(image)
    }
}

/// Builds the canvas for one pyramid level into `out`.
///
/// `content` is the planned resolution and `pad` the padding on each side.
/// A buffer already in `out` is reshaped to `content + 2 * pad` in place,
/// keeping its allocation when it is large enough. `region` defaults to the
/// whole source image.
#[allow(clippy::too_many_arguments)]
pub fn build_canvas<R: Resizer + ?Sized>(
    source: &Image,
    region: Option<OriginalRect>,
    content: Dims,
    pad: Dims,
    config: &CanvasConfig,
    resizer: &R,
    preprocessor: Option<&dyn ChannelPreprocessor>,
    out: &mut Option<Image>,
) -> DetectResult<Placement> {
    let region = region.unwrap_or_else(|| OriginalRect::from_dims(source.dims()));
    if content.area() == 0 {
        return Err(DetectError::Resize {
            reason: format!("empty target {content}"),
        });
    }
    let jitter = config.jitter;
    let ratio = (region.height / content.height as f32).max(region.width / content.width as f32);
    let working = region
        .scale_centered(jitter.scale, jitter.scale)
        .shifted(-jitter.shift_h * ratio, -jitter.shift_w * ratio);
    if working.area() <= 0.0 {
        return Err(DetectError::InvalidRegion {
            top: working.top,
            left: working.left,
            height: working.height,
            width: working.width,
            img_height: source.height(),
            img_width: source.width(),
        });
    }

    let resized = resizer.resize(
        source,
        &ResizeRequest {
            region: working,
            target: content,
            mode: config.resize_mode,
            preserve_aspect_ratio: config.preserve_aspect_ratio,
        },
    )?;
    let mut placement = resized.placement;
    let mut image = match preprocessor {
        Some(pre) => pre.preprocess(&resized.image)?,
        None => resized.image,
    };
    if jitter.rotation_deg != 0.0 {
        let (cy, cx) = placement.center();
        image = rotate_bilinear(&image, jitter.rotation_deg, cy - 0.5, cx - 0.5);
    }

    let dims = Dims::new(content.height + 2 * pad.height, content.width + 2 * pad.width);
    let canvas = match out.take() {
        Some(mut buf) => {
            buf.reset_to(image.channels(), dims)?;
            buf
        }
        None => Image::zeros(image.channels(), dims)?,
    };
    let canvas = out.insert(canvas);
    canvas.blit(&image, pad.height, pad.width)?;
    placement = placement.shifted(pad.height as f32, pad.width as f32);

    Ok(Placement {
        source: working,
        canvas: placement,
    })
}

#[cfg(test)]
mod tests {
    use super::{build_canvas, CanvasConfig, Jitter, PadFactors, Placement};
    use crate::geometry::{CanvasRect, Dims, OriginalRect};
    use crate::image::{BuiltinResizer, Image};
    use crate::util::DetectError;

    fn source() -> Image {
        Image::from_fn(Dims::new(40, 80), |_, _| 1.0).unwrap()
    }

    #[test]
    fn padding_shifts_placement_and_grows_canvas() {
        let src = source();
        let mut out = None;
        let placement = build_canvas(
            &src,
            None,
            Dims::new(20, 40),
            Dims::new(4, 6),
            &CanvasConfig::default(),
            &BuiltinResizer,
            None,
            &mut out,
        )
        .unwrap();
        let canvas = out.unwrap();
        assert_eq!(canvas.dims(), Dims::new(28, 52));
        assert_eq!(placement.canvas, CanvasRect::new(4.0, 6.0, 20.0, 40.0));
        assert_eq!(placement.source, OriginalRect::new(0.0, 0.0, 40.0, 80.0));
        assert_eq!(canvas.get(0, 0, 0), Some(0.0));
        assert!((canvas.get(0, 10, 20).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn buffer_is_reused_when_dimensions_match() {
        let src = source();
        let mut out = Some(Image::from_fn(Dims::new(20, 40), |_, _| 7.0).unwrap());
        let ptr = out.as_ref().map(|img| img.as_slice().as_ptr());
        build_canvas(
            &src,
            None,
            Dims::new(20, 40),
            Dims::new(0, 0),
            &CanvasConfig::default(),
            &BuiltinResizer,
            None,
            &mut out,
        )
        .unwrap();
        assert_eq!(out.as_ref().map(|img| img.as_slice().as_ptr()), ptr);
        assert!((out.unwrap().get(0, 0, 0).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn larger_buffer_is_reshaped_in_place() {
        let src = source();
        let mut out = Some(Image::zeros(1, Dims::new(40, 80)).unwrap());
        let ptr = out.as_ref().map(|img| img.as_slice().as_ptr());
        build_canvas(
            &src,
            None,
            Dims::new(10, 20),
            Dims::new(2, 2),
            &CanvasConfig::default(),
            &BuiltinResizer,
            None,
            &mut out,
        )
        .unwrap();
        let canvas = out.unwrap();
        assert_eq!(canvas.as_slice().as_ptr(), ptr.unwrap());
        assert_eq!(canvas.dims(), Dims::new(14, 24));
        assert_eq!(canvas.as_slice().len(), 14 * 24);
        assert_eq!(canvas.get(0, 0, 0), Some(0.0));
    }

    #[test]
    fn preprocessor_runs_on_content() {
        let src = source();
        let mut out = None;
        let double = |img: &Image| {
            let data = img.as_slice().iter().map(|v| v * 2.0).collect();
            Image::from_vec(data, img.channels(), img.height(), img.width())
        };
        build_canvas(
            &src,
            None,
            Dims::new(10, 20),
            Dims::new(0, 0),
            &CanvasConfig::default(),
            &BuiltinResizer,
            Some(&double),
            &mut out,
        )
        .unwrap();
        assert!((out.unwrap().get(0, 5, 5).unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn jitter_scales_source_region() {
        let src = source();
        let mut out = None;
        let config = CanvasConfig {
            jitter: Jitter {
                scale: 0.5,
                ..Jitter::default()
            },
            ..CanvasConfig::default()
        };
        let placement = build_canvas(
            &src,
            None,
            Dims::new(20, 40),
            Dims::new(0, 0),
            &config,
            &BuiltinResizer,
            None,
            &mut out,
        )
        .unwrap();
        assert_eq!(placement.source, OriginalRect::new(10.0, 20.0, 20.0, 40.0));
    }

    #[test]
    fn placement_round_trips() {
        let placement = Placement {
            source: OriginalRect::new(5.0, 10.0, 100.0, 200.0),
            canvas: CanvasRect::new(2.0, 3.0, 50.0, 100.0),
        };
        let r = OriginalRect::new(25.0, 50.0, 20.0, 40.0);
        let c = placement.to_canvas(&r);
        assert_eq!(c, CanvasRect::new(12.0, 23.0, 10.0, 20.0));
        let back = placement.to_original(&c);
        assert!((back.top - r.top).abs() < 1e-4);
        assert!((back.width - r.width).abs() < 1e-4);
    }

    #[test]
    fn pad_factors_must_be_fractions() {
        let pad = PadFactors {
            height: 1.5,
            width: 0.0,
        };
        assert!(matches!(
            pad.validate(),
            Err(DetectError::InvalidPadFactor { .. })
        ));
        let pad = PadFactors {
            height: 0.25,
            width: 0.5,
        };
        assert_eq!(pad.pixels(Dims::new(64, 32)), Dims::new(16, 16));
    }
}

//! Per-scale scoring.
//!
//! For each planned resolution the driver builds the canvas, hands it to the
//! external [`Scorer`] and keeps the resulting output grid together with the
//! geometry needed to map grid cells back to the original image.

pub mod smooth;

use crate::canvas::{build_canvas, CanvasConfig, ChannelPreprocessor, Placement};
use crate::geometry::Dims;
use crate::image::{Image, Resizer};
use crate::trace::trace_span;
use crate::util::{BoxedError, DetectError, DetectResult};

/// The scoring network.
///
/// Receives a canvas (`channels x height x width`) and returns a dense output
/// grid whose channel layout is understood by the answer decoder.
pub trait Scorer {
    fn score(&mut self, canvas: &Image) -> Result<Image, BoxedError>;
}

impl<F> Scorer for F
where
    F: FnMut(&Image) -> Result<Image, BoxedError>,
{
    fn score(&mut self, canvas: &Image) -> Result<Image, BoxedError> {
        self(canvas)
    }
}

/// How canvases are stored across scales.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BufferMode {
    /// One canvas per scale, all retained until the next image.
    #[default]
    PerScale,
    /// Two canvases alternate between scales. Canvases cannot be retrieved
    /// after detection in this mode.
    PingPong,
}

/// Post-hoc smoothing of output grids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Smoothing {
    #[default]
    Off,
    /// Smooth the first `channels` channels with a 3x3 averaging kernel.
    /// `None` means one channel per class label when run by a detector, and
    /// every channel when the driver is used directly.
    Average { channels: Option<usize> },
}

/// Everything the driver keeps about one scored scale.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleOutput {
    pub scale_index: usize,
    /// Size of the canvas fed to the scorer.
    pub canvas_dims: Dims,
    pub placement: Placement,
    pub grid: Image,
}

impl ScaleOutput {
    /// Dimensions of the output grid.
    pub fn grid_dims(&self) -> Dims {
        self.grid.dims()
    }
}

/// Collaborators and settings shared by every scale of one image.
pub struct ScanInputs<'a, R: ?Sized> {
    pub source: &'a Image,
    pub pad: Dims,
    pub canvas: &'a CanvasConfig,
    pub resizer: &'a R,
    pub preprocessor: Option<&'a dyn ChannelPreprocessor>,
    pub smoothing: Smoothing,
    pub parallel: bool,
}

/// Owns the canvas buffers of the current image.
#[derive(Debug, Default)]
pub struct ScanDriver {
    mode: BufferMode,
    canvases: Vec<Option<Image>>,
}

impl ScanDriver {
    pub fn new(mode: BufferMode) -> Self {
        Self {
            mode,
            canvases: Vec::new(),
        }
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Prepares buffers for an image with `scales` pyramid levels.
    ///
    /// Per-scale canvases of the previous image are dropped; ping-pong
    /// buffers are kept for reuse.
    pub fn reset(&mut self, scales: usize) {
        match self.mode {
            BufferMode::PerScale => {
                self.canvases.clear();
                self.canvases.resize_with(scales, || None);
            }
            BufferMode::PingPong => self.canvases.resize_with(2, || None),
        }
    }

    fn slot(&self, scale_index: usize) -> usize {
        match self.mode {
            BufferMode::PerScale => scale_index,
            BufferMode::PingPong => scale_index % 2,
        }
    }

    /// Builds the canvas of one scale and scores it.
    pub fn run_scale<S, R>(
        &mut self,
        scale_index: usize,
        content: Dims,
        inputs: &ScanInputs<'_, R>,
        scorer: &mut S,
    ) -> DetectResult<ScaleOutput>
    where
        S: Scorer + ?Sized,
        R: Resizer + ?Sized,
    {
        let _span = trace_span!(
            "scale",
            index = scale_index,
            height = content.height,
            width = content.width
        )
        .entered();
        let slot = self.slot(scale_index);
        if slot >= self.canvases.len() {
            self.canvases.resize_with(slot + 1, || None);
        }
        let out = &mut self.canvases[slot];
        let placement = build_canvas(
            inputs.source,
            None,
            content,
            inputs.pad,
            inputs.canvas,
            inputs.resizer,
            inputs.preprocessor,
            out,
        )?;
        let canvas = out.as_ref().ok_or(DetectError::CanvasUnavailable {
            scale: scale_index,
        })?;
        let canvas_dims = canvas.dims();
        let mut grid = scorer
            .score(canvas)
            .map_err(|source| DetectError::Scoring {
                scale: scale_index,
                source,
            })?;

        if let Smoothing::Average { channels } = inputs.smoothing {
            smooth_output(&mut grid, channels, inputs.parallel);
        }

        Ok(ScaleOutput {
            scale_index,
            canvas_dims,
            placement,
            grid,
        })
    }

    /// Returns the canvas that was scored at `scale_index`.
    ///
    /// Always fails in [`BufferMode::PingPong`].
    pub fn canvas(&self, scale_index: usize) -> DetectResult<&Image> {
        if self.mode == BufferMode::PingPong {
            return Err(DetectError::CanvasUnavailable { scale: scale_index });
        }
        self.canvases
            .get(scale_index)
            .and_then(Option::as_ref)
            .ok_or(DetectError::CanvasUnavailable { scale: scale_index })
    }
}

#[cfg(feature = "rayon")]
fn smooth_output(grid: &mut Image, channels: Option<usize>, parallel: bool) {
    if parallel {
        smooth::smooth_grid_par(grid, channels);
    } else {
        smooth::smooth_grid(grid, channels);
    }
}

#[cfg(not(feature = "rayon"))]
fn smooth_output(grid: &mut Image, channels: Option<usize>, _parallel: bool) {
    smooth::smooth_grid(grid, channels);
}

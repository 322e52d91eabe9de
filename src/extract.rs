//! Turning output grids into detections.
//!
//! Each grid cell corresponds to one network-sized window of the canvas.
//! Cells whose decoded confidence clears the threshold become a
//! [`Detection`] whose rectangle is mapped grid -> canvas -> original image.

use crate::bbox::Detection;
use crate::geometry::{CanvasRect, Dims, GridRect};
use crate::scan::ScaleOutput;
use crate::util::{DetectError, DetectResult};

/// Predicted geometry correction of a cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correction {
    /// Predicted object scale relative to the window; the window is shrunk
    /// by its inverse.
    pub scale: f32,
    /// Vertical offset as a fraction of the network height.
    pub offset_h: f32,
    /// Horizontal offset as a fraction of the network width.
    pub offset_w: f32,
}

/// Decoded content of one output-grid cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellAnswer {
    /// `None` when the cell holds no class; such cells never become
    /// detections.
    pub class_id: Option<usize>,
    pub confidence: f32,
    pub correction: Option<Correction>,
}

/// Turns the channel values of one grid cell into a class and confidence.
pub trait AnswerDecoder {
    fn decode(&self, cell: &[f32]) -> DetectResult<CellAnswer>;
}

impl<F> AnswerDecoder for F
where
    F: Fn(&[f32]) -> DetectResult<CellAnswer>,
{
    fn decode(&self, cell: &[f32]) -> DetectResult<CellAnswer> {
        self(cell)
    }
}

/// Decoder for grids holding one score channel per class, optionally
/// followed by `scale, offset_h, offset_w` channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgmaxAnswer {
    pub classes: usize,
    pub correction: bool,
}

impl ArgmaxAnswer {
    pub fn new(classes: usize) -> Self {
        Self {
            classes,
            correction: false,
        }
    }

    pub fn with_correction(mut self) -> Self {
        self.correction = true;
        self
    }

    fn channels(&self) -> usize {
        self.classes + if self.correction { 3 } else { 0 }
    }
}

impl AnswerDecoder for ArgmaxAnswer {
    fn decode(&self, cell: &[f32]) -> DetectResult<CellAnswer> {
        let needed = self.channels();
        if self.classes == 0 || cell.len() < needed {
            return Err(DetectError::IndexOutOfBounds {
                index: needed.max(1) - 1,
                len: cell.len(),
                context: "answer channel",
            });
        }
        let (class_id, confidence) = cell[..self.classes]
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        let correction = self.correction.then(|| Correction {
            scale: cell[self.classes],
            offset_h: cell[self.classes + 1],
            offset_w: cell[self.classes + 2],
        });
        Ok(CellAnswer {
            class_id: Some(class_id),
            confidence,
            correction,
        })
    }
}

/// Extraction settings.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExtractConfig {
    /// Height multiplier applied about the box center after mapping.
    pub bbox_hfactor: f32,
    /// Width multiplier applied about the box center after mapping.
    pub bbox_wfactor: f32,
    /// Predicted scales are clamped into `[min_scale_pred, max_scale_pred]`.
    pub min_scale_pred: f32,
    pub max_scale_pred: f32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            bbox_hfactor: 1.0,
            bbox_wfactor: 1.0,
            min_scale_pred: 0.0,
            max_scale_pred: f32::MAX,
        }
    }
}

impl ExtractConfig {
    pub fn validate(&self) -> DetectResult<()> {
        if !(self.bbox_hfactor > 0.0 && self.bbox_wfactor > 0.0) {
            return Err(DetectError::config(format!(
                "bbox factors must be positive, got ({}, {})",
                self.bbox_hfactor, self.bbox_wfactor
            )));
        }
        if !(self.min_scale_pred <= self.max_scale_pred) {
            return Err(DetectError::config(format!(
                "scale prediction range [{}, {}] is empty",
                self.min_scale_pred, self.max_scale_pred
            )));
        }
        Ok(())
    }
}

/// Canvas window seen by grid cell `(row, col)`.
///
/// Windows are network-sized and spread linearly over the valid positions:
/// `offset = index * (canvas - network) / max(1, grid - 1)` per axis.
pub fn cell_window(row: usize, col: usize, canvas: Dims, grid: Dims, network: Dims) -> CanvasRect {
    let step = |canvas: usize, net: usize, out: usize| {
        (canvas as f32 - net as f32) / (out.saturating_sub(1).max(1)) as f32
    };
    CanvasRect::new(
        row as f32 * step(canvas.height, network.height, grid.height),
        col as f32 * step(canvas.width, network.width, grid.width),
        network.height as f32,
        network.width as f32,
    )
}

/// Applies a predicted correction to a canvas window.
pub fn apply_correction(
    window: &CanvasRect,
    correction: &Correction,
    network: Dims,
    config: &ExtractConfig,
) -> CanvasRect {
    let shifted = window.shifted(
        correction.offset_h * network.height as f32,
        correction.offset_w * network.width as f32,
    );
    let scale = correction
        .scale
        .max(config.min_scale_pred)
        .min(config.max_scale_pred);
    if !(scale > 0.0) || scale == 1.0 {
        return shifted;
    }
    let inv = 1.0 / scale;
    shifted.scale_centered(inv, inv)
}

/// Extracts the detections of one scale in row-major cell order.
///
/// Cells below `threshold` or whose class is in `excluded` are skipped.
pub fn extract_scale<A: AnswerDecoder + ?Sized>(
    output: &ScaleOutput,
    network: Dims,
    decoder: &A,
    threshold: f32,
    excluded: &[usize],
    config: &ExtractConfig,
) -> DetectResult<Vec<Detection>> {
    let grid = output.grid_dims();
    let mut detections = Vec::new();
    let mut cell = vec![0.0f32; output.grid.channels()];
    let plane = grid.area();
    let data = output.grid.as_slice();
    for row in 0..grid.height {
        for col in 0..grid.width {
            let idx = row * grid.width + col;
            for (c, v) in cell.iter_mut().enumerate() {
                *v = data[c * plane + idx];
            }
            let answer = decoder.decode(&cell)?;
            let Some(class_id) = answer.class_id else {
                continue;
            };
            if !(answer.confidence >= threshold) || excluded.contains(&class_id) {
                continue;
            }
            let window = cell_window(row, col, output.canvas_dims, grid, network);
            let transformed = match &answer.correction {
                Some(c) => apply_correction(&window, c, network, config),
                None => window,
            };
            let original = output.placement.to_original(&transformed);
            let rect = if config.bbox_hfactor != 1.0 || config.bbox_wfactor != 1.0 {
                original.scale_centered(config.bbox_hfactor, config.bbox_wfactor)
            } else {
                original
            };
            detections.push(Detection {
                rect,
                class_id,
                confidence: answer.confidence,
                scale_index: output.scale_index,
                accumulated_count: 1,
                network_input_box: window,
                transformed_input_box: transformed,
                original_image_box: original,
                output_grid_box: GridRect::new(row as f32, col as f32, 1.0, 1.0),
                canvas_dims: output.canvas_dims,
                grid_dims: grid,
            });
        }
    }
    Ok(detections)
}

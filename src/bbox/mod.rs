//! Detections and grouped detection collections.

mod collection;
mod format;

use std::fmt;

use crate::geometry::{CanvasRect, Dims, GridRect, OriginalRect, Rect};

pub use collection::{BboxCollection, BboxGroup, SavingFormat};

/// One detected object.
///
/// `rect` is the box in original image pixels that pruning, clustering and
/// persistence work on. The remaining rectangles trace how it was obtained
/// through the canvas and the output grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub rect: OriginalRect,
    pub class_id: usize,
    pub confidence: f32,
    /// Pyramid level that produced the detection.
    pub scale_index: usize,
    /// Number of raw detections merged into this one.
    pub accumulated_count: usize,
    /// Receptive field of the grid cell inside the canvas.
    pub network_input_box: CanvasRect,
    /// `network_input_box` after predicted scale and offset corrections.
    pub transformed_input_box: CanvasRect,
    /// `transformed_input_box` mapped to original pixels, before the size
    /// multipliers that produce `rect`.
    pub original_image_box: OriginalRect,
    /// Cell of the output grid.
    pub output_grid_box: GridRect,
    pub canvas_dims: Dims,
    pub grid_dims: Dims,
}

impl Detection {
    /// Creates a detection whose every coordinate-space box equals `rect`.
    pub fn new(class_id: usize, confidence: f32, rect: OriginalRect) -> Self {
        Self {
            rect,
            class_id,
            confidence,
            scale_index: 0,
            accumulated_count: 1,
            network_input_box: rect.cast(),
            transformed_input_box: rect.cast(),
            original_image_box: rect,
            output_grid_box: GridRect::default(),
            canvas_dims: Dims::default(),
            grid_dims: Dims::default(),
        }
    }

    pub fn with_scale_index(mut self, scale_index: usize) -> Self {
        self.scale_index = scale_index;
        self
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.rect.area()
    }

    /// Folds `other` into this detection.
    ///
    /// Every rectangle becomes the confidence-weighted mean of both; the
    /// confidences and counts add up. When the total confidence is not
    /// positive the accumulated counts are used as weights instead.
    pub fn accumulate(&mut self, other: &Detection) {
        let (mut wa, mut wb) = (self.confidence, other.confidence);
        if !(wa + wb > 0.0) || wa < 0.0 || wb < 0.0 {
            wa = self.accumulated_count as f32;
            wb = other.accumulated_count as f32;
        }
        let ta = wa / (wa + wb);
        let tb = 1.0 - ta;

        self.rect = blend(&self.rect, &other.rect, ta, tb);
        self.network_input_box = blend(&self.network_input_box, &other.network_input_box, ta, tb);
        self.transformed_input_box = blend(
            &self.transformed_input_box,
            &other.transformed_input_box,
            ta,
            tb,
        );
        self.original_image_box =
            blend(&self.original_image_box, &other.original_image_box, ta, tb);
        self.output_grid_box = blend(&self.output_grid_box, &other.output_grid_box, ta, tb);
        self.confidence += other.confidence;
        self.accumulated_count += other.accumulated_count;
    }
}

fn blend<S>(a: &Rect<S>, b: &Rect<S>, ta: f32, tb: f32) -> Rect<S> {
    Rect::new(
        a.top * ta + b.top * tb,
        a.left * ta + b.left * tb,
        a.height * ta + b.height * tb,
        a.width * ta + b.width * tb,
    )
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "class {} conf {:.4} count {} scale {} box {}",
            self.class_id,
            self.confidence,
            self.accumulated_count,
            self.scale_index,
            self.rect
        )
    }
}

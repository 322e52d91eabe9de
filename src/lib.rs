//! msdetect runs a convolutional scoring network over an image pyramid and
//! turns its dense output grids into labeled, confidence-ranked boxes.
//!
//! The network, the decoding of its output channels, the resampler and an
//! optional channel preprocessor are injected through the [`Scorer`],
//! [`AnswerDecoder`], [`Resizer`] and [`ChannelPreprocessor`] traits; closures
//! implement all of them. Optional features add parallel smoothing and
//! clustering (`rayon`), image loading and crop saving (`image-io`),
//! structured logging (`tracing`) and JSON-friendly configs (`serde`).

pub mod bbox;
pub mod canvas;
pub mod detector;
pub mod extract;
pub mod geometry;
pub mod image;
pub mod nms;
pub mod scale;
pub mod scan;
mod trace;
pub mod util;

pub use bbox::{BboxCollection, BboxGroup, Detection, SavingFormat};
pub use canvas::{CanvasConfig, ChannelPreprocessor, Jitter, PadFactors, Placement};
pub use detector::{Detector, DetectorConfig};
pub use extract::{AnswerDecoder, ArgmaxAnswer, CellAnswer, Correction, ExtractConfig};
pub use geometry::{CanvasRect, Dims, GridRect, OriginalRect, Rect};
pub use image::{BuiltinResizer, Image, ResizeMode, Resizer};
pub use nms::{ClusterConfig, ClusterParams, NmsStrategy, OverlapParams, PostConfig};
pub use scale::{plan_scales, ScalePlanEntry, ScalingConfig, ScalingPolicy};
pub use scan::{BufferMode, ScaleOutput, Scorer, Smoothing};
pub use util::{BoxedError, DetectError, DetectResult};

use crate::canvas::CanvasConfig;
use crate::extract::ExtractConfig;
use crate::nms::{NmsStrategy, PostConfig};
use crate::scale::ScalingConfig;
use crate::scan::{BufferMode, Smoothing};
use crate::util::{DetectError, DetectResult};

/// Configuration for [`Detector`](crate::Detector).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectorConfig {
    pub scaling: ScalingConfig,
    pub canvas: CanvasConfig,
    pub extract: ExtractConfig,
    pub nms: NmsStrategy,
    pub post: PostConfig,
    pub buffer_mode: BufferMode,
    pub smoothing: Smoothing,
    /// Label of the background class, excluded from the output.
    pub background_class: Option<String>,
    /// Label of the mask class, excluded from the output.
    pub mask_class: Option<String>,
    /// Maximum number of detections written per frame by `save_crops`.
    pub max_crops_per_frame: Option<usize>,
    /// Use rayon for smoothing and clustering (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scaling: ScalingConfig::default(),
            canvas: CanvasConfig::default(),
            extract: ExtractConfig::default(),
            nms: NmsStrategy::default(),
            post: PostConfig::default(),
            buffer_mode: BufferMode::default(),
            smoothing: Smoothing::default(),
            background_class: Some(String::from("bg")),
            mask_class: None,
            max_crops_per_frame: None,
            parallel: false,
        }
    }
}

impl DetectorConfig {
    /// Checks every section; the first problem found is returned.
    pub fn validate(&self) -> DetectResult<()> {
        self.scaling.policy.validate()?;
        if self.scaling.max_size == Some(0) {
            return Err(DetectError::config("max_size must be positive"));
        }
        self.canvas.pad.validate()?;
        let jitter = &self.canvas.jitter;
        if !(jitter.scale > 0.0) || !jitter.scale.is_finite() {
            return Err(DetectError::config(format!(
                "jitter scale must be positive, got {}",
                jitter.scale
            )));
        }
        if !jitter.shift_h.is_finite()
            || !jitter.shift_w.is_finite()
            || !jitter.rotation_deg.is_finite()
        {
            return Err(DetectError::config("jitter values must be finite"));
        }
        self.extract.validate()?;
        self.nms.validate()?;
        if let Some(ratio) = self.post.width_over_height {
            if !(ratio > 0.0) || !ratio.is_finite() {
                return Err(DetectError::config(format!(
                    "width_over_height must be positive, got {ratio}"
                )));
            }
        }
        if let Smoothing::Average { channels: Some(0) } = self.smoothing {
            return Err(DetectError::config("smoothing needs at least one channel"));
        }
        Ok(())
    }
}

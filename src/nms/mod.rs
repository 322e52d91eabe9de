//! Suppression and merging of redundant detections.
//!
//! Two strategies operate on the pooled detections of all scales:
//! [`prune_overlap`] keeps only the strongest of mutually overlapping boxes,
//! while [`cluster`] merges nearby boxes into confidence-weighted averages.

mod cluster;
mod overlap;

pub use cluster::{cluster, cluster_pass};
pub use overlap::prune_overlap;

use crate::bbox::Detection;
use crate::util::{DetectError, DetectResult};

/// Parameters of overlap pruning.
///
/// Center-distance thresholds are relative to the size of the box being
/// tested: a box is overlapped when both its vertical distance divided by
/// its height and its horizontal distance divided by its width fall below
/// the pair of thresholds (checked from either box).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OverlapParams {
    /// Boxes matching at least this much overlap.
    pub max_overlap: f32,
    /// Only boxes of the same class suppress each other.
    pub same_class_only: bool,
    pub min_hcenter_dist: f32,
    pub min_wcenter_dist: f32,
    /// Center thresholds applied only between boxes of the same scale.
    pub same_scale_hcenter_dist: f32,
    pub same_scale_wcenter_dist: f32,
}

impl Default for OverlapParams {
    fn default() -> Self {
        Self {
            max_overlap: 0.5,
            same_class_only: true,
            min_hcenter_dist: 0.0,
            min_wcenter_dist: 0.0,
            same_scale_hcenter_dist: 0.0,
            same_scale_wcenter_dist: 0.0,
        }
    }
}

/// Merge criteria of one clustering run.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusterParams {
    /// Minimum overlap ratio for two boxes to merge.
    pub match_threshold: f32,
    /// Vertical center-distance factor applied to the box radii.
    pub max_hcenter_dist: f32,
    /// Horizontal center-distance factor applied to the box radii.
    pub max_wcenter_dist: f32,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            max_hcenter_dist: 1.0,
            max_wcenter_dist: 1.0,
        }
    }
}

/// Settings of the clustering strategy.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusterConfig {
    /// Clustering within each scale before pooling, when set.
    pub per_scale: Option<ClusterParams>,
    /// Clustering of the pooled detections.
    pub global: ClusterParams,
    /// Merged detections below this confidence are dropped.
    pub threshold: f32,
}

/// Which suppression runs after extraction.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NmsStrategy {
    /// Raw detections are returned as extracted.
    None,
    Overlap(OverlapParams),
    Cluster(ClusterConfig),
}

impl Default for NmsStrategy {
    fn default() -> Self {
        Self::Overlap(OverlapParams::default())
    }
}

impl NmsStrategy {
    pub fn validate(&self) -> DetectResult<()> {
        let fraction = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(DetectError::config(format!("{name} must be in [0, 1], got {v}")))
            }
        };
        match self {
            Self::None => Ok(()),
            Self::Overlap(p) => fraction("max_overlap", p.max_overlap),
            Self::Cluster(c) => {
                fraction("match_threshold", c.global.match_threshold)?;
                if let Some(p) = &c.per_scale {
                    fraction("per-scale match_threshold", p.match_threshold)?;
                }
                Ok(())
            }
        }
    }
}

/// Final ordering and shape adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PostConfig {
    /// When set, every box's width is reset to `height * ratio` about its
    /// center.
    pub width_over_height: Option<f32>,
}

/// Sorts by descending confidence, keeping extraction order among equal
/// confidences, then applies the configured aspect ratio.
pub fn finalize(boxes: &mut [Detection], post: &PostConfig) {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    if let Some(ratio) = post.width_over_height {
        for b in boxes.iter_mut() {
            b.rect = b.rect.with_aspect(ratio);
        }
    }
}

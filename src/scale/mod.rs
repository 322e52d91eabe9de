//! Image pyramid planning.
//!
//! Given the network's minimum input size and the size of the image, a
//! [`ScalingPolicy`] decides which resolutions the scoring module is run at.
//! Planned dimensions are the size of the resized content; zero padding is
//! added around them when the canvas is built.

use crate::geometry::Dims;
use crate::trace::{trace_event, trace_warn};
use crate::util::math::floor_eps;
use crate::util::{DetectError, DetectResult};

/// Strategy used to pick the pyramid resolutions.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScalingPolicy {
    /// One scale at the image's own size.
    Original,
    /// Caller-supplied resolutions, used verbatim.
    Manual(Vec<Dims>),
    /// The image size multiplied by each factor.
    FactorList(Vec<f64>),
    /// `count` resolutions geometrically spaced between the min and max
    /// bounds.
    NScales {
        count: usize,
        min_factor: f64,
        max_factor: f64,
    },
    /// From the max bound down to the min bound, dividing by `step`.
    StepDown {
        step: f64,
        min_factor: f64,
        max_factor: f64,
    },
    /// From the smallest image multiple reaching the min bound up to the max
    /// bound, multiplying by `step`.
    StepUp {
        step: f64,
        min_factor: f64,
        max_factor: f64,
    },
    /// One scale at the network's minimum input size.
    NetworkOnly,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self::NScales {
            count: 3,
            min_factor: 1.0,
            max_factor: 1.0,
        }
    }
}

impl ScalingPolicy {
    /// Returns `(min_factor, max_factor)` for policies that use bounds.
    fn factors(&self) -> (f64, f64) {
        match *self {
            Self::NScales {
                min_factor,
                max_factor,
                ..
            }
            | Self::StepDown {
                min_factor,
                max_factor,
                ..
            }
            | Self::StepUp {
                min_factor,
                max_factor,
                ..
            } => (min_factor, max_factor),
            _ => (1.0, 1.0),
        }
    }

    /// Checks parameters that do not depend on the image.
    pub fn validate(&self) -> DetectResult<()> {
        let (min_factor, max_factor) = self.factors();
        if !(min_factor > 0.0 && max_factor > 0.0) {
            return Err(DetectError::config(format!(
                "scale factors must be positive, got min {min_factor} max {max_factor}"
            )));
        }
        match self {
            Self::Manual(list) if list.is_empty() => {
                Err(DetectError::config("manual scale list is empty"))
            }
            Self::Manual(list) => match list.iter().find(|d| d.area() == 0) {
                Some(d) => Err(DetectError::config(format!("manual scale {d} is empty"))),
                None => Ok(()),
            },
            Self::FactorList(list) if list.is_empty() => {
                Err(DetectError::config("expected at least 1 scale factor"))
            }
            Self::FactorList(list) => match list.iter().find(|f| !(**f > 0.0)) {
                Some(f) => Err(DetectError::config(format!(
                    "scale factor {f} must be positive"
                ))),
                None => Ok(()),
            },
            Self::NScales { count: 0, .. } => {
                Err(DetectError::config("expected at least 1 scale"))
            }
            Self::StepDown { step, .. } | Self::StepUp { step, .. } if !(*step > 1.0) => Err(
                DetectError::config(format!("scale step must be greater than 1, got {step}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Pyramid settings.
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScalingConfig {
    pub policy: ScalingPolicy,
    /// Scales with a height or width above this are dropped.
    pub max_size: Option<usize>,
}

/// One planned resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalePlanEntry {
    /// Size of the resized content fed to the network (padding excluded).
    pub dims: Dims,
    /// `true` when the padded canvas is at least the network minimum size.
    pub is_valid: bool,
}

/// Min and max content sizes used by the bounded policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleBounds {
    pub min: Dims,
    pub max: Dims,
}

impl ScaleBounds {
    /// Computes bounds for an image.
    ///
    /// The min bound is `network * min_factor`, lowered when needed so that
    /// it plus the padding reaches the network size, and at least 1x1. The
    /// max bound is `image * max_factor`, never below the network size.
    pub fn new(network: Dims, image: Dims, pad: Dims, min_factor: f64, max_factor: f64) -> Self {
        let mut min = scale_dims(network, min_factor, min_factor);
        if min.height + 2 * pad.height < network.height {
            min.height = network.height - 2 * pad.height;
        }
        if min.width + 2 * pad.width < network.width {
            min.width = network.width - 2 * pad.width;
        }
        min.height = min.height.max(1);
        min.width = min.width.max(1);
        let mut max = scale_dims(image, max_factor, max_factor);
        max.height = max.height.max(network.height);
        max.width = max.width.max(network.width);
        Self { min, max }
    }
}

/// Plans the pyramid for one image.
///
/// `pad` is the zero padding added on each side of every canvas. The result
/// is non-empty and ordered as the policy produces it.
pub fn plan_scales(
    network: Dims,
    image: Dims,
    config: &ScalingConfig,
    pad: Dims,
) -> DetectResult<Vec<ScalePlanEntry>> {
    config.policy.validate()?;
    if network.area() == 0 || image.area() == 0 {
        return Err(DetectError::InvalidDimensions {
            channels: 1,
            height: image.height.min(network.height),
            width: image.width.min(network.width),
        });
    }
    let (min_factor, max_factor) = config.policy.factors();
    let bounds = ScaleBounds::new(network, image, pad, min_factor, max_factor);

    let mut scales = match &config.policy {
        ScalingPolicy::Original => vec![image],
        ScalingPolicy::Manual(list) => list.clone(),
        ScalingPolicy::FactorList(factors) => factors
            .iter()
            .map(|&f| scale_dims(image, f, f))
            .collect(),
        ScalingPolicy::NScales { count, .. } => n_scales(bounds, *count),
        ScalingPolicy::StepDown { step, .. } => step_down(bounds, *step),
        ScalingPolicy::StepUp { step, .. } => step_up(bounds, image, *step),
        ScalingPolicy::NetworkOnly => vec![network],
    };

    if let Some(max_size) = config.max_size {
        let limit = max_size + 2 * pad.max_dim();
        scales.retain(|d| {
            let keep = d.height <= limit && d.width <= limit;
            if !keep {
                trace_warn!("removing scale {} because of max size {}", d, limit);
            }
            keep
        });
    }
    if scales.is_empty() {
        return Err(DetectError::NoScales {
            max_size: config.max_size,
        });
    }
    trace_event!("scales_planned", count = scales.len());

    Ok(scales
        .into_iter()
        .map(|dims| ScalePlanEntry {
            dims,
            is_valid: dims.height + 2 * pad.height >= network.height
                && dims.width + 2 * pad.width >= network.width,
        })
        .collect())
}

fn scale_dims(dims: Dims, fh: f64, fw: f64) -> Dims {
    Dims::new(
        floor_eps(dims.height as f64 * fh).max(0.0) as usize,
        floor_eps(dims.width as f64 * fw).max(0.0) as usize,
    )
}

fn n_scales(bounds: ScaleBounds, count: usize) -> Vec<Dims> {
    let ScaleBounds { min, max } = bounds;
    let distance = max
        .height
        .saturating_sub(min.height)
        .min(max.width.saturating_sub(min.width));
    let mut count = count;
    let clamped = if min == max { 1 } else { 2 };
    if count > distance && count > clamped {
        trace_warn!(
            "{} resolutions requested but min {} and max {} allow only {}",
            count,
            min,
            max,
            clamped
        );
        count = clamped;
    }
    if min == max || count == 1 {
        return vec![max];
    }
    if count == 2 {
        return vec![min, max];
    }
    let fact = (max.height as f64 / min.height.max(1) as f64)
        .min(max.width as f64 / min.width.max(1) as f64);
    let step = (fact.ln() / (count - 1) as f64).exp();
    let mut scales = Vec::with_capacity(count);
    let mut f = step;
    for _ in 1..count {
        scales.push(scale_dims(max, 1.0 / f, 1.0 / f));
        f *= step;
    }
    scales.push(max);
    scales
}

fn step_down(bounds: ScaleBounds, step: f64) -> Vec<Dims> {
    let ScaleBounds { min, max } = bounds;
    let mut scales = vec![max];
    let mut f = 1.0 / step;
    loop {
        let d = scale_dims(max, f, f);
        if !d.fits(min) || d.area() == 0 {
            break;
        }
        scales.push(d);
        f /= step;
    }
    scales
}

fn step_up(bounds: ScaleBounds, image: Dims, step: f64) -> Vec<Dims> {
    let ScaleBounds { min, max } = bounds;
    let mut factor = (min.height as f64 / image.height as f64)
        .max(min.width as f64 / image.width as f64);
    let mut scales = Vec::new();
    if !(factor > 0.0) {
        return scales;
    }
    let mut d = scale_dims(image, factor, factor);
    while max.fits(d) {
        let floored = Dims::new(d.height.max(min.height), d.width.max(min.width));
        scales.insert(0, floored);
        factor *= step;
        d = scale_dims(image, factor, factor);
    }
    scales
}

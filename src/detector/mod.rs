//! The multi-scale detection pipeline.
//!
//! A [`Detector`] owns the scoring network, the answer decoder and the
//! resampler, and runs one image at a time through:
//! scale planning, canvas building and scoring per scale, box extraction,
//! suppression, and final ordering. Per-image state (plan, per-scale outputs,
//! canvases and detections) is replaced by the next call to
//! [`Detector::detect`].

mod config;
#[cfg(feature = "image-io")]
mod save;

pub use config::DetectorConfig;

use crate::bbox::{BboxCollection, Detection};
use crate::canvas::ChannelPreprocessor;
use crate::extract::{extract_scale, AnswerDecoder};
use crate::geometry::{Dims, OriginalRect};
use crate::image::{BuiltinResizer, Image, Resizer};
use crate::nms::{cluster, finalize, prune_overlap, ClusterConfig, NmsStrategy};
use crate::scale::{plan_scales, ScalePlanEntry};
use crate::scan::{ScaleOutput, ScanDriver, ScanInputs, Scorer, Smoothing};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{DetectError, DetectResult};

/// Multi-scale detector around an external scoring network.
pub struct Detector<S, A, R = BuiltinResizer> {
    labels: Vec<String>,
    network: Dims,
    scorer: S,
    decoder: A,
    resizer: R,
    preprocessor: Option<Box<dyn ChannelPreprocessor>>,
    config: DetectorConfig,
    background_id: Option<usize>,
    mask_id: Option<usize>,
    driver: ScanDriver,
    plan: Vec<ScalePlanEntry>,
    outputs: Vec<ScaleOutput>,
    source: Option<Image>,
    detections: Vec<Detection>,
    #[cfg(feature = "image-io")]
    crop_counters: Vec<usize>,
}

impl<S, A> Detector<S, A, BuiltinResizer>
where
    S: Scorer,
    A: AnswerDecoder,
{
    /// Creates a detector for a network with minimum input size `network`.
    ///
    /// `labels` names the classes by id. The configured background and mask
    /// classes are looked up there; a name that is missing only disables the
    /// corresponding exclusion, with a warning.
    pub fn new(
        labels: Vec<String>,
        network: Dims,
        scorer: S,
        decoder: A,
        config: DetectorConfig,
    ) -> DetectResult<Self> {
        config.validate()?;
        if network.area() == 0 {
            return Err(DetectError::InvalidDimensions {
                channels: 1,
                height: network.height,
                width: network.width,
            });
        }
        let background_id = resolve_class(&labels, config.background_class.as_deref());
        let mask_id = resolve_class(&labels, config.mask_class.as_deref());
        Ok(Self {
            #[cfg(feature = "image-io")]
            crop_counters: vec![0; labels.len()],
            labels,
            network,
            scorer,
            decoder,
            resizer: BuiltinResizer,
            preprocessor: None,
            driver: ScanDriver::new(config.buffer_mode),
            config,
            background_id,
            mask_id,
            plan: Vec::new(),
            outputs: Vec::new(),
            source: None,
            detections: Vec::new(),
        })
    }
}

impl<S, A, R> Detector<S, A, R>
where
    S: Scorer,
    A: AnswerDecoder,
    R: Resizer,
{
    /// Replaces the resampler.
    pub fn with_resizer<R2: Resizer>(self, resizer: R2) -> Detector<S, A, R2> {
        Detector {
            labels: self.labels,
            network: self.network,
            scorer: self.scorer,
            decoder: self.decoder,
            resizer,
            preprocessor: self.preprocessor,
            config: self.config,
            background_id: self.background_id,
            mask_id: self.mask_id,
            driver: self.driver,
            plan: self.plan,
            outputs: self.outputs,
            source: self.source,
            detections: self.detections,
            #[cfg(feature = "image-io")]
            crop_counters: self.crop_counters,
        }
    }

    /// Sets the transform applied to resized content before scoring.
    pub fn with_preprocessor<P>(mut self, preprocessor: P) -> Self
    where
        P: ChannelPreprocessor + 'static,
    {
        self.preprocessor = Some(Box::new(preprocessor));
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Minimum input size of the network.
    pub fn network(&self) -> Dims {
        self.network
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label of class `class_id`, if known.
    pub fn label(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    /// Id of the background class, when it was found among the labels.
    pub fn background_id(&self) -> Option<usize> {
        self.background_id
    }

    pub fn mask_id(&self) -> Option<usize> {
        self.mask_id
    }

    /// Smoothing limited to the class channels unless a count is configured.
    fn class_smoothing(&self) -> Smoothing {
        match self.config.smoothing {
            Smoothing::Average { channels: None } => Smoothing::Average {
                channels: Some(self.labels.len()),
            },
            other => other,
        }
    }

    fn excluded(&self) -> Vec<usize> {
        self.background_id.into_iter().chain(self.mask_id).collect()
    }

    /// Runs the whole pipeline on `image`.
    ///
    /// Returns the final detections, sorted by descending confidence. On
    /// error nothing is kept for this image.
    pub fn detect(&mut self, image: &Image, threshold: f32) -> DetectResult<&[Detection]> {
        let _span = trace_span!(
            "detect",
            height = image.height(),
            width = image.width(),
            threshold = threshold
        )
        .entered();
        self.plan.clear();
        self.outputs.clear();
        self.detections.clear();
        self.source = None;

        let pad = self.config.canvas.pad.pixels(self.network);
        let plan = plan_scales(self.network, image.dims(), &self.config.scaling, pad)?;
        self.driver.reset(plan.len());
        let excluded = self.excluded();
        let parallel = self.config.parallel;
        let inputs = ScanInputs {
            source: image,
            pad,
            canvas: &self.config.canvas,
            resizer: &self.resizer,
            preprocessor: self.preprocessor.as_deref(),
            smoothing: self.class_smoothing(),
            parallel,
        };

        let mut outputs = Vec::with_capacity(plan.len());
        let mut raw = Vec::new();
        for (scale_index, entry) in plan.iter().enumerate() {
            if !entry.is_valid {
                trace_warn!(
                    "skipping scale {} ({}): smaller than the network input {}",
                    scale_index,
                    entry.dims,
                    self.network
                );
                continue;
            }
            let output =
                self.driver
                    .run_scale(scale_index, entry.dims, &inputs, &mut self.scorer)?;
            let mut boxes = extract_scale(
                &output,
                self.network,
                &self.decoder,
                threshold,
                &excluded,
                &self.config.extract,
            )?;
            if let NmsStrategy::Cluster(ClusterConfig {
                per_scale: Some(params),
                ..
            }) = &self.config.nms
            {
                boxes = cluster(boxes, params, parallel);
            }
            raw.extend(boxes);
            outputs.push(output);
        }
        trace_event!("raw_detections", count = raw.len());

        let mut boxes = match &self.config.nms {
            NmsStrategy::None => raw,
            NmsStrategy::Overlap(params) => prune_overlap(&raw, params, threshold, &excluded),
            NmsStrategy::Cluster(c) => {
                let mut merged = cluster(raw, &c.global, parallel);
                merged.retain(|d| d.confidence >= c.threshold);
                merged
            }
        };
        finalize(&mut boxes, &self.config.post);
        trace_event!("detections", count = boxes.len());

        self.plan = plan;
        self.outputs = outputs;
        self.source = Some(image.clone());
        self.detections = boxes;
        Ok(&self.detections)
    }

    /// Detections of the last image.
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    /// Scale plan of the last image, including skipped entries.
    pub fn scales(&self) -> &[ScalePlanEntry] {
        &self.plan
    }

    /// Scored scales of the last image, in plan order.
    pub fn outputs(&self) -> &[ScaleOutput] {
        &self.outputs
    }

    /// Crops every detection from the last image.
    ///
    /// Pairs hold the index of the detection and its crop. Detections that
    /// extend past the image are skipped with a warning.
    pub fn originals(&self) -> Vec<(usize, Image)> {
        let Some(source) = &self.source else {
            return Vec::new();
        };
        self.detections
            .iter()
            .enumerate()
            .filter_map(|(i, d)| match source.crop(&d.rect) {
                Ok(crop) => Some((i, crop)),
                Err(err) => {
                    trace_warn!("skipping crop of detection {}: {}", i, err);
                    None
                }
            })
            .collect()
    }

    /// Crops the canvas window that produced `detection`.
    ///
    /// Fails with [`DetectError::CanvasUnavailable`] in ping-pong buffer
    /// mode, where canvases are overwritten between scales.
    pub fn preprocessed(&self, detection: &Detection) -> DetectResult<Image> {
        self.driver
            .canvas(detection.scale_index)?
            .crop(&detection.network_input_box)
    }

    /// Response map of one class over the last image.
    ///
    /// Every original pixel takes the maximum, over scored scales, of the
    /// class channel at the grid cell whose window is centered closest to
    /// it. Assumes the grid holds one channel per class first.
    pub fn class_mask(&self, name: &str) -> DetectResult<Image> {
        let class_id = self
            .labels
            .iter()
            .position(|l| l == name)
            .ok_or_else(|| DetectError::config(format!("unknown class {name:?}")))?;
        let dims = self
            .source
            .as_ref()
            .map(Image::dims)
            .ok_or_else(|| DetectError::config("no image has been processed yet"))?;
        let mut mask = Image::zeros(1, dims)?;
        let (half_h, half_w) = (
            self.network.height as f32 / 2.0,
            self.network.width as f32 / 2.0,
        );
        let mut first = true;
        for output in &self.outputs {
            if class_id >= output.grid.channels() {
                return Err(DetectError::IndexOutOfBounds {
                    index: class_id,
                    len: output.grid.channels(),
                    context: "class channel",
                });
            }
            let grid = output.grid_dims();
            let plane = output.grid.plane(class_id)?;
            let step = |canvas: usize, net: usize, out: usize| {
                (canvas as f32 - net as f32) / out.saturating_sub(1).max(1) as f32
            };
            let step_h = step(output.canvas_dims.height, self.network.height, grid.height);
            let step_w = step(output.canvas_dims.width, self.network.width, grid.width);
            let nearest = |center: f32, half: f32, step: f32, len: usize| -> usize {
                if step <= 0.0 || len <= 1 {
                    return 0;
                }
                ((center - half) / step).round().max(0.0).min((len - 1) as f32) as usize
            };
            let values = mask.as_mut_slice();
            for y in 0..dims.height {
                for x in 0..dims.width {
                    let pixel = OriginalRect::new(y as f32, x as f32, 1.0, 1.0);
                    let (cy, cx) = output.placement.to_canvas(&pixel).center();
                    let row = nearest(cy, half_h, step_h, grid.height);
                    let col = nearest(cx, half_w, step_w, grid.width);
                    let v = plane[row * grid.width + col];
                    let slot = &mut values[y * dims.width + x];
                    *slot = if first { v } else { slot.max(v) };
                }
            }
            first = false;
        }
        Ok(mask)
    }

    /// Collection holding the last image's detections as one group.
    pub fn to_collection(&self, name: impl Into<String>) -> BboxCollection {
        let mut collection = BboxCollection::new();
        self.add_to(&mut collection, name);
        collection
    }

    /// Appends the last image's detections to `collection` as a new group.
    pub fn add_to(&self, collection: &mut BboxCollection, name: impl Into<String>) {
        let dims = self.source.as_ref().map(Image::dims).unwrap_or_default();
        collection.add_group(name, dims, &self.detections);
    }
}

fn resolve_class(labels: &[String], name: Option<&str>) -> Option<usize> {
    let name = name?;
    let id = labels.iter().position(|l| l == name);
    if id.is_none() {
        trace_warn!("class {:?} not found among labels, not excluding it", name);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::{Detector, DetectorConfig};
    use crate::extract::ArgmaxAnswer;
    use crate::geometry::Dims;
    use crate::image::Image;
    use crate::nms::NmsStrategy;
    use crate::scale::ScalingPolicy;
    use crate::scan::{BufferMode, Smoothing};
    use crate::util::{BoxedError, DetectError};

    fn labels() -> Vec<String> {
        vec!["bg".into(), "face".into()]
    }

    /// Two-class scorer: every cell is background except the first, which
    /// is a face.
    fn corner_scorer(canvas: &Image) -> Result<Image, BoxedError> {
        let grid = Dims::new(canvas.height() / 16, canvas.width() / 16);
        let mut out = Image::zeros(2, grid)?;
        out.as_mut_slice()[..grid.area()].fill(0.5);
        out.set(1, 0, 0, 0.9);
        out.set(0, 0, 0, 0.0);
        Ok(out)
    }

    fn config(policy: ScalingPolicy) -> DetectorConfig {
        let mut config = DetectorConfig::default();
        config.scaling.policy = policy;
        config.nms = NmsStrategy::None;
        config
    }

    #[test]
    fn background_is_excluded_and_missing_names_are_tolerated() {
        let det = Detector::new(
            labels(),
            Dims::new(32, 32),
            corner_scorer,
            ArgmaxAnswer::new(2),
            DetectorConfig {
                mask_class: Some("mask".into()),
                ..DetectorConfig::default()
            },
        )
        .unwrap();
        assert_eq!(det.background_id(), Some(0));
        assert_eq!(det.mask_id(), None);
    }

    #[test]
    fn one_detection_per_scale_without_suppression() {
        let mut det = Detector::new(
            labels(),
            Dims::new(32, 32),
            corner_scorer,
            ArgmaxAnswer::new(2),
            config(ScalingPolicy::FactorList(vec![1.0, 0.5])),
        )
        .unwrap();
        let image = Image::zeros(1, Dims::new(128, 128)).unwrap();
        let found = det.detect(&image, 0.6).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|d| d.class_id == 1));
        assert_eq!(det.outputs().len(), 2);
        assert_eq!(det.scales().len(), 2);
    }

    #[test]
    fn invalid_scales_are_skipped() {
        let mut det = Detector::new(
            labels(),
            Dims::new(32, 32),
            corner_scorer,
            ArgmaxAnswer::new(2),
            config(ScalingPolicy::FactorList(vec![1.0, 0.1])),
        )
        .unwrap();
        let image = Image::zeros(1, Dims::new(128, 128)).unwrap();
        let found = det.detect(&image, 0.6).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].scale_index, 0);
        assert!(!det.scales()[1].is_valid);
    }

    #[test]
    fn scorer_errors_abort_the_image() {
        let failing = |_: &Image| -> Result<Image, BoxedError> { Err("network down".into()) };
        let mut det = Detector::new(
            labels(),
            Dims::new(32, 32),
            failing,
            ArgmaxAnswer::new(2),
            config(ScalingPolicy::Original),
        )
        .unwrap();
        let image = Image::zeros(1, Dims::new(64, 64)).unwrap();
        let err = det.detect(&image, 0.5).unwrap_err();
        assert!(matches!(err, DetectError::Scoring { scale: 0, .. }));
        assert!(det.detections().is_empty());
    }

    #[test]
    fn ping_pong_mode_forbids_canvas_crops() {
        let mut cfg = config(ScalingPolicy::Original);
        cfg.buffer_mode = BufferMode::PingPong;
        let mut det = Detector::new(
            labels(),
            Dims::new(32, 32),
            corner_scorer,
            ArgmaxAnswer::new(2),
            cfg,
        )
        .unwrap();
        let image = Image::zeros(1, Dims::new(64, 64)).unwrap();
        let first = det.detect(&image, 0.6).unwrap()[0].clone();
        assert!(matches!(
            det.preprocessed(&first),
            Err(DetectError::CanvasUnavailable { .. })
        ));
    }

    #[test]
    fn per_scale_mode_returns_the_network_window() {
        let mut det = Detector::new(
            labels(),
            Dims::new(32, 32),
            corner_scorer,
            ArgmaxAnswer::new(2),
            config(ScalingPolicy::Original),
        )
        .unwrap();
        let image = Image::from_fn(Dims::new(64, 64), |y, x| (y * 64 + x) as f32).unwrap();
        let first = det.detect(&image, 0.6).unwrap()[0].clone();
        let window = det.preprocessed(&first).unwrap();
        assert_eq!(window.dims(), Dims::new(32, 32));
        assert_eq!(det.originals().len(), 1);
    }

    #[test]
    fn default_smoothing_leaves_non_class_channels_alone() {
        let scorer = |canvas: &Image| -> Result<Image, BoxedError> {
            let grid = Dims::new(canvas.height() / 16, canvas.width() / 16);
            let mut out = Image::zeros(3, grid)?;
            out.set(1, 1, 1, 1.0);
            out.set(2, 1, 1, 1.0);
            Ok(out)
        };
        let mut config = config(ScalingPolicy::Original);
        config.smoothing = Smoothing::Average { channels: None };
        let mut det =
            Detector::new(labels(), Dims::new(32, 32), scorer, ArgmaxAnswer::new(2), config)
                .unwrap();
        det.detect(&Image::zeros(1, Dims::new(64, 64)).unwrap(), 2.0)
            .unwrap();
        let grid = &det.outputs()[0].grid;
        assert!(grid.get(1, 1, 1).unwrap() < 1.0);
        assert!(grid.get(1, 1, 2).unwrap() > 0.0);
        assert_eq!(grid.get(2, 1, 1), Some(1.0));
        assert_eq!(grid.get(2, 1, 2), Some(0.0));
    }

    #[test]
    fn class_mask_covers_the_image() {
        let mut det = Detector::new(
            labels(),
            Dims::new(32, 32),
            corner_scorer,
            ArgmaxAnswer::new(2),
            config(ScalingPolicy::Original),
        )
        .unwrap();
        let image = Image::zeros(1, Dims::new(64, 64)).unwrap();
        det.detect(&image, 0.6).unwrap();
        let mask = det.class_mask("face").unwrap();
        assert_eq!(mask.dims(), Dims::new(64, 64));
        assert_eq!(mask.get(0, 0, 0), Some(0.9));
        assert_eq!(mask.get(0, 63, 63), Some(0.0));
        assert!(det.class_mask("car").is_err());
    }

    #[test]
    fn collection_gets_one_group_per_image() {
        let mut det = Detector::new(
            labels(),
            Dims::new(32, 32),
            corner_scorer,
            ArgmaxAnswer::new(2),
            config(ScalingPolicy::Original),
        )
        .unwrap();
        let image = Image::zeros(1, Dims::new(64, 64)).unwrap();
        det.detect(&image, 0.6).unwrap();
        let mut collection = det.to_collection("a.png");
        det.add_to(&mut collection, "b.png");
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.group_dims("b.png").unwrap(), Dims::new(64, 64));
    }
}

use msdetect::{
    ArgmaxAnswer, BoxedError, BufferMode, ClusterConfig, ClusterParams, DetectResult, Detector,
    DetectorConfig, Dims, Image, NmsStrategy, OverlapParams, ScalingPolicy,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn labels() -> Vec<String> {
    vec!["bg".to_string(), "object".to_string()]
}

fn gradient(dims: Dims) -> Image {
    Image::from_fn(dims, |y, x| ((x * 7 + y * 3) % 256) as f32).unwrap()
}

/// Grid with one output cell per 8 canvas pixels past the network size,
/// background everywhere except the listed cells.
fn sparse_scorer(
    network: Dims,
    cells: Vec<(usize, usize)>,
) -> impl FnMut(&Image) -> Result<Image, BoxedError> {
    move |canvas: &Image| -> Result<Image, BoxedError> {
        let grid = Dims::new(
            (canvas.height() - network.height) / 8 + 1,
            (canvas.width() - network.width) / 8 + 1,
        );
        let mut out = Image::zeros(2, grid)?;
        out.plane_mut(0)?.fill(0.1);
        for &(row, col) in &cells {
            if row < grid.height && col < grid.width {
                out.set(0, row, col, 0.0);
                out.set(1, row, col, 0.9);
            }
        }
        Ok(out)
    }
}

fn n_scales_config(nms: NmsStrategy) -> DetectorConfig {
    let mut config = DetectorConfig::default();
    config.scaling.policy = ScalingPolicy::NScales {
        count: 3,
        min_factor: 1.0,
        max_factor: 1.0,
    };
    config.nms = nms;
    config
}

fn corner_detector(nms: NmsStrategy) -> impl FnMut(&Image) -> Vec<msdetect::Detection> {
    let network = Dims::new(64, 64);
    let mut detector = Detector::new(
        labels(),
        network,
        sparse_scorer(network, vec![(0, 0)]),
        ArgmaxAnswer::new(2),
        n_scales_config(nms),
    )
    .unwrap();
    move |image: &Image| detector.detect(image, 0.5).unwrap().to_vec()
}

#[test]
fn three_scales_yield_one_raw_box_each() {
    let raw = corner_detector(NmsStrategy::None)(&gradient(Dims::new(240, 320)));
    assert_eq!(raw.len(), 3);
    let mut scales: Vec<usize> = raw.iter().map(|d| d.scale_index).collect();
    scales.sort_unstable();
    assert_eq!(scales, vec![0, 1, 2]);
    assert!(raw.iter().all(|d| d.class_id == 1));
}

#[test]
fn overlap_alone_keeps_nested_corner_boxes() {
    // boxes share the top-left corner at very different sizes, so their
    // IoU stays well under 0.5
    let kept = corner_detector(NmsStrategy::Overlap(OverlapParams {
        max_overlap: 0.5,
        same_class_only: true,
        ..OverlapParams::default()
    }))(&gradient(Dims::new(240, 320)));
    assert_eq!(kept.len(), 3);
    for (i, a) in kept.iter().enumerate() {
        for b in &kept[i + 1..] {
            assert!(a.rect.match_ratio(&b.rect) < 0.5);
        }
    }
}

#[test]
fn center_distance_thresholds_collapse_scales_to_one_detection() {
    let network = Dims::new(64, 64);
    let image = gradient(Dims::new(240, 320));
    let mut detector = Detector::new(
        labels(),
        network,
        sparse_scorer(network, vec![(0, 0)]),
        ArgmaxAnswer::new(2),
        n_scales_config(NmsStrategy::Overlap(OverlapParams {
            max_overlap: 0.5,
            same_class_only: true,
            min_hcenter_dist: 1.0,
            min_wcenter_dist: 1.0,
            ..OverlapParams::default()
        })),
    )
    .unwrap();
    let kept = detector.detect(&image, 0.5).unwrap();
    assert_eq!(kept.len(), 1);
    // equal confidences: the largest box, from the coarsest scale, wins
    assert_eq!(kept[0].scale_index, 1);
    assert!((kept[0].confidence - 0.9).abs() < 1e-6);

    let collection = detector.to_collection("frame.png");
    let mut dump = Vec::new();
    collection.write_canonical(&mut dump).unwrap();
    let dump = String::from_utf8(dump).unwrap();
    assert_eq!(dump.lines().count(), 1);
    assert!(dump.starts_with("frame.png 240 320 1 0.9 "));
}

#[test]
fn unpadded_transform_is_a_linear_rescale() {
    let mut rng = StdRng::seed_from_u64(17);
    let network = Dims::new(16, 16);
    for _ in 0..30 {
        let canvas = Dims::new(rng.random_range(16..80), rng.random_range(16..80));
        let image_dims = Dims::new(rng.random_range(20..160), rng.random_range(20..160));
        let grid = Dims::new(rng.random_range(1..8), rng.random_range(1..8));

        let mut config = DetectorConfig::default();
        config.scaling.policy = ScalingPolicy::Manual(vec![canvas]);
        config.canvas.preserve_aspect_ratio = false;
        config.nms = NmsStrategy::None;
        let scorer = move |_: &Image| -> Result<Image, BoxedError> {
            let mut out = Image::zeros(2, grid)?;
            out.plane_mut(1)?.fill(0.9);
            Ok(out)
        };
        let mut detector =
            Detector::new(labels(), network, scorer, ArgmaxAnswer::new(2), config).unwrap();
        let found = detector.detect(&gradient(image_dims), 0.5).unwrap();
        assert_eq!(found.len(), grid.area());

        let fh = image_dims.height as f32 / canvas.height as f32;
        let fw = image_dims.width as f32 / canvas.width as f32;
        let step =
            |c: usize, n: usize, o: usize| (c - n) as f32 / o.saturating_sub(1).max(1) as f32;
        for d in found {
            let row = d.output_grid_box.top;
            let col = d.output_grid_box.left;
            let top = row * step(canvas.height, network.height, grid.height) * fh;
            let left = col * step(canvas.width, network.width, grid.width) * fw;
            let r = d.original_image_box;
            assert!((r.top - top).abs() < 1e-3, "top {} vs {}", r.top, top);
            assert!((r.left - left).abs() < 1e-3, "left {} vs {}", r.left, left);
            assert!((r.height - network.height as f32 * fh).abs() < 1e-3);
            assert!((r.width - network.width as f32 * fw).abs() < 1e-3);
            assert_eq!(d.rect, r);
        }
    }
}

#[test]
fn buffer_modes_agree_on_detections() {
    let network = Dims::new(32, 32);
    let image = gradient(Dims::new(120, 150));
    let run = |mode: BufferMode| {
        let mut config = DetectorConfig::default();
        config.buffer_mode = mode;
        config.scaling.policy = ScalingPolicy::StepDown {
            step: 1.4,
            min_factor: 1.0,
            max_factor: 1.0,
        };
        let mut detector = Detector::new(
            labels(),
            network,
            sparse_scorer(network, vec![(0, 0), (1, 2), (3, 1)]),
            ArgmaxAnswer::new(2),
            config,
        )
        .unwrap();
        detector.detect(&image, 0.5).unwrap().to_vec()
    };
    assert_eq!(run(BufferMode::PerScale), run(BufferMode::PingPong));
}

#[test]
fn clustering_merges_neighbouring_cells() {
    let network = Dims::new(32, 32);
    let image = gradient(Dims::new(96, 96));
    let mut config = DetectorConfig::default();
    config.scaling.policy = ScalingPolicy::Original;
    config.nms = NmsStrategy::Cluster(ClusterConfig {
        per_scale: None,
        global: ClusterParams::default(),
        threshold: 1.0,
    });
    let mut detector = Detector::new(
        labels(),
        network,
        sparse_scorer(network, vec![(0, 0), (0, 1), (8, 8)]),
        ArgmaxAnswer::new(2),
        config,
    )
    .unwrap();
    let found = detector.detect(&image, 0.5).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].accumulated_count, 2);
    assert!((found[0].confidence - 1.8).abs() < 1e-5);
    assert!((found[0].rect.left - 4.0).abs() < 1e-4);
}

#[test]
fn preprocessor_sees_every_canvas() {
    use std::cell::Cell;
    use std::rc::Rc;

    let network = Dims::new(32, 32);
    let calls = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&calls);
    let mut config = DetectorConfig::default();
    config.scaling.policy = ScalingPolicy::FactorList(vec![1.0, 0.75, 0.5]);
    let preprocess = move |img: &Image| -> DetectResult<Image> {
        seen.set(seen.get() + 1);
        let mut out = img.clone();
        out.as_mut_slice().iter_mut().for_each(|v| *v /= 255.0);
        Ok(out)
    };
    let mut detector = Detector::new(
        labels(),
        network,
        sparse_scorer(network, vec![(0, 0)]),
        ArgmaxAnswer::new(2),
        config,
    )
    .unwrap()
    .with_preprocessor(preprocess);
    detector.detect(&gradient(Dims::new(64, 64)), 0.5).unwrap();
    assert_eq!(calls.get(), 3);
    assert_eq!(detector.outputs().len(), 3);
}

#[test]
fn ping_pong_reuses_two_canvas_buffers() {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    let network = Dims::new(32, 32);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let record = Rc::clone(&seen);
    let mut inner = sparse_scorer(network, vec![(0, 0)]);
    let scorer = move |canvas: &Image| -> Result<Image, BoxedError> {
        record.borrow_mut().push(canvas.as_slice().as_ptr() as usize);
        inner(canvas)
    };
    let mut config = DetectorConfig::default();
    config.buffer_mode = BufferMode::PingPong;
    config.scaling.policy = ScalingPolicy::FactorList(vec![1.0, 0.9, 0.8, 0.7, 0.6, 0.5]);
    let mut detector =
        Detector::new(labels(), network, scorer, ArgmaxAnswer::new(2), config).unwrap();
    let image = gradient(Dims::new(128, 128));
    detector.detect(&image, 0.5).unwrap();
    detector.detect(&image, 0.5).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 12);
    let distinct: HashSet<usize> = seen.iter().copied().collect();
    assert!(distinct.len() <= 2, "{} distinct buffers", distinct.len());
}

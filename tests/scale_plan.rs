use msdetect::{plan_scales, Dims, ScalingConfig, ScalingPolicy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NET: Dims = Dims::new(48, 32);

fn config(policy: ScalingPolicy) -> ScalingConfig {
    ScalingConfig {
        policy,
        max_size: None,
    }
}

fn random_image(rng: &mut StdRng) -> Dims {
    Dims::new(rng.random_range(48..600), rng.random_range(32..800))
}

#[test]
fn original_policy_yields_the_image_size() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let image = random_image(&mut rng);
        let plan = plan_scales(NET, image, &config(ScalingPolicy::Original), Dims::default())
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].dims, image);
        assert!(plan[0].is_valid);
    }
}

#[test]
fn step_down_is_monotonic_and_never_below_the_network() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..100 {
        let image = random_image(&mut rng);
        let step = rng.random_range(1.1..3.0);
        let policy = ScalingPolicy::StepDown {
            step,
            min_factor: 1.0,
            max_factor: 1.0,
        };
        let plan = plan_scales(NET, image, &config(policy), Dims::default()).unwrap();
        assert!(!plan.is_empty());
        for entry in &plan {
            assert!(entry.dims.fits(NET), "{} below {} for {}", entry.dims, NET, image);
            assert!(entry.is_valid);
        }
        for pair in plan.windows(2) {
            assert!(pair[0].dims.fits(pair[1].dims));
        }
    }
}

#[test]
fn single_n_scale_is_one_entry() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..50 {
        let image = random_image(&mut rng);
        let policy = ScalingPolicy::NScales {
            count: 1,
            min_factor: 1.0,
            max_factor: 1.0,
        };
        let plan = plan_scales(NET, image, &config(policy), Dims::default()).unwrap();
        assert_eq!(plan.len(), 1);
    }
}

#[test]
fn manual_scales_are_used_verbatim() {
    let scales = vec![Dims::new(100, 50), Dims::new(30, 30), Dims::new(400, 300)];
    let plan = plan_scales(
        NET,
        Dims::new(200, 200),
        &config(ScalingPolicy::Manual(scales.clone())),
        Dims::default(),
    )
    .unwrap();
    let dims: Vec<Dims> = plan.iter().map(|e| e.dims).collect();
    assert_eq!(dims, scales);
    let valid: Vec<bool> = plan.iter().map(|e| e.is_valid).collect();
    assert_eq!(valid, vec![true, false, true]);
}

#[test]
fn max_size_is_enlarged_by_padding() {
    let pad = Dims::new(8, 4);
    let config = ScalingConfig {
        policy: ScalingPolicy::Manual(vec![Dims::new(110, 100), Dims::new(120, 100)]),
        max_size: Some(100),
    };
    let plan = plan_scales(NET, Dims::new(200, 200), &config, pad).unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].dims, Dims::new(110, 100));
}

#[test]
fn step_up_with_half_network_padding_terminates() {
    let network = Dims::new(64, 64);
    let image = Dims::new(240, 320);
    let policy = ScalingPolicy::StepUp {
        step: 2.0,
        min_factor: 0.01,
        max_factor: 1.0,
    };
    let plan = plan_scales(network, image, &config(policy), Dims::new(32, 32)).unwrap();
    assert!(!plan.is_empty());
    for pair in plan.windows(2) {
        assert!(pair[0].dims.area() >= pair[1].dims.area());
    }
    for entry in &plan {
        assert!(entry.dims.height >= 1 && entry.dims.width >= 1);
        assert!(entry.dims.height <= image.height && entry.dims.width <= image.width);
        assert!(entry.is_valid);
    }
}

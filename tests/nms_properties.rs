use msdetect::nms::{cluster, cluster_pass, prune_overlap};
use msdetect::{ClusterParams, Detection, OriginalRect, OverlapParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_boxes(rng: &mut StdRng, n: usize) -> Vec<Detection> {
    (0..n)
        .map(|i| {
            let size = rng.random_range(10.0..40.0);
            let rect = OriginalRect::new(
                rng.random_range(0.0..120.0),
                rng.random_range(0.0..120.0),
                size,
                size * rng.random_range(0.7..1.3),
            );
            Detection::new(rng.random_range(0..2), rng.random_range(0.1..1.0), rect)
                .with_scale_index(i % 3)
        })
        .collect()
}

#[test]
fn identical_boxes_keep_the_stronger_one() {
    let rect = OriginalRect::new(5.0, 5.0, 20.0, 20.0);
    let boxes = vec![Detection::new(1, 0.3, rect), Detection::new(1, 0.7, rect)];
    let kept = prune_overlap(&boxes, &OverlapParams::default(), 0.0, &[]);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].confidence, 0.7);
}

#[test]
fn equal_confidence_keeps_the_larger_box() {
    let boxes = vec![
        Detection::new(1, 0.5, OriginalRect::new(0.0, 0.0, 20.0, 20.0)),
        Detection::new(1, 0.5, OriginalRect::new(0.0, 0.0, 22.0, 22.0)),
    ];
    let kept = prune_overlap(&boxes, &OverlapParams::default(), 0.0, &[]);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].rect.height, 22.0);
}

#[test]
fn survivors_of_pruning_do_not_overlap_within_a_class() {
    let mut rng = StdRng::seed_from_u64(2024);
    let params = OverlapParams::default();
    for _ in 0..20 {
        let boxes = random_boxes(&mut rng, 30);
        let kept = prune_overlap(&boxes, &params, 0.2, &[]);
        assert!(kept.iter().all(|d| d.confidence >= 0.2));
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                if a.class_id == b.class_id {
                    assert!(a.rect.match_ratio(&b.rect) < params.max_overlap);
                }
            }
        }
    }
}

#[test]
fn clustering_reaches_a_fixed_point() {
    let mut rng = StdRng::seed_from_u64(99);
    let params = ClusterParams::default();
    for _ in 0..20 {
        let boxes = random_boxes(&mut rng, 25);
        let total: usize = boxes.iter().map(|d| d.accumulated_count).sum();
        let mut once = cluster(boxes, &params, false);
        assert_eq!(once.iter().map(|d| d.accumulated_count).sum::<usize>(), total);

        let snapshot = once.clone();
        assert!(!cluster_pass(&mut once, &params, false));
        assert_eq!(once, snapshot);
        let twice = cluster(once, &params, false);
        assert_eq!(twice, snapshot);
    }
}

#[test]
fn clustering_preserves_confidence_mass() {
    let mut rng = StdRng::seed_from_u64(5);
    let boxes = random_boxes(&mut rng, 40);
    let mass: f32 = boxes.iter().map(|d| d.confidence).sum();
    let merged = cluster(boxes, &ClusterParams::default(), false);
    let after: f32 = merged.iter().map(|d| d.confidence).sum();
    assert!((mass - after).abs() < 1e-3);
}

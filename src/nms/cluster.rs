use crate::bbox::Detection;
use crate::nms::ClusterParams;
use crate::trace::{trace_event, trace_span};

/// Merges nearby detections until no pair qualifies any more.
///
/// Each pass walks all pairs by ascending center distance and folds the
/// second box of a qualifying pair into the first with
/// [`Detection::accumulate`]. A box takes part in at most one merge per
/// pass; merged boxes move to the end. Passes repeat until one merges
/// nothing, so the output is a fixed point.
pub fn cluster(boxes: Vec<Detection>, params: &ClusterParams, parallel: bool) -> Vec<Detection> {
    let _span = trace_span!("nms", strategy = "cluster", raw = boxes.len()).entered();
    let mut boxes = boxes;
    let mut passes = 0usize;
    while cluster_pass(&mut boxes, params, parallel) {
        passes += 1;
    }
    trace_event!("clustered", kept = boxes.len(), passes = passes);
    boxes
}

/// Runs one clustering pass; returns `true` if any pair was merged.
pub fn cluster_pass(boxes: &mut Vec<Detection>, params: &ClusterParams, parallel: bool) -> bool {
    if boxes.len() < 2 {
        return false;
    }
    let mut pairs = pair_distances(boxes, parallel);
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut slots: Vec<Option<Detection>> = boxes.drain(..).map(Some).collect();
    let mut merged = Vec::new();
    for (_, i, j) in pairs {
        let (Some(a), Some(b)) = (&slots[i], &slots[j]) else {
            continue;
        };
        if !should_merge(a, b, params) {
            continue;
        }
        if let (Some(mut a), Some(b)) = (slots[i].take(), slots[j].take()) {
            a.accumulate(&b);
            merged.push(a);
        }
    }
    let any = !merged.is_empty();
    boxes.extend(slots.into_iter().flatten());
    boxes.extend(merged);
    any
}

fn should_merge(a: &Detection, b: &Detection, params: &ClusterParams) -> bool {
    let (ra, rb) = (a.rect.radius(), b.rect.radius());
    let max_h = (ra * params.max_hcenter_dist).max(rb) * params.max_hcenter_dist;
    let max_w = (ra * params.max_wcenter_dist).max(rb) * params.max_wcenter_dist;
    a.rect.center_h_distance(&b.rect) <= max_h
        && a.rect.center_w_distance(&b.rect) <= max_w
        && a.rect.match_ratio(&b.rect) >= params.match_threshold
}

/// Center distance of every pair `i < j`, in `(i, j)` order.
fn pair_distances(boxes: &[Detection], parallel: bool) -> Vec<(f32, usize, usize)> {
    #[cfg(feature = "rayon")]
    {
        if parallel {
            use rayon::prelude::*;
            let n = boxes.len();
            return (0..n)
                .into_par_iter()
                .flat_map_iter(|i| {
                    (i + 1..n).map(move |j| (boxes[i].rect.center_distance(&boxes[j].rect), i, j))
                })
                .collect();
        }
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    let n = boxes.len();
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in i + 1..n {
            pairs.push((boxes[i].rect.center_distance(&boxes[j].rect), i, j));
        }
    }
    pairs
}

use crate::bbox::Detection;
use crate::nms::OverlapParams;
use crate::trace::{trace_event, trace_span};

/// Keeps only the strongest of every set of overlapping detections.
///
/// Detections below `threshold` or with a class in `excluded` take no part
/// and are dropped. A remaining detection is suppressed when another one
/// overlaps it (see [`OverlapParams`]) and beats it: higher confidence, or
/// equal confidence and larger area, or equal both and an earlier position.
/// Survivors keep their input order.
pub fn prune_overlap(
    boxes: &[Detection],
    params: &OverlapParams,
    threshold: f32,
    excluded: &[usize],
) -> Vec<Detection> {
    let _span = trace_span!("nms", strategy = "overlap", raw = boxes.len()).entered();
    let candidates: Vec<&Detection> = boxes
        .iter()
        .filter(|b| b.confidence >= threshold && !excluded.contains(&b.class_id))
        .collect();

    let survivors: Vec<Detection> = candidates
        .iter()
        .enumerate()
        .filter(|&(i, a)| {
            !candidates
                .iter()
                .enumerate()
                .any(|(j, b)| i != j && suppresses(b, j, a, i, params))
        })
        .map(|(_, a)| (*a).clone())
        .collect();
    trace_event!("pruned", kept = survivors.len());
    survivors
}

/// Returns `true` if `b` (at position `j`) suppresses `a` (at position `i`).
fn suppresses(b: &Detection, j: usize, a: &Detection, i: usize, params: &OverlapParams) -> bool {
    if params.same_class_only && a.class_id != b.class_id {
        return false;
    }
    if !overlaps(a, b, params) {
        return false;
    }
    match b.confidence.total_cmp(&a.confidence) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => match b.area().total_cmp(&a.area()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => j < i,
        },
    }
}

fn overlaps(a: &Detection, b: &Detection, params: &OverlapParams) -> bool {
    if a.rect.match_ratio(&b.rect) >= params.max_overlap {
        return true;
    }
    let close = |h: f32, w: f32| {
        (a.rect.relative_h_distance(&b.rect) < h && a.rect.relative_w_distance(&b.rect) < w)
            || (b.rect.relative_h_distance(&a.rect) < h && b.rect.relative_w_distance(&a.rect) < w)
    };
    if close(params.min_hcenter_dist, params.min_wcenter_dist) {
        return true;
    }
    a.scale_index == b.scale_index
        && close(params.same_scale_hcenter_dist, params.same_scale_wcenter_dist)
}

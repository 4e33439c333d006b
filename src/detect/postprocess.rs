//! Box postprocessing shared by backends: overlap, suppression, clamping.

use crate::detect::result::BoxDetection;

/// Intersection-over-union of two center-format boxes.
pub fn iou(a: &BoxDetection, b: &BoxDetection) -> f64 {
    let (ax1, ay1, ax2, ay2) = corners(a);
    let (bx1, by1, bx2, by2) = corners(b);

    let x1 = ax1.max(bx1);
    let y1 = ay1.max(by1);
    let x2 = ax2.min(bx2);
    let y2 = ay2.min(by2);

    let intersection = if x2 > x1 && y2 > y1 {
        (x2 - x1) * (y2 - y1)
    } else {
        0.0
    };
    let union = a.w * a.h + b.w * b.h - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn corners(b: &BoxDetection) -> (f64, f64, f64, f64) {
    (
        b.xc - b.w / 2.0,
        b.yc - b.h / 2.0,
        b.xc + b.w / 2.0,
        b.yc + b.h / 2.0,
    )
}

/// Greedy class-aware non-max suppression.
///
/// Boxes are visited by descending score; a box is dropped when it overlaps an
/// already kept box of the same class by more than `iou_threshold`.
/// Output is ordered by descending score.
pub fn non_max_suppression(
    mut boxes: Vec<BoxDetection>,
    iou_threshold: f64,
    max_detections: usize,
) -> Vec<BoxDetection> {
    boxes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut kept: Vec<BoxDetection> = Vec::new();

    'outer: for candidate in boxes {
        for k in &kept {
            if k.class_id == candidate.class_id && iou(&candidate, k) > iou_threshold {
                continue 'outer;
            }
        }
        kept.push(candidate);
        if kept.len() >= max_detections {
            break;
        }
    }
    kept
}

/// Clip a box to the unit square, keeping it center-format.
///
/// Returns `None` when nothing of the box remains inside the image.
pub fn clamp_unit(b: &BoxDetection) -> Option<BoxDetection> {
    let (x1, y1, x2, y2) = corners(b);
    let x1 = x1.clamp(0.0, 1.0);
    let y1 = y1.clamp(0.0, 1.0);
    let x2 = x2.clamp(0.0, 1.0);
    let y2 = y2.clamp(0.0, 1.0);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(BoxDetection {
        class_id: b.class_id,
        xc: (x1 + x2) / 2.0,
        yc: (y1 + y2) / 2.0,
        w: x2 - x1,
        h: y2 - y1,
        score: b.score,
    })
}

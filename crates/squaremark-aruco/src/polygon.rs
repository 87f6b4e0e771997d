//! Douglas–Peucker simplification of closed contours.

use nalgebra::Point2;

/// Closed-curve arc length.
pub(crate) fn arc_length(points: &[Point2<f32>]) -> f32 {
    squaremark_core::perimeter(points)
}

fn farthest_from(points: &[Point2<f32>], from: Point2<f32>) -> usize {
    points
        .iter()
        .enumerate()
        .max_by(|a, b| (a.1 - from).norm_squared().total_cmp(&(b.1 - from).norm_squared()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn segment_distance(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f32::EPSILON {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Push the indices kept from the open chain `ids`, excluding its last point.
fn simplify_chain(points: &[Point2<f32>], ids: &[usize], epsilon: f32, out: &mut Vec<usize>) {
    let chain: Vec<Point2<f32>> = ids.iter().map(|&i| points[i]).collect();
    let mut stack = vec![(0usize, chain.len() - 1)];
    let mut keep = vec![false; chain.len()];
    keep[0] = true;
    while let Some((s, e)) = stack.pop() {
        if e <= s + 1 {
            continue;
        }
        let (mut best_i, mut best_d) = (s, -1.0f32);
        for i in (s + 1)..e {
            let d = segment_distance(chain[i], chain[s], chain[e]);
            if d > best_d {
                best_d = d;
                best_i = i;
            }
        }
        if best_d > epsilon {
            keep[best_i] = true;
            stack.push((s, best_i));
            stack.push((best_i, e));
        }
    }
    out.extend(
        ids[..ids.len() - 1]
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(&i, _)| i),
    );
}

/// Approximate a closed contour by a polygon with maximum deviation
/// `epsilon`. Returns the indices of the kept contour points in contour order.
pub(crate) fn approx_polygon(points: &[Point2<f32>], epsilon: f32) -> Vec<usize> {
    if points.len() < 3 {
        return (0..points.len()).collect();
    }
    // Anchor on two far-apart points so the split does not depend on where
    // tracing started.
    let a0 = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a0]);
    let a = farthest_from(points, points[b]);
    if a == b {
        return vec![a];
    }

    let n = points.len();
    let walk = |from: usize, to: usize| -> Vec<usize> {
        let len = (to + n - from) % n;
        (0..=len).map(|k| (from + k) % n).collect()
    };

    let mut out = Vec::new();
    simplify_chain(points, &walk(a, b), epsilon, &mut out);
    simplify_chain(points, &walk(b, a), epsilon, &mut out);
    out
}

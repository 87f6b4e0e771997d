//! Quadrilateral and polygon helpers in image coordinates (y axis down).
//!
//! "Clockwise" always means clockwise as seen on screen, which is a
//! positive shoelace area with the y axis pointing down.

use nalgebra::Point2;

/// Four image-space corners.
pub type Quad = [Point2<f32>; 4];

/// Signed shoelace area; positive for on-screen clockwise polygons.
pub fn signed_area(poly: &[Point2<f32>]) -> f32 {
    let n = poly.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        acc += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    (0.5 * acc) as f32
}

pub fn perimeter(poly: &[Point2<f32>]) -> f32 {
    let n = poly.len();
    (0..n).map(|i| (poly[(i + 1) % n] - poly[i]).norm()).sum()
}

/// Strict convexity: every turn has the same non-zero orientation.
pub fn is_convex(poly: &[Point2<f32>]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        let c = poly[(i + 2) % n];
        let cross = (b - a).perp(&(c - b));
        if cross == 0.0 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Reorder a quad to clockwise winding starting at the vertex nearest the
/// image origin.
pub fn normalize_quad_winding(mut quad: Quad) -> Quad {
    if signed_area(&quad) < 0.0 {
        quad.swap(1, 3);
    }
    let start = quad
        .iter()
        .enumerate()
        .min_by(|a, b| {
            let da = a.1.coords.norm_squared();
            let db = b.1.coords.norm_squared();
            da.total_cmp(&db)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    quad.rotate_left(start);
    quad
}

/// Smallest distance between any two corners of a quad.
pub fn min_corner_distance(quad: &Quad) -> f32 {
    let mut best = f32::INFINITY;
    for i in 0..4 {
        for j in (i + 1)..4 {
            best = best.min((quad[i] - quad[j]).norm());
        }
    }
    best
}

/// Convex hull (Andrew's monotone chain), returned in clockwise order.
pub fn convex_hull(points: &[Point2<f32>]) -> Vec<Point2<f32>> {
    let mut pts: Vec<Point2<f32>> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
        (a - o).perp(&(b - o))
    }

    let mut lower: Vec<Point2<f32>> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point2<f32>> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    // Positive cross turns with y down are on-screen clockwise already.
    lower
}

/// Largest-area quadrilateral whose vertices are hull vertices.
///
/// The hull must be convex and ordered; the result keeps that order.
pub fn max_area_quad(hull: &[Point2<f32>]) -> Option<Quad> {
    let n = hull.len();
    if n < 4 {
        return None;
    }
    let tri = |a: usize, b: usize, c: usize| -> f32 {
        ((hull[b] - hull[a]).perp(&(hull[c] - hull[a])) * 0.5).abs()
    };

    let mut best: Option<(f32, [usize; 4])> = None;
    for i in 0..n {
        for k in (i + 2)..n {
            // best vertex strictly between i and k, and strictly after k (wrapping to i)
            let left = ((i + 1)..k).map(|j| (tri(i, j, k), j)).max_by(|a, b| a.0.total_cmp(&b.0));
            let right = ((k + 1)..(n + i))
                .map(|l| l % n)
                .filter(|&l| l != i)
                .map(|l| (tri(i, k, l), l))
                .max_by(|a, b| a.0.total_cmp(&b.0));
            if let (Some((a1, j)), Some((a2, l))) = (left, right) {
                let area = a1 + a2;
                if best.map(|(b, _)| area > b).unwrap_or(true) {
                    best = Some((area, [i, j, k, l]));
                }
            }
        }
    }
    best.map(|(_, idx)| idx.map(|i| hull[i]))
}

/// Intersection of the infinite lines `p1 + t*d1` and `p2 + s*d2`.
pub fn line_intersection(
    p1: Point2<f32>,
    d1: nalgebra::Vector2<f32>,
    p2: Point2<f32>,
    d2: nalgebra::Vector2<f32>,
) -> Option<Point2<f32>> {
    let denom = d1.perp(&d2);
    if denom.abs() < 1e-9 {
        return None;
    }
    let t = (p2 - p1).perp(&d2) / denom;
    Some(p1 + d1 * t)
}

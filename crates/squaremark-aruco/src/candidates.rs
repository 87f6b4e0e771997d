//! Quadrilateral candidate extraction.
//!
//! Adaptive threshold (one pass per window size) → outer contours →
//! polygon approximation → shape filters → optional line-fit corner
//! refinement → near-duplicate removal.

use crate::contour::{find_outer_contours, Contour};
use crate::polygon::{approx_polygon, arc_length};
use crate::threshold::{adaptive_threshold, threshold_windows, IntegralImage};
use crate::DetectorParams;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use squaremark_core::{
    is_convex, line_intersection, min_corner_distance, normalize_quad_winding, perimeter,
    GrayImageView, Quad,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A convex quadrilateral that may be a marker border.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Clockwise corners starting with the one nearest the image origin.
    pub corners: Quad,
    /// Perimeter of `corners` in pixels.
    pub perimeter: f32,
}

/// Find marker-border candidates in a grayscale image.
///
/// Output is sorted by decreasing perimeter and contains no near-duplicates.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = image.width, height = image.height))
)]
pub fn extract_candidates(image: &GrayImageView<'_>, params: &DetectorParams) -> Vec<Candidate> {
    let max_dim = image.width.max(image.height) as f32;
    let min_len = params.min_marker_perimeter_rate * max_dim;
    let max_len = params.max_marker_perimeter_rate * max_dim;
    let integral = IntegralImage::new(image);

    let mut all = Vec::new();
    for window in threshold_windows(
        params.adaptive_thresh_win_size_min,
        params.adaptive_thresh_win_size_max,
        params.adaptive_thresh_win_size_step,
    ) {
        let mask = adaptive_threshold(image, &integral, window, params.adaptive_thresh_constant);
        let contours = find_outer_contours(&mask, min_len, max_len);
        let before = all.len();
        all.extend(
            contours
                .iter()
                .filter_map(|c| quad_from_contour(c, image, params)),
        );
        log::debug!(
            "window {window}: {} contours, {} quads",
            contours.len(),
            all.len() - before
        );
    }

    let merged = remove_near_duplicates(all, params.min_marker_distance_rate);
    log::debug!("{} candidates after duplicate removal", merged.len());
    merged
}

fn quad_from_contour(
    contour: &Contour,
    image: &GrayImageView<'_>,
    params: &DetectorParams,
) -> Option<Candidate> {
    let pts: Vec<Point2<f32>> = contour
        .points
        .iter()
        .map(|&(x, y)| Point2::new(x as f32, y as f32))
        .collect();
    let eps = params.polygonal_approx_accuracy_rate * arc_length(&pts);
    let idx = approx_polygon(&pts, eps);
    if idx.len() != 4 {
        return None;
    }
    let idx = [idx[0], idx[1], idx[2], idx[3]];
    let mut quad: Quad = idx.map(|i| pts[i]);
    if !is_convex(&quad) {
        return None;
    }

    let per = perimeter(&quad);
    if min_corner_distance(&quad) < params.min_corner_distance_rate * per {
        return None;
    }

    if params.refine_corners {
        if let Some(refined) = refine_with_lines(&pts, &idx, &quad) {
            quad = refined;
        }
    }

    let d = params.min_distance_to_border;
    let (w, h) = (image.width as f32, image.height as f32);
    if quad
        .iter()
        .any(|p| p.x < d || p.y < d || p.x > w - 1.0 - d || p.y > h - 1.0 - d)
    {
        return None;
    }

    let corners = normalize_quad_winding(quad);
    Some(Candidate {
        corners,
        perimeter: perimeter(&corners),
    })
}

/// Total-least-squares line through the points: centroid and direction.
fn fit_line(points: &[Point2<f32>]) -> Option<(Point2<f32>, Vector2<f32>)> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.x).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f32>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0f32, 0.0f32, 0.0f32);
    for p in points {
        let (dx, dy) = (p.x - cx, p.y - cy);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    Some((Point2::new(cx, cy), Vector2::new(angle.cos(), angle.sin())))
}

/// Intersect lines fitted to the contour points of each side.
///
/// Contour points are centers of the outermost dark pixels, so each line
/// is moved half a pixel outwards onto the dark/light edge.
fn refine_with_lines(pts: &[Point2<f32>], idx: &[usize; 4], quad: &Quad) -> Option<Quad> {
    let n = pts.len();
    let outward = if squaremark_core::signed_area(quad) >= 0.0 {
        1.0
    } else {
        -1.0
    };

    let mut lines = [(Point2::origin(), Vector2::zeros()); 4];
    for k in 0..4 {
        let (s, e) = (idx[k], idx[(k + 1) % 4]);
        let len = (e + n - s) % n;
        // skip the rounded ends near the corners
        let trim = len / 8;
        let side: Vec<Point2<f32>> = (trim..=len.saturating_sub(trim))
            .map(|j| pts[(s + j) % n])
            .collect();
        let (p, mut dir) = fit_line(&side)?;
        let chord = quad[(k + 1) % 4] - quad[k];
        if dir.dot(&chord) < 0.0 {
            dir = -dir;
        }
        let normal = Vector2::new(dir.y, -dir.x) * outward;
        lines[k] = (p + normal * 0.5, dir);
    }

    let mut out = *quad;
    for k in 0..4 {
        let (p0, d0) = lines[(k + 3) % 4];
        let (p1, d1) = lines[k];
        let c = line_intersection(p0, d0, p1, d1)?;
        // a corner that jumps far is a fitting failure
        if (c - quad[k]).norm() > 0.1 * (quad[(k + 1) % 4] - quad[k]).norm().max(4.0) + 2.0 {
            return None;
        }
        out[k] = c;
    }
    Some(out)
}

/// Mean corner distance between two quads under the best cyclic alignment.
fn quad_distance(a: &Quad, b: &Quad) -> f32 {
    (0..4)
        .map(|shift| {
            (0..4)
                .map(|i| (a[i] - b[(i + shift) % 4]).norm())
                .sum::<f32>()
                / 4.0
        })
        .fold(f32::INFINITY, f32::min)
}

/// Drop candidates that nearly coincide with a larger one.
fn remove_near_duplicates(mut cands: Vec<Candidate>, rate: f32) -> Vec<Candidate> {
    cands.sort_by(|a, b| b.perimeter.total_cmp(&a.perimeter));
    let mut kept: Vec<Candidate> = Vec::with_capacity(cands.len());
    for c in cands {
        let dup = kept.iter().any(|k| {
            let limit = rate * k.perimeter.min(c.perimeter);
            quad_distance(&k.corners, &c.corners) < limit
        });
        if !dup {
            kept.push(c);
        }
    }
    kept
}

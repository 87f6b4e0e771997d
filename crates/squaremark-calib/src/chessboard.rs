//! Chessboard grids: object points and ordering of raw corner detections.
//!
//! Corner detection itself lives with the image plumbing; this module turns
//! an unordered set of X-junction positions into the row-major grid that
//! [`board_object_points`] describes.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use squaremark_core::{
    convex_hull, estimate_homography, homography_from_4pt, max_area_quad, normalize_quad_winding,
    Homography,
};

/// Inner-corner counts of a chessboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSize {
    /// Corners per row.
    pub cols: usize,
    /// Corners per column.
    pub rows: usize,
}

impl PatternSize {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessboardError {
    #[error("chessboard not found: {found} of {expected} corners matched")]
    NotFound { found: usize, expected: usize },
    #[error("pattern needs at least 2x2 inner corners, got {cols}x{rows}")]
    InvalidPattern { cols: usize, rows: usize },
}

/// Board-frame corner positions, row-major, `z = 0`.
pub fn board_object_points(pattern: PatternSize, square_size: f64) -> Vec<Point3<f64>> {
    (0..pattern.rows)
        .flat_map(|r| {
            (0..pattern.cols)
                .map(move |c| Point3::new(c as f64 * square_size, r as f64 * square_size, 0.0))
        })
        .collect()
}

/// Fraction of the local grid spacing within which a detection snaps to a
/// predicted corner.
const SNAP_FRACTION: f64 = 0.35;
const REFIT_ROUNDS: usize = 3;

struct GridFit {
    assigned: Vec<Option<usize>>,
    residual: f64,
}

impl GridFit {
    fn matched(&self) -> usize {
        self.assigned.iter().filter(|a| a.is_some()).count()
    }
}

/// Order detected chessboard corners into the row-major grid of `pattern`.
///
/// The four outermost detections (largest quad on the convex hull) anchor
/// the grid; the full grid is predicted through a homography, detections are
/// snapped to predictions, and the homography is refitted on the matches.
/// Extra detections inside the board are ignored; all `cols * rows` corners
/// must be matched.
pub fn order_chessboard_corners(
    points: &[Point2<f32>],
    pattern: PatternSize,
) -> Result<Vec<Point2<f32>>, ChessboardError> {
    if pattern.cols < 2 || pattern.rows < 2 {
        return Err(ChessboardError::InvalidPattern {
            cols: pattern.cols,
            rows: pattern.rows,
        });
    }
    let expected = pattern.corner_count();
    if points.len() < expected {
        return Err(ChessboardError::NotFound {
            found: points.len(),
            expected,
        });
    }

    let hull = convex_hull(points);
    let Some(quad) = max_area_quad(&hull) else {
        return Err(ChessboardError::NotFound { found: 0, expected });
    };
    let q = normalize_quad_winding(quad).map(|p| Point2::new(p.x as f64, p.y as f64));
    let pts: Vec<Point2<f64>> = points
        .iter()
        .map(|p| Point2::new(p.x as f64, p.y as f64))
        .collect();

    let (c, r) = ((pattern.cols - 1) as f64, (pattern.rows - 1) as f64);
    let grid_corners = [
        Point2::new(0.0, 0.0),
        Point2::new(c, 0.0),
        Point2::new(c, r),
        Point2::new(0.0, r),
    ];
    // the grid origin either sits on the corner nearest the image origin or
    // one step clockwise from it (board seen rotated by a quarter turn)
    let hypotheses = [[q[0], q[1], q[2], q[3]], [q[1], q[2], q[3], q[0]]];

    let mut best: Option<GridFit> = None;
    for anchors in &hypotheses {
        let Some(h) = homography_from_4pt(&grid_corners, anchors) else {
            continue;
        };
        let fit = fit_grid(&pts, pattern, h);
        log::debug!(
            "chessboard hypothesis: {} of {} corners, residual {:.3}",
            fit.matched(),
            expected,
            fit.residual
        );
        let better = match &best {
            None => true,
            Some(b) => {
                fit.matched() > b.matched()
                    || (fit.matched() == b.matched() && fit.residual < b.residual)
            }
        };
        if better {
            best = Some(fit);
        }
    }

    let Some(best) = best else {
        return Err(ChessboardError::NotFound { found: 0, expected });
    };
    let found = best.matched();
    best.assigned
        .iter()
        .map(|a| a.map(|i| points[i]))
        .collect::<Option<Vec<_>>>()
        .ok_or(ChessboardError::NotFound { found, expected })
}

fn grid_point(c: usize, r: usize) -> Point2<f64> {
    Point2::new(c as f64, r as f64)
}

fn fit_grid(points: &[Point2<f64>], pattern: PatternSize, h: Homography) -> GridFit {
    let mut fit = snap(points, pattern, &h);
    for _ in 0..REFIT_ROUNDS {
        let (src, dst): (Vec<_>, Vec<_>) = fit
            .assigned
            .iter()
            .enumerate()
            .filter_map(|(k, a)| {
                a.map(|i| (grid_point(k % pattern.cols, k / pattern.cols), points[i]))
            })
            .unzip();
        let Some(refit) = estimate_homography(&src, &dst) else {
            break;
        };
        let next = snap(points, pattern, &refit);
        if next.matched() < fit.matched() {
            break;
        }
        let stable = next.assigned == fit.assigned;
        fit = next;
        if stable {
            break;
        }
    }
    fit
}

/// Assign each predicted grid corner its nearest detection within the snap
/// radius; a detection claimed twice keeps only the closer corner.
fn snap(points: &[Point2<f64>], pattern: PatternSize, h: &Homography) -> GridFit {
    let n = pattern.corner_count();
    let mut assigned: Vec<Option<(usize, f64)>> = vec![None; n];
    let mut owner: Vec<Option<usize>> = vec![None; points.len()];

    for k in 0..n {
        let (c, r) = (k % pattern.cols, k / pattern.cols);
        let pred = h.apply(grid_point(c, r));
        let dc = if c + 1 < pattern.cols { c + 1 } else { c - 1 };
        let dr = if r + 1 < pattern.rows { r + 1 } else { r - 1 };
        let spacing = (h.apply(grid_point(dc, r)) - pred)
            .norm()
            .min((h.apply(grid_point(c, dr)) - pred).norm());
        let tol = SNAP_FRACTION * spacing;

        let nearest = points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - pred).norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((i, d)) = nearest else {
            continue;
        };
        if d.is_nan() || d > tol {
            continue;
        }
        match owner[i] {
            Some(prev) if assigned[prev].is_some_and(|(_, pd)| pd <= d) => {}
            Some(prev) => {
                assigned[prev] = None;
                owner[i] = Some(k);
                assigned[k] = Some((i, d));
            }
            None => {
                owner[i] = Some(k);
                assigned[k] = Some((i, d));
            }
        }
    }

    let dists: Vec<f64> = assigned.iter().flatten().map(|&(_, d)| d).collect();
    let residual = if dists.is_empty() {
        f64::INFINITY
    } else {
        dists.iter().sum::<f64>() / dists.len() as f64
    };
    GridFit {
        assigned: assigned.into_iter().map(|a| a.map(|(i, _)| i)).collect(),
        residual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Corners of a `cols x rows` grid seen through a mild perspective.
    fn projected_grid(pattern: PatternSize) -> Vec<Point2<f32>> {
        let (c, r) = ((pattern.cols - 1) as f64, (pattern.rows - 1) as f64);
        let h = homography_from_4pt(
            &[
                Point2::new(0.0, 0.0),
                Point2::new(c, 0.0),
                Point2::new(c, r),
                Point2::new(0.0, r),
            ],
            &[
                Point2::new(100.0, 80.0),
                Point2::new(420.0, 95.0),
                Point2::new(440.0, 330.0),
                Point2::new(90.0, 310.0),
            ],
        )
        .unwrap();
        board_object_points(pattern, 1.0)
            .iter()
            .map(|p| h.apply_f32(Point2::new(p.x as f32, p.y as f32)))
            .collect()
    }

    /// Deterministic shuffle.
    fn scrambled(points: &[Point2<f32>]) -> Vec<Point2<f32>> {
        let n = points.len();
        (0..n).map(|i| points[(i * 7 + 3) % n]).collect()
    }

    #[test]
    fn object_points_are_row_major() {
        let pts = board_object_points(PatternSize::new(3, 2), 0.5);
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Point3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[3], Point3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn orders_scrambled_perspective_grid() {
        let pattern = PatternSize::new(9, 6);
        let truth = projected_grid(pattern);
        let mut input = scrambled(&truth);
        // stray detection in the middle of a square
        let stray = Point2::new(
            (truth[0].x + truth[10].x) * 0.5,
            (truth[0].y + truth[10].y) * 0.5,
        );
        input.push(stray);
        let ordered = order_chessboard_corners(&input, pattern).unwrap();
        assert_eq!(ordered, truth);
    }

    #[test]
    fn orders_quarter_turned_grid() {
        let pattern = PatternSize::new(5, 4);
        let truth: Vec<Point2<f32>> = (0..4)
            .flat_map(|r| {
                (0..5).map(move |c| Point2::new(300.0 - 30.0 * r as f32, 50.0 + 30.0 * c as f32))
            })
            .collect();
        let ordered = order_chessboard_corners(&scrambled(&truth), pattern).unwrap();
        assert_eq!(ordered, truth);
    }

    #[test]
    fn missing_corner_is_not_found() {
        let pattern = PatternSize::new(6, 5);
        let mut pts = projected_grid(pattern);
        let centre = pts[14];
        pts.remove(14);
        // keep the count, but the replacement is far from any corner
        pts.push(Point2::new(centre.x + 32.0, centre.y + 28.0));
        assert_eq!(
            order_chessboard_corners(&pts, pattern),
            Err(ChessboardError::NotFound {
                found: 29,
                expected: 30
            })
        );
        assert_eq!(
            order_chessboard_corners(&pts[..10], pattern),
            Err(ChessboardError::NotFound {
                found: 10,
                expected: 30
            })
        );
    }
}

//! Planar perspective-n-point: homography initialization refined by LM.

use crate::camera::{project_with, CameraIntrinsics};
use crate::lm::{solve_least_squares, LeastSquares, LmSettings};
use nalgebra::{
    DVector, Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};
use squaremark_core::{estimate_homography, Quad};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Rigid transform from an object frame into the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Rotation as a Rodrigues vector (axis times angle in radians).
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_rotation(rotation: &Rotation3<f64>, tvec: Vector3<f64>) -> Self {
        // the quaternion route stays well defined at a half turn
        let rvec = UnitQuaternion::from_rotation_matrix(rotation).scaled_axis();
        Self { rvec, tvec }
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::new(self.rvec)
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.tvec),
            UnitQuaternion::new(self.rvec),
        )
    }

    /// Map an object-frame point into camera coordinates.
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation() * p + self.tvec
    }

    fn to_params(self) -> [f64; 6] {
        [
            self.rvec.x, self.rvec.y, self.rvec.z, self.tvec.x, self.tvec.y, self.tvec.z,
        ]
    }

    fn from_params(p: &[f64]) -> Self {
        Self {
            rvec: Vector3::new(p[0], p[1], p[2]),
            tvec: Vector3::new(p[3], p[4], p[5]),
        }
    }
}

/// Pose estimation failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("marker length must be positive and finite, got {0}")]
    InvalidMarkerLength(f64),
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("{object} object points but {image} image points (need at least 4)")]
    MismatchedPoints { object: usize, image: usize },
    #[error("object points must lie on the z = 0 plane")]
    NonPlanarObject,
}

/// Refinement settings for [`estimate_marker_pose`] and [`solve_planar_pnp`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseOptions {
    /// LM patience; the solver stops after `max_iterations * 7` evaluations.
    pub max_iterations: usize,
    /// Relative cost, step and gradient tolerance for LM convergence.
    pub epsilon: f64,
}

impl Default for PoseOptions {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            epsilon: 1e-10,
        }
    }
}

/// Corners of a centered square marker of side `length` in its own frame,
/// matching the detector's corner order (top-left first, clockwise on screen).
pub fn marker_object_points(length: f64) -> [Point3<f64>; 4] {
    let h = length * 0.5;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

/// Smallest triangle area among any three corners, relative to the squared
/// mean side. A square gives 0.5.
fn collinearity_ratio(corners: &Quad) -> f64 {
    let p = corners.map(|c| Point2::new(c.x as f64, c.y as f64));
    let side = (0..4).map(|i| (p[(i + 1) % 4] - p[i]).norm()).sum::<f64>() / 4.0;
    if side.is_nan() || side <= 0.0 {
        return 0.0;
    }
    let mut min_area = f64::INFINITY;
    for skip in 0..4 {
        let tri: Vec<Point2<f64>> = (0..4).filter(|&i| i != skip).map(|i| p[i]).collect();
        let area = 0.5 * (tri[1] - tri[0]).perp(&(tri[2] - tri[0])).abs();
        min_area = min_area.min(area);
    }
    min_area / (side * side)
}

const MIN_COLLINEARITY_RATIO: f64 = 1e-3;

/// Estimate the pose of one square marker of side `marker_length`.
///
/// `corners` are detector output in pixels: the marker's own top-left first,
/// clockwise on screen. Distortion from `intrinsics` is honoured.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn estimate_marker_pose(
    corners: &Quad,
    marker_length: f64,
    intrinsics: &CameraIntrinsics,
    options: &PoseOptions,
) -> Result<Pose, PoseError> {
    if !(marker_length.is_finite() && marker_length > 0.0) {
        return Err(PoseError::InvalidMarkerLength(marker_length));
    }
    if corners.iter().any(|c| !(c.x.is_finite() && c.y.is_finite()))
        || collinearity_ratio(corners) < MIN_COLLINEARITY_RATIO
    {
        return Err(PoseError::Degenerate);
    }
    let object = marker_object_points(marker_length);
    let image = corners.map(|c| Point2::new(c.x as f64, c.y as f64));
    solve_planar_pnp(&object, &image, intrinsics, options)
}

/// Batch form of [`estimate_marker_pose`]; one result per quad, same order.
pub fn estimate_marker_poses(
    corners: &[Quad],
    marker_length: f64,
    intrinsics: &CameraIntrinsics,
    options: &PoseOptions,
) -> Vec<Result<Pose, PoseError>> {
    corners
        .iter()
        .map(|q| estimate_marker_pose(q, marker_length, intrinsics, options))
        .collect()
}

/// Relative spread check: the smaller principal axis of the point cloud
/// must not vanish against the larger one.
fn is_spread(points: impl Iterator<Item = (f64, f64)> + Clone) -> bool {
    let n = points.clone().count() as f64;
    let (mx, my) = points
        .clone()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x / n, ay + y / n));
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in points {
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
        sxy += (x - mx) * (y - my);
    }
    let tr = sxx + syy;
    let det = sxx * syy - sxy * sxy;
    tr > 0.0 && det / (tr * tr) > 1e-9
}

/// Pose of a planar object (all `z == 0`) from `N >= 4` correspondences.
pub fn solve_planar_pnp(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
    options: &PoseOptions,
) -> Result<Pose, PoseError> {
    if object.len() != image.len() || object.len() < 4 {
        return Err(PoseError::MismatchedPoints {
            object: object.len(),
            image: image.len(),
        });
    }
    let scale = object
        .iter()
        .map(|p| p.x.abs().max(p.y.abs()))
        .fold(0.0, f64::max);
    if object.iter().any(|p| p.z.abs() > 1e-9 * scale.max(1.0)) {
        return Err(PoseError::NonPlanarObject);
    }
    if !is_spread(object.iter().map(|p| (p.x, p.y))) || !is_spread(image.iter().map(|p| (p.x, p.y)))
    {
        return Err(PoseError::Degenerate);
    }

    let plane: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let normalized: Vec<Point2<f64>> = image.iter().map(|&p| intrinsics.normalize_pixel(p)).collect();
    let h = estimate_homography(&plane, &normalized).ok_or(PoseError::Degenerate)?;
    let init = pose_from_homography(&h.h).ok_or(PoseError::Degenerate)?;

    let problem = PnpProblem {
        object,
        image,
        k: [intrinsics.fx(), intrinsics.fy(), intrinsics.cx(), intrinsics.cy()],
        dist: intrinsics.distortion(),
    };
    let report = solve_least_squares(
        &problem,
        DVector::from_row_slice(&init.to_params()),
        LmSettings {
            max_iterations: options.max_iterations,
            epsilon: options.epsilon,
        },
    );
    let pose = Pose::from_params(report.x.as_slice());
    log::debug!(
        "pnp: {} points, rms {:.4} -> {:.4} px in {} evaluations",
        object.len(),
        (report.initial_cost / object.len() as f64).sqrt(),
        (report.final_cost / object.len() as f64).sqrt(),
        report.evaluations
    );
    if !(pose.rvec.iter().chain(pose.tvec.iter()).all(|v| v.is_finite())) || pose.tvec.z <= 0.0 {
        return Err(PoseError::Degenerate);
    }
    Ok(pose)
}

/// Decompose a plane-to-normalized-image homography into a pose with the
/// plane in front of the camera.
pub(crate) fn pose_from_homography(h: &Matrix3<f64>) -> Option<Pose> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();
    let norm = 0.5 * (h1.norm() + h2.norm());
    if norm.is_nan() || norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r.svd(true, true);
    let (mut u, v_t) = (svd.u?, svd.v_t?);
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let rot = Rotation3::from_matrix_unchecked(u * v_t);
    let pose = Pose::from_rotation(&rot, h3 * lambda);
    pose.tvec.iter().all(|v| v.is_finite()).then_some(pose)
}

/// Pixels of `object` seen from `pose`; `None` for points behind the camera.
pub fn project_points(
    object: &[Point3<f64>],
    pose: &Pose,
    intrinsics: &CameraIntrinsics,
) -> Vec<Option<Point2<f64>>> {
    let rot = pose.rotation();
    object
        .iter()
        .map(|p| intrinsics.project(&(rot * p + pose.tvec)))
        .collect()
}

/// Root-mean-square pixel distance between observed and reprojected points.
///
/// Points behind the camera count as infinitely far.
pub fn reprojection_rms(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    pose: &Pose,
    intrinsics: &CameraIntrinsics,
) -> f64 {
    if object.is_empty() {
        return 0.0;
    }
    let sum: f64 = project_points(object, pose, intrinsics)
        .iter()
        .zip(image)
        .map(|(p, q)| p.map_or(f64::INFINITY, |p| (p - q).norm_squared()))
        .sum();
    (sum / object.len() as f64).sqrt()
}

/// Residual assigned to a point that projects behind the camera.
pub(crate) const BEHIND_CAMERA_RESIDUAL: f64 = 1e6;

struct PnpProblem<'a> {
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
    k: [f64; 4],
    dist: &'a [f64],
}

impl LeastSquares for PnpProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let pose = Pose::from_params(x.as_slice());
        let rot = pose.rotation();
        let mut r = DVector::zeros(2 * self.object.len());
        for (i, (p, q)) in self.object.iter().zip(self.image).enumerate() {
            match project_with(&self.k, self.dist, &(rot * p + pose.tvec)) {
                Some(px) => {
                    r[2 * i] = px.x - q.x;
                    r[2 * i + 1] = px.y - q.y;
                }
                None => {
                    r[2 * i] = BEHIND_CAMERA_RESIDUAL;
                    r[2 * i + 1] = BEHIND_CAMERA_RESIDUAL;
                }
            }
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::pinhole(800.0, 800.0, 320.0, 240.0).unwrap()
    }

    fn project_quad(pose: &Pose, cam: &CameraIntrinsics, length: f64) -> Quad {
        let pts = project_points(&marker_object_points(length), pose, cam);
        std::array::from_fn(|i| {
            let p = pts[i].unwrap();
            Point2::new(p.x as f32, p.y as f32)
        })
    }

    #[test]
    fn frontal_marker_depth_matches_pinhole_ratio() {
        let cam = camera();
        let corners: Quad = [
            Point2::new(280.0, 200.0),
            Point2::new(360.0, 200.0),
            Point2::new(360.0, 280.0),
            Point2::new(280.0, 280.0),
        ];
        let pose = estimate_marker_pose(&corners, 0.1, &cam, &PoseOptions::default()).unwrap();
        // z = f * L / side = 800 * 0.1 / 80
        assert_relative_eq!(pose.tvec.z, 1.0, max_relative = 0.01);
        assert!(pose.tvec.x.abs() < 1e-6 && pose.tvec.y.abs() < 1e-6);
        // marker normal (object +z) faces the camera
        let normal = pose.rotation() * Vector3::z();
        assert!(normal.z < -0.99);
    }

    #[test]
    fn recovers_tilted_pose_with_distortion() {
        let cam =
            CameraIntrinsics::new(900.0, 880.0, 330.0, 250.0, vec![-0.2, 0.05, 0.001, -0.001, 0.0])
                .unwrap();
        let truth = Pose::new(Vector3::new(2.9, 0.3, -0.2), Vector3::new(0.05, -0.03, 0.8));
        let corners = project_quad(&truth, &cam, 0.12);
        let pose = estimate_marker_pose(&corners, 0.12, &cam, &PoseOptions::default()).unwrap();
        assert_relative_eq!(pose.tvec, truth.tvec, epsilon = 2e-3);
        let diff = pose.rotation().rotation_to(&truth.rotation()).angle();
        assert!(diff < 0.02, "rotation differs by {diff} rad");
    }

    #[test]
    fn rejects_bad_inputs() {
        let cam = camera();
        let square: Quad = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        for len in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                estimate_marker_pose(&square, len, &cam, &PoseOptions::default()),
                Err(PoseError::InvalidMarkerLength(_))
            ));
        }
        let collinear: Quad = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(30.0, 0.01),
        ];
        assert_eq!(
            estimate_marker_pose(&collinear, 0.1, &cam, &PoseOptions::default()),
            Err(PoseError::Degenerate)
        );
        let three_in_line: Quad = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(10.0, 10.0),
        ];
        assert_eq!(
            estimate_marker_pose(&three_in_line, 0.1, &cam, &PoseOptions::default()),
            Err(PoseError::Degenerate)
        );
    }

    #[test]
    fn half_turn_rotation_round_trips() {
        let rot = Rotation3::from_matrix_unchecked(Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, -1.0, 0.0, //
            0.0, 0.0, -1.0,
        ));
        let pose = Pose::from_rotation(&rot, Vector3::zeros());
        assert_relative_eq!(pose.rvec.norm(), std::f64::consts::PI, epsilon = 1e-9);
        assert_relative_eq!(pose.rotation().into_inner(), rot.into_inner(), epsilon = 1e-9);
    }

    #[test]
    fn isometry_agrees_with_transform_point() {
        let pose = Pose::new(Vector3::new(0.3, -0.2, 0.9), Vector3::new(0.1, 0.2, 1.5));
        let p = Point3::new(0.04, -0.03, 0.0);
        assert_relative_eq!(pose.to_isometry() * p, pose.transform_point(&p), epsilon = 1e-12);
    }
}

//! Pinhole camera intrinsics with OpenCV-style lens distortion.
//!
//! Distortion coefficients follow the usual ordering
//! `k1, k2, p1, p2[, k3[, k4, k5, k6]]`; pixel coordinates are
//! `u = fx * x' + cx`, `v = fy * y' + cy` where `(x', y')` is the distorted
//! normalized point.

use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Invalid camera parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IntrinsicsError {
    #[error("focal lengths must be positive and finite (fx={fx}, fy={fy})")]
    NonPositiveFocal { fx: f64, fy: f64 },
    #[error("distortion vector must have 4, 5 or 8 coefficients, got {0}")]
    DistortionLength(usize),
    #[error("camera matrix entries must be finite")]
    NonFinite,
}

/// Distortion coefficient layouts, named after their coefficient count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    /// `k1, k2, p1, p2`
    Radial4,
    /// `k1, k2, p1, p2, k3`
    #[default]
    Radial5,
    /// `k1, k2, p1, p2, k3, k4, k5, k6`
    Rational8,
}

impl DistortionModel {
    pub fn coefficient_count(self) -> usize {
        match self {
            Self::Radial4 => 4,
            Self::Radial5 => 5,
            Self::Rational8 => 8,
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            4 => Some(Self::Radial4),
            5 => Some(Self::Radial5),
            8 => Some(Self::Rational8),
            _ => None,
        }
    }
}

/// Camera matrix `K` plus distortion coefficients.
///
/// `fx, fy > 0` holds for every value of this type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IntrinsicsRepr")]
pub struct CameraIntrinsics {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: Vec<f64>,
}

#[derive(Deserialize)]
struct IntrinsicsRepr {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: Vec<f64>,
}

impl TryFrom<IntrinsicsRepr> for CameraIntrinsics {
    type Error = IntrinsicsError;

    fn try_from(r: IntrinsicsRepr) -> Result<Self, Self::Error> {
        Self::new(r.fx, r.fy, r.cx, r.cy, r.distortion)
    }
}

impl CameraIntrinsics {
    pub fn new(
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        distortion: Vec<f64>,
    ) -> Result<Self, IntrinsicsError> {
        if !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0) {
            return Err(IntrinsicsError::NonPositiveFocal { fx, fy });
        }
        if !(cx.is_finite() && cy.is_finite()) || distortion.iter().any(|d| !d.is_finite()) {
            return Err(IntrinsicsError::NonFinite);
        }
        if DistortionModel::from_len(distortion.len()).is_none() {
            return Err(IntrinsicsError::DistortionLength(distortion.len()));
        }
        Ok(Self {
            fx,
            fy,
            cx,
            cy,
            distortion,
        })
    }

    /// Ideal pinhole camera (five zero distortion coefficients).
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, IntrinsicsError> {
        Self::new(fx, fy, cx, cy, vec![0.0; 5])
    }

    /// Build from a camera matrix; skew is ignored.
    pub fn from_camera_matrix(
        k: &Matrix3<f64>,
        distortion: Vec<f64>,
    ) -> Result<Self, IntrinsicsError> {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)], distortion)
    }

    pub fn fx(&self) -> f64 {
        self.fx
    }

    pub fn fy(&self) -> f64 {
        self.fy
    }

    pub fn cx(&self) -> f64 {
        self.cx
    }

    pub fn cy(&self) -> f64 {
        self.cy
    }

    pub fn distortion(&self) -> &[f64] {
        &self.distortion
    }

    pub fn distortion_model(&self) -> DistortionModel {
        DistortionModel::from_len(self.distortion.len()).unwrap_or_default()
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Apply lens distortion to an undistorted normalized point.
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        distort_normalized(&self.distortion, n)
    }

    /// Invert [`Self::distort`] by fixed-point iteration.
    pub fn undistort(&self, n_dist: Vector2<f64>) -> Vector2<f64> {
        undistort_normalized(&self.distortion, n_dist)
    }

    /// Project a point given in camera coordinates to pixels.
    ///
    /// Returns `None` for points on or behind the camera plane.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        project_with(&[self.fx, self.fy, self.cx, self.cy], &self.distortion, p)
    }

    /// Pixel to undistorted normalized coordinates.
    pub fn normalize_pixel(&self, px: Point2<f64>) -> Point2<f64> {
        let n = Vector2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy);
        Point2::from(self.undistort(n))
    }

    /// Remove lens distortion from a pixel, keeping the camera matrix.
    pub fn undistort_pixel(&self, px: Point2<f64>) -> Point2<f64> {
        let n = self.normalize_pixel(px);
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }
}

fn coeff(d: &[f64], i: usize) -> f64 {
    d.get(i).copied().unwrap_or(0.0)
}

pub(crate) fn distort_normalized(d: &[f64], n: Vector2<f64>) -> Vector2<f64> {
    let (k1, k2, p1, p2, k3) = (coeff(d, 0), coeff(d, 1), coeff(d, 2), coeff(d, 3), coeff(d, 4));
    let (k4, k5, k6) = (coeff(d, 5), coeff(d, 6), coeff(d, 7));
    let (x, y) = (n.x, n.y);
    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let radial = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);
    Vector2::new(
        x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
        y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
    )
}

const UNDISTORT_ITERS: usize = 20;

pub(crate) fn undistort_normalized(d: &[f64], n_dist: Vector2<f64>) -> Vector2<f64> {
    if d.iter().all(|&c| c == 0.0) {
        return n_dist;
    }
    let (k1, k2, p1, p2, k3) = (coeff(d, 0), coeff(d, 1), coeff(d, 2), coeff(d, 3), coeff(d, 4));
    let (k4, k5, k6) = (coeff(d, 5), coeff(d, 6), coeff(d, 7));

    let (x0, y0) = (n_dist.x, n_dist.y);
    let (mut x, mut y) = (x0, y0);
    for _ in 0..UNDISTORT_ITERS {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let icdist = (1.0 + k4 * r2 + k5 * r4 + k6 * r6) / (1.0 + k1 * r2 + k2 * r4 + k3 * r6);
        if !icdist.is_finite() || icdist < 0.0 {
            return n_dist;
        }
        let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        let (nx, ny) = ((x0 - dx) * icdist, (y0 - dy) * icdist);
        let step = (nx - x).abs() + (ny - y).abs();
        x = nx;
        y = ny;
        if step < 1e-14 {
            break;
        }
    }
    Vector2::new(x, y)
}

/// Projection with intrinsics `[fx, fy, cx, cy]` given as raw numbers, so
/// solvers can evaluate trial parameters without validating them.
pub(crate) fn project_with(k: &[f64; 4], d: &[f64], p: &Point3<f64>) -> Option<Point2<f64>> {
    if p.z <= f64::EPSILON {
        return None;
    }
    let n = distort_normalized(d, Vector2::new(p.x / p.z, p.y / p.z));
    Some(Point2::new(k[0] * n.x + k[2], k[1] * n.y + k[3]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            CameraIntrinsics::pinhole(0.0, 500.0, 320.0, 240.0),
            Err(IntrinsicsError::NonPositiveFocal { .. })
        ));
        assert_eq!(
            CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0, vec![0.0; 6]),
            Err(IntrinsicsError::DistortionLength(6))
        );
    }

    #[test]
    fn projects_through_camera_matrix() {
        let cam = CameraIntrinsics::pinhole(800.0, 780.0, 320.0, 240.0).unwrap();
        let px = cam.project(&Point3::new(0.1, -0.2, 2.0)).unwrap();
        assert_relative_eq!(px.x, 800.0 * 0.05 + 320.0);
        assert_relative_eq!(px.y, 780.0 * -0.1 + 240.0);
        assert!(cam.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn undistort_inverts_distort() {
        let models = [
            vec![-0.25, 0.08, 0.001, -0.0005],
            vec![-0.28, 0.1, 0.0008, 0.0012, -0.02],
            vec![0.2, -0.1, 0.001, 0.001, 0.01, 0.3, -0.05, 0.02],
        ];
        for d in models {
            let cam = CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0, d).unwrap();
            for &(x, y) in &[(0.0, 0.0), (0.2, -0.1), (-0.35, 0.25)] {
                let n = Vector2::new(x, y);
                let back = cam.undistort(cam.distort(n));
                assert_relative_eq!(back, n, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn undistort_pixel_is_identity_without_distortion() {
        let cam = CameraIntrinsics::pinhole(500.0, 500.0, 100.0, 80.0).unwrap();
        let p = Point2::new(37.5, 150.25);
        assert_relative_eq!(cam.undistort_pixel(p), p, epsilon = 1e-12);
    }

    #[test]
    fn deserialization_validates() {
        let ok = r#"{"fx":500,"fy":500,"cx":320,"cy":240,"distortion":[0,0,0,0]}"#;
        let cam: CameraIntrinsics = serde_json::from_str(ok).unwrap();
        assert_eq!(cam.distortion_model(), DistortionModel::Radial4);

        let bad = r#"{"fx":-1,"fy":500,"cx":320,"cy":240,"distortion":[0,0,0,0,0]}"#;
        assert!(serde_json::from_str::<CameraIntrinsics>(bad).is_err());
    }
}

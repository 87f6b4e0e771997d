//! Multi-view planar camera calibration.
//!
//! The camera matrix is initialized from per-view homographies (principal
//! point at the image center, focal lengths from the orthogonality and
//! equal-norm constraints on the rotation columns), each view's pose from a
//! planar PnP, and then intrinsics, distortion and all poses are refined
//! jointly with Levenberg–Marquardt on the pixel reprojection error.

use crate::camera::{project_with, CameraIntrinsics, DistortionModel};
use crate::lm::{diff_step, solve_least_squares, LeastSquares, LmSettings};
use crate::pose::{solve_planar_pnp, Pose, PoseOptions, BEHIND_CAMERA_RESIDUAL};
use nalgebra::{DMatrix, DVector, Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use squaremark_core::estimate_homography;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One view of a planar target: board points (`z == 0`) and their pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub object_points: Vec<Point3<f64>>,
    pub image_points: Vec<Point2<f64>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Calibration settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Which distortion coefficients are estimated.
    pub distortion_model: DistortionModel,
    /// Keep the principal point at the image center.
    pub fix_principal_point: bool,
    /// Force `p1 = p2 = 0`.
    pub zero_tangent_dist: bool,
    /// LM patience; the solver stops after `max_iterations * (params + 1)`
    /// residual evaluations.
    pub max_iterations: usize,
    /// Relative cost, step and gradient tolerance for LM convergence.
    pub epsilon: f64,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            distortion_model: DistortionModel::Radial5,
            fix_principal_point: false,
            zero_tangent_dist: false,
            max_iterations: 100,
            epsilon: 1e-12,
        }
    }
}

/// Output of [`calibrate_camera`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub intrinsics: CameraIntrinsics,
    /// Board-to-camera pose per sample, in input order.
    pub poses: Vec<Pose>,
    /// RMS reprojection error over all points, in pixels.
    pub rms: f64,
    /// RMS reprojection error per sample.
    pub per_view_errors: Vec<f64>,
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    pub converged: bool,
}

impl CalibrationResult {
    pub fn rvecs(&self) -> Vec<Vector3<f64>> {
        self.poses.iter().map(|p| p.rvec).collect()
    }

    pub fn tvecs(&self) -> Vec<Vector3<f64>> {
        self.poses.iter().map(|p| p.tvec).collect()
    }
}

/// Calibration failures. All of them abort the whole run.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrateError {
    #[error("need at least {required} calibration samples, got {got}")]
    InsufficientSamples { got: usize, required: usize },
    #[error("{equations} residuals cannot constrain {unknowns} parameters")]
    Underdetermined { equations: usize, unknowns: usize },
    #[error("sample {index}: {object} object points vs {image} image points (need at least 4)")]
    MismatchedSample {
        index: usize,
        object: usize,
        image: usize,
    },
    #[error("sample {index}: object points are not on the z = 0 plane")]
    NonPlanarTarget { index: usize },
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("could not initialize the pose of sample {index}")]
    InitializationFailed { index: usize },
    #[error("optimization diverged to an invalid camera")]
    Diverged,
}

const INTRINSIC_BASE: usize = 4;
const P1: usize = INTRINSIC_BASE + 2;
const P2: usize = INTRINSIC_BASE + 3;

/// Estimate camera intrinsics and per-view poses from planar target views.
///
/// Conditioning needs several views with varied board tilts; a single
/// fronto-parallel view cannot separate focal length from distance.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(views = samples.len()))
)]
pub fn calibrate_camera(
    samples: &[CalibrationSample],
    image_size: ImageSize,
    options: &CalibrationOptions,
) -> Result<CalibrationResult, CalibrateError> {
    validate(samples, image_size)?;

    let model = options.distortion_model;
    let n_intr = INTRINSIC_BASE + model.coefficient_count();
    let free: Vec<usize> = (0..n_intr)
        .filter(|&i| !(options.fix_principal_point && (i == 2 || i == 3)))
        .filter(|&i| !(options.zero_tangent_dist && (i == P1 || i == P2)))
        .collect();
    let equations: usize = samples.iter().map(|s| 2 * s.object_points.len()).sum();
    let unknowns = free.len() + 6 * samples.len();
    if equations < unknowns {
        return Err(CalibrateError::Underdetermined {
            equations,
            unknowns,
        });
    }

    let cx = (image_size.width as f64 - 1.0) * 0.5;
    let cy = (image_size.height as f64 - 1.0) * 0.5;
    let homographies = samples
        .iter()
        .enumerate()
        .map(|(index, s)| {
            let plane: Vec<Point2<f64>> = s
                .object_points
                .iter()
                .map(|p| Point2::new(p.x, p.y))
                .collect();
            estimate_homography(&plane, &s.image_points)
                .map(|h| h.h)
                .ok_or(CalibrateError::InitializationFailed { index })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let (fx, fy) = initial_focal(&homographies, cx, cy).unwrap_or_else(|| {
        let f = image_size.width.max(image_size.height) as f64;
        log::warn!("focal initialization is ill-conditioned, starting from f = {f}");
        (f, f)
    });
    log::debug!("initial camera: fx {fx:.2} fy {fy:.2} cx {cx:.2} cy {cy:.2}");

    let init_cam = CameraIntrinsics::new(fx, fy, cx, cy, vec![0.0; model.coefficient_count()])
        .map_err(|_| CalibrateError::InitializationFailed { index: 0 })?;
    let pose_opts = PoseOptions::default();
    let poses = samples
        .iter()
        .enumerate()
        .map(|(index, s)| {
            solve_planar_pnp(&s.object_points, &s.image_points, &init_cam, &pose_opts)
                .map_err(|_| CalibrateError::InitializationFailed { index })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut base = vec![0.0; n_intr];
    base[..INTRINSIC_BASE].copy_from_slice(&[fx, fy, cx, cy]);
    let problem = CalibProblem::new(samples, base, free);
    let x0 = problem.pack(&poses);
    let report = solve_least_squares(
        &problem,
        x0,
        LmSettings {
            max_iterations: options.max_iterations,
            epsilon: options.epsilon,
        },
    );

    let (full, poses) = problem.unpack(&report.x);
    let intrinsics = CameraIntrinsics::new(
        full[0],
        full[1],
        full[2],
        full[3],
        full[INTRINSIC_BASE..].to_vec(),
    )
    .map_err(|_| CalibrateError::Diverged)?;

    let residuals = problem.residuals(&report.x);
    let per_view_errors = problem
        .row_ranges()
        .map(|(start, len)| (residuals.rows(start, len).norm_squared() / (len / 2) as f64).sqrt())
        .collect();
    let rms = (report.final_cost / (equations / 2) as f64).sqrt();
    log::info!(
        "calibrated {} views in {} evaluations: rms {:.4} px, fx {:.2} fy {:.2} cx {:.2} cy {:.2}",
        samples.len(),
        report.evaluations,
        rms,
        intrinsics.fx(),
        intrinsics.fy(),
        intrinsics.cx(),
        intrinsics.cy()
    );
    if !report.converged {
        log::warn!("calibration solver stopped before converging");
    }

    Ok(CalibrationResult {
        intrinsics,
        poses,
        rms,
        per_view_errors,
        iterations: report.evaluations,
        converged: report.converged,
    })
}

fn validate(samples: &[CalibrationSample], size: ImageSize) -> Result<(), CalibrateError> {
    if size.width == 0 || size.height == 0 {
        return Err(CalibrateError::InvalidImageSize {
            width: size.width,
            height: size.height,
        });
    }
    if samples.is_empty() {
        return Err(CalibrateError::InsufficientSamples {
            got: 0,
            required: 1,
        });
    }
    for (index, s) in samples.iter().enumerate() {
        let (object, image) = (s.object_points.len(), s.image_points.len());
        if object != image || object < 4 {
            return Err(CalibrateError::MismatchedSample {
                index,
                object,
                image,
            });
        }
        if s.object_points.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(CalibrateError::NonPlanarTarget { index });
        }
    }
    Ok(())
}

/// Focal lengths from plane homographies with a known principal point.
///
/// For `H' = T(-c) H`, the columns `h1, h2` satisfy `r1 · r2 = 0` and
/// `|r1| = |r2|` with `r = K⁻¹ h`; both are linear in `(1/fx², 1/fy²)`.
fn initial_focal(homographies: &[Matrix3<f64>], cx: f64, cy: f64) -> Option<(f64, f64)> {
    let shift = Matrix3::new(
        1.0, 0.0, -cx, //
        0.0, 1.0, -cy, //
        0.0, 0.0, 1.0,
    );
    let mut a = DMatrix::zeros(2 * homographies.len(), 2);
    let mut b = DVector::zeros(2 * homographies.len());
    for (i, h) in homographies.iter().enumerate() {
        let h = shift * h;
        let (h1, h2) = (h.column(0).into_owned(), h.column(1).into_owned());
        let c1 = h1.normalize();
        let c2 = h2.normalize();
        let d1 = (h1 + h2).normalize();
        let d2 = (h1 - h2).normalize();
        a[(2 * i, 0)] = c1.x * c2.x;
        a[(2 * i, 1)] = c1.y * c2.y;
        b[2 * i] = -c1.z * c2.z;
        a[(2 * i + 1, 0)] = d1.x * d2.x;
        a[(2 * i + 1, 1)] = d1.y * d2.y;
        b[2 * i + 1] = -d1.z * d2.z;
    }
    let f = a.svd(true, true).solve(&b, 1e-12).ok()?;
    let (ix, iy) = (f[0], f[1]);
    if !(ix > 0.0 && iy > 0.0 && ix.is_finite() && iy.is_finite()) {
        return None;
    }
    Some((1.0 / ix.sqrt(), 1.0 / iy.sqrt()))
}

/// Joint problem over the free intrinsics and six pose parameters per view.
struct CalibProblem<'a> {
    samples: &'a [CalibrationSample],
    base: Vec<f64>,
    free: Vec<usize>,
    offsets: Vec<usize>,
    rows: usize,
}

impl<'a> CalibProblem<'a> {
    fn new(samples: &'a [CalibrationSample], base: Vec<f64>, free: Vec<usize>) -> Self {
        let mut offsets = Vec::with_capacity(samples.len());
        let mut rows = 0;
        for s in samples {
            offsets.push(rows);
            rows += 2 * s.object_points.len();
        }
        Self {
            samples,
            base,
            free,
            offsets,
            rows,
        }
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.free.len() + 6 * view
    }

    fn row_ranges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.offsets
            .iter()
            .zip(self.samples)
            .map(|(&start, s)| (start, 2 * s.object_points.len()))
    }

    fn pack(&self, poses: &[Pose]) -> DVector<f64> {
        let mut x = DVector::zeros(self.pose_offset(poses.len()));
        for (j, &i) in self.free.iter().enumerate() {
            x[j] = self.base[i];
        }
        for (v, pose) in poses.iter().enumerate() {
            let o = self.pose_offset(v);
            x.rows_mut(o, 3).copy_from(&pose.rvec);
            x.rows_mut(o + 3, 3).copy_from(&pose.tvec);
        }
        x
    }

    fn intrinsics(&self, x: &DVector<f64>) -> Vec<f64> {
        let mut full = self.base.clone();
        for (j, &i) in self.free.iter().enumerate() {
            full[i] = x[j];
        }
        full
    }

    fn unpack(&self, x: &DVector<f64>) -> (Vec<f64>, Vec<Pose>) {
        let poses = (0..self.samples.len())
            .map(|v| {
                let o = self.pose_offset(v);
                Pose::new(
                    x.fixed_rows::<3>(o).into_owned(),
                    x.fixed_rows::<3>(o + 3).into_owned(),
                )
            })
            .collect();
        (self.intrinsics(x), poses)
    }

    /// Residuals of one view into `out` (length `2 * points`).
    fn view_residuals(&self, full: &[f64], view: usize, pose: &[f64], out: &mut [f64]) {
        let k = [full[0], full[1], full[2], full[3]];
        let dist = &full[INTRINSIC_BASE..];
        let pose = Pose::new(
            Vector3::new(pose[0], pose[1], pose[2]),
            Vector3::new(pose[3], pose[4], pose[5]),
        );
        let rot = pose.rotation();
        let s = &self.samples[view];
        for (i, (p, q)) in s.object_points.iter().zip(&s.image_points).enumerate() {
            let (rx, ry) = match project_with(&k, dist, &(rot * p + pose.tvec)) {
                Some(px) => (px.x - q.x, px.y - q.y),
                None => (BEHIND_CAMERA_RESIDUAL, BEHIND_CAMERA_RESIDUAL),
            };
            out[2 * i] = rx;
            out[2 * i + 1] = ry;
        }
    }

    fn fill_residuals(&self, full: &[f64], x: &DVector<f64>, out: &mut DVector<f64>) {
        for (v, (start, len)) in self.row_ranges().enumerate() {
            let o = self.pose_offset(v);
            let pose = x.rows(o, 6).into_owned();
            self.view_residuals(
                full,
                v,
                pose.as_slice(),
                &mut out.as_mut_slice()[start..start + len],
            );
        }
    }
}

impl LeastSquares for CalibProblem<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let full = self.intrinsics(x);
        let mut r = DVector::zeros(self.rows);
        self.fill_residuals(&full, x, &mut r);
        r
    }

    /// Central differences exploiting the block structure: a pose parameter
    /// only moves its own view's residuals.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.rows, x.len());
        let full = self.intrinsics(x);

        let mut rp = DVector::zeros(self.rows);
        let mut rm = DVector::zeros(self.rows);
        for (j, &i) in self.free.iter().enumerate() {
            let h = diff_step(full[i]);
            let mut fp = full.clone();
            fp[i] += h;
            self.fill_residuals(&fp, x, &mut rp);
            fp[i] = full[i] - h;
            self.fill_residuals(&fp, x, &mut rm);
            jac.set_column(j, &((&rp - &rm) / (2.0 * h)));
        }

        for (v, (start, len)) in self.row_ranges().enumerate() {
            let o = self.pose_offset(v);
            let pose: Vec<f64> = x.rows(o, 6).iter().copied().collect();
            let mut plus = vec![0.0; len];
            let mut minus = vec![0.0; len];
            for k in 0..6 {
                let h = diff_step(pose[k]);
                let mut p = pose.clone();
                p[k] = pose[k] + h;
                self.view_residuals(&full, v, &p, &mut plus);
                p[k] = pose[k] - h;
                self.view_residuals(&full, v, &p, &mut minus);
                for r in 0..len {
                    jac[(start + r, o + k)] = (plus[r] - minus[r]) / (2.0 * h);
                }
            }
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_sample(z: f64) -> CalibrationSample {
        CalibrationSample {
            object_points: vec![
                Point3::new(0.0, 0.0, z),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            image_points: vec![
                Point2::new(10.0, 10.0),
                Point2::new(20.0, 10.0),
                Point2::new(20.0, 20.0),
                Point2::new(10.0, 20.0),
            ],
        }
    }

    #[test]
    fn validates_inputs() {
        let opts = CalibrationOptions::default();
        let size = ImageSize::new(640, 480);
        assert_eq!(
            calibrate_camera(&[], size, &opts),
            Err(CalibrateError::InsufficientSamples {
                got: 0,
                required: 1
            })
        );
        assert_eq!(
            calibrate_camera(&[square_sample(0.0)], ImageSize::new(0, 480), &opts),
            Err(CalibrateError::InvalidImageSize {
                width: 0,
                height: 480
            })
        );
        assert_eq!(
            calibrate_camera(&[square_sample(0.5)], size, &opts),
            Err(CalibrateError::NonPlanarTarget { index: 0 })
        );
        let mut short = square_sample(0.0);
        short.image_points.pop();
        assert!(matches!(
            calibrate_camera(&[short], size, &opts),
            Err(CalibrateError::MismatchedSample { index: 0, .. })
        ));
        // 8 residuals for 9 intrinsics + 6 pose parameters
        assert!(matches!(
            calibrate_camera(&[square_sample(0.0)], size, &opts),
            Err(CalibrateError::Underdetermined { .. })
        ));
    }

    #[test]
    fn focal_from_synthetic_homographies() {
        let k = Matrix3::new(700.0, 0.0, 320.0, 0.0, 650.0, 240.0, 0.0, 0.0, 1.0);
        let hs: Vec<Matrix3<f64>> = [(0.3, -0.2), (-0.25, 0.35), (0.1, 0.4)]
            .iter()
            .map(|&(ax, ay)| {
                let r = nalgebra::Rotation3::from_euler_angles(ax, ay, 0.1);
                let t = Vector3::new(-0.1, 0.05, 1.0);
                let rt = Matrix3::from_columns(&[
                    r.matrix().column(0).into_owned(),
                    r.matrix().column(1).into_owned(),
                    t,
                ]);
                k * rt
            })
            .collect();
        let (fx, fy) = initial_focal(&hs, 320.0, 240.0).expect("focal");
        assert!((fx - 700.0).abs() < 1e-6 && (fy - 650.0).abs() < 1e-6, "{fx} {fy}");
    }
}

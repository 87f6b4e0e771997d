//! Camera models, single-marker pose estimation and planar calibration.
//!
//! - [`CameraIntrinsics`]: camera matrix plus OpenCV-ordered distortion
//!   (4, 5 or 8 coefficients), projection and undistortion.
//! - [`estimate_marker_pose`]: planar PnP for one square marker, homography
//!   initialization refined with Levenberg–Marquardt.
//! - [`calibrate_camera`]: joint refinement of intrinsics, distortion and
//!   per-view poses from chessboard views.
//! - [`order_chessboard_corners`]: raw X-junctions to a row-major grid.
//!
//! ```
//! use squaremark_calib::{estimate_marker_pose, CameraIntrinsics, PoseOptions};
//! use nalgebra::Point2;
//!
//! let cam = CameraIntrinsics::pinhole(800.0, 800.0, 320.0, 240.0).unwrap();
//! let corners = [
//!     Point2::new(280.0, 200.0),
//!     Point2::new(360.0, 200.0),
//!     Point2::new(360.0, 280.0),
//!     Point2::new(280.0, 280.0),
//! ];
//! let pose = estimate_marker_pose(&corners, 0.1, &cam, &PoseOptions::default()).unwrap();
//! assert!((pose.tvec.z - 1.0).abs() < 0.01);
//! ```

mod calibrate;
mod camera;
mod chessboard;
mod io;
mod lm;
mod pose;

pub use calibrate::{
    calibrate_camera, CalibrateError, CalibrationOptions, CalibrationResult, CalibrationSample,
    ImageSize,
};
pub use camera::{CameraIntrinsics, DistortionModel, IntrinsicsError};
pub use chessboard::{board_object_points, order_chessboard_corners, ChessboardError, PatternSize};
pub use io::{CalibIoError, CalibrationFile};
pub use pose::{
    estimate_marker_pose, estimate_marker_poses, marker_object_points, project_points,
    reprojection_rms, solve_planar_pnp, Pose, PoseError, PoseOptions,
};

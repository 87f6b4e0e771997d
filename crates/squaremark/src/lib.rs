//! High-level facade for the `squaremark-*` workspace.
//!
//! This crate provides:
//! - re-exports of the marker, calibration and core crates,
//! - [`marker_poses`], pose estimation for every marker of a detection,
//! - (feature `image`) helpers that accept `image` crate buffers, ChESS
//!   chessboard corner finding via `chess-corners`, and debug drawing.
//!
//! ## Quickstart
//!
//! ```no_run
//! use squaremark::aruco::{MarkerDetector, DetectorParams, PredefinedDictionary};
//! use squaremark::detect;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = detect::load_gray("frame.png")?;
//! let dict = PredefinedDictionary::Dict4x4_50.dictionary()?.clone();
//! let detector = MarkerDetector::new(dict, DetectorParams::default());
//! let result = detector.detect(&detect::gray_view(&img))?;
//! println!("{} markers, {} rejected", result.markers.len(), result.rejected.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `squaremark::core`: gray images, homographies, quad geometry, logging.
//! - `squaremark::aruco`: dictionaries, candidate extraction, decoding, detector.
//! - `squaremark::calib`: intrinsics, marker pose, chessboard ordering, calibration.
//! - `squaremark::detect` (feature `image`): end-to-end helpers on `image` buffers.
//! - `squaremark::draw` (feature `image`): overlays for markers, axes and corners.

pub use squaremark_aruco as aruco;
pub use squaremark_calib as calib;
pub use squaremark_core as core;

pub use squaremark_aruco::{DetectedMarker, DetectionResult, MarkerDetector, PredefinedDictionary};
pub use squaremark_calib::{CameraIntrinsics, Pose, PoseError, PoseOptions};

#[cfg(feature = "image")]
pub mod detect;
#[cfg(feature = "image")]
pub mod draw;

/// One pose per accepted marker of `result`, in marker order.
pub fn marker_poses(
    result: &DetectionResult,
    marker_length: f64,
    intrinsics: &CameraIntrinsics,
    options: &PoseOptions,
) -> Vec<Result<Pose, PoseError>> {
    let corners: Vec<_> = result.markers.iter().map(|m| m.corners).collect();
    squaremark_calib::estimate_marker_poses(&corners, marker_length, intrinsics, options)
}

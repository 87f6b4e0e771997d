//! JSON persistence of calibration results.

use crate::{CalibrationResult, CameraIntrinsics, ImageSize, IntrinsicsError};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum CalibIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A calibration run as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub image_width: u32,
    pub image_height: u32,
    /// Row-major camera matrix.
    pub camera_matrix: [[f64; 3]; 3],
    pub dist_coeffs: Vec<f64>,
    #[serde(default)]
    pub rms_reprojection_error: f64,
    #[serde(default)]
    pub views_used: usize,
    /// Inputs left out of the run, with the reason.
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl CalibrationFile {
    pub fn from_result(result: &CalibrationResult, size: ImageSize, skipped: Vec<String>) -> Self {
        let k = result.intrinsics.camera_matrix();
        Self {
            image_width: size.width,
            image_height: size.height,
            camera_matrix: std::array::from_fn(|r| std::array::from_fn(|c| k[(r, c)])),
            dist_coeffs: result.intrinsics.distortion().to_vec(),
            rms_reprojection_error: result.rms,
            views_used: result.poses.len(),
            skipped,
        }
    }

    /// Validated intrinsics for pose estimation.
    pub fn intrinsics(&self) -> Result<CameraIntrinsics, IntrinsicsError> {
        let k = Matrix3::from_fn(|r, c| self.camera_matrix[r][c]);
        CameraIntrinsics::from_camera_matrix(&k, self.dist_coeffs.clone())
    }

    /// Load a calibration file from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this calibration to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_round_trips_through_disk() {
        let file = CalibrationFile {
            image_width: 640,
            image_height: 480,
            camera_matrix: [[810.0, 0.0, 321.5], [0.0, 805.0, 238.0], [0.0, 0.0, 1.0]],
            dist_coeffs: vec![-0.1, 0.02, 0.0, 0.0, 0.0],
            rms_reprojection_error: 0.31,
            views_used: 12,
            skipped: vec!["img_03.png: chessboard not found".into()],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");
        file.write_json(&path).unwrap();
        let back = CalibrationFile::load_json(&path).unwrap();
        assert_eq!(back, file);

        let cam = back.intrinsics().unwrap();
        assert_eq!((cam.fx(), cam.fy(), cam.cx(), cam.cy()), (810.0, 805.0, 321.5, 238.0));
    }

    #[test]
    fn minimal_file_uses_defaults() {
        let raw = r#"{
            "image_width": 100, "image_height": 50,
            "camera_matrix": [[1, 0, 50], [0, 1, 25], [0, 0, 1]],
            "dist_coeffs": [0, 0, 0, 0]
        }"#;
        let file: CalibrationFile = serde_json::from_str(raw).unwrap();
        assert!(file.skipped.is_empty());
        assert!(file.intrinsics().is_ok());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CalibrationFile::load_json("/nonexistent/calib.json").unwrap_err();
        assert!(matches!(err, CalibIoError::Io(_)));
    }
}

//! Detector and decoder parameters, loadable from partial JSON.

use serde::{Deserialize, Serialize};

/// Candidate extraction parameters.
///
/// Rates are relative to the larger image dimension or to the candidate's
/// own perimeter, so one configuration works across resolutions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Smallest adaptive threshold window (pixels, made odd).
    pub adaptive_thresh_win_size_min: usize,
    /// Largest adaptive threshold window (pixels, made odd).
    pub adaptive_thresh_win_size_max: usize,
    /// Step between consecutive window sizes.
    pub adaptive_thresh_win_size_step: usize,
    /// Constant subtracted from the local mean.
    pub adaptive_thresh_constant: f32,
    /// Minimum contour length relative to `max(width, height)`.
    pub min_marker_perimeter_rate: f32,
    /// Maximum contour length relative to `max(width, height)`.
    pub max_marker_perimeter_rate: f32,
    /// Polygon approximation tolerance relative to the contour length.
    pub polygonal_approx_accuracy_rate: f32,
    /// Minimum distance between corners of one candidate, relative to its
    /// perimeter.
    pub min_corner_distance_rate: f32,
    /// Minimum distance of any corner to the image border (pixels).
    pub min_distance_to_border: f32,
    /// Mean corner distance, relative to the smaller perimeter, below which
    /// two candidates are treated as the same square.
    pub min_marker_distance_rate: f32,
    /// Refine corners by intersecting lines fitted to the contour sides.
    pub refine_corners: bool,
    /// Bit sampling and matching.
    pub decode: DecodeParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            adaptive_thresh_win_size_min: 3,
            adaptive_thresh_win_size_max: 23,
            adaptive_thresh_win_size_step: 10,
            adaptive_thresh_constant: 7.0,
            min_marker_perimeter_rate: 0.03,
            max_marker_perimeter_rate: 4.0,
            polygonal_approx_accuracy_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_distance_to_border: 3.0,
            min_marker_distance_rate: 0.05,
            refine_corners: true,
            decode: DecodeParams::default(),
        }
    }
}

/// Marker decoding parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeParams {
    /// Width of the black border in cells.
    pub marker_border_bits: usize,
    /// Rectified pixels per cell.
    pub perspective_remove_pixel_per_cell: usize,
    /// Fraction of each cell edge ignored when voting.
    pub perspective_remove_ignored_margin_per_cell: f32,
    /// Maximum fraction of border cells that may read white.
    pub max_erroneous_bits_in_border_rate: f32,
    /// Below this sample standard deviation the cell grid is classified
    /// by its mean alone (all black or all white).
    pub min_otsu_std_dev: f32,
    /// Fraction of the dictionary's correction capacity actually used.
    pub error_correction_rate: f32,
    /// Also try white-on-black markers.
    pub detect_inverted_marker: bool,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            marker_border_bits: 1,
            perspective_remove_pixel_per_cell: 4,
            perspective_remove_ignored_margin_per_cell: 0.13,
            max_erroneous_bits_in_border_rate: 0.35,
            min_otsu_std_dev: 5.0,
            error_correction_rate: 0.6,
            detect_inverted_marker: false,
        }
    }
}

impl DecodeParams {
    /// Hamming distance accepted for a dictionary that corrects
    /// `max_correction_bits`.
    pub fn max_hamming(&self, max_correction_bits: u8) -> u8 {
        let rate = self.error_correction_rate.clamp(0.0, 1.0);
        (max_correction_bits as f32 * rate).floor() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let p: DetectorParams =
            serde_json::from_str(r#"{"refine_corners": false, "decode": {"marker_border_bits": 2}}"#)
                .expect("params");
        assert!(!p.refine_corners);
        assert_eq!(p.decode.marker_border_bits, 2);
        assert_eq!(p.decode.perspective_remove_pixel_per_cell, 4);
        assert_eq!(p.adaptive_thresh_win_size_max, 23);
    }

    #[test]
    fn correction_budget_scales_with_rate() {
        let d = DecodeParams::default();
        assert_eq!(d.max_hamming(5), 3);
        assert_eq!(d.max_hamming(1), 0);
        let full = DecodeParams {
            error_correction_rate: 1.0,
            ..DecodeParams::default()
        };
        assert_eq!(full.max_hamming(1), 1);
    }
}

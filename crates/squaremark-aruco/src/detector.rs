//! End-to-end marker detection: candidates → decoding → partitioned result.

use crate::candidates::extract_candidates;
use crate::decode::{CellSampler, DecodeMismatch, Decoded};
use crate::{Candidate, Dictionary, DetectorParams, Matcher};
use serde::{Deserialize, Serialize};
use squaremark_core::{GrayImageView, Quad};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors that abort a detection call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("invalid image: {width}x{height} with {len} bytes")]
    InvalidImage {
        width: usize,
        height: usize,
        len: usize,
    },
}

/// A decoded marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    /// Clockwise corners starting at the marker's own top-left.
    pub corners: Quad,
    /// Bits corrected while matching.
    pub hamming: u8,
    /// Quarter turns between the dictionary code and the observation.
    pub rotation: u8,
    /// Decoded as white-on-black.
    pub inverted: bool,
}

/// A candidate square that failed to decode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    /// Candidate corners as extracted (clockwise, nearest-origin first).
    pub corners: Quad,
    pub reason: DecodeMismatch,
}

/// Outcome of one detection call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub markers: Vec<DetectedMarker>,
    pub rejected: Vec<RejectedCandidate>,
}

/// Reusable detector bound to one dictionary.
pub struct MarkerDetector {
    params: DetectorParams,
    matcher: Matcher,
    sampler: CellSampler,
}

impl MarkerDetector {
    pub fn new(dictionary: Dictionary, params: DetectorParams) -> Self {
        let max_hamming = params
            .decode
            .max_hamming(dictionary.max_correction_bits());
        let sampler = CellSampler::new(&params.decode, dictionary.marker_size());
        log::debug!(
            "detector for {} ({} markers), max hamming {}",
            dictionary.name(),
            dictionary.len(),
            max_hamming
        );
        Self {
            matcher: Matcher::new(dictionary, max_hamming),
            sampler,
            params,
        }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    pub fn dictionary(&self) -> &Dictionary {
        self.matcher.dictionary()
    }

    /// Detect markers in a grayscale image.
    ///
    /// Fails only for an empty or malformed image; "no markers" is an empty
    /// result. Markers keep the candidate order (decreasing perimeter).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = image.width, height = image.height))
    )]
    pub fn detect(&self, image: &GrayImageView<'_>) -> Result<DetectionResult, DetectError> {
        if image.is_invalid() {
            return Err(DetectError::InvalidImage {
                width: image.width,
                height: image.height,
                len: image.data.len(),
            });
        }

        let candidates = extract_candidates(image, &self.params);
        let decoded = self.decode_all(image, &candidates);

        let mut result = DetectionResult::default();
        for (cand, outcome) in candidates.into_iter().zip(decoded) {
            match outcome {
                Ok(d) => result.markers.push(DetectedMarker {
                    id: d.m.id,
                    corners: d.corners,
                    hamming: d.m.distance,
                    rotation: d.m.rotation,
                    inverted: d.inverted,
                }),
                Err(reason) => result.rejected.push(RejectedCandidate {
                    corners: cand.corners,
                    reason,
                }),
            }
        }

        log::debug!(
            "{} markers, {} rejected candidates",
            result.markers.len(),
            result.rejected.len()
        );
        Ok(result)
    }

    #[cfg(not(feature = "rayon"))]
    fn decode_all(
        &self,
        image: &GrayImageView<'_>,
        candidates: &[Candidate],
    ) -> Vec<Result<Decoded, DecodeMismatch>> {
        candidates
            .iter()
            .map(|c| {
                self.sampler
                    .decode(image, c, &self.matcher, &self.params.decode)
            })
            .collect()
    }

    #[cfg(feature = "rayon")]
    fn decode_all(
        &self,
        image: &GrayImageView<'_>,
        candidates: &[Candidate],
    ) -> Vec<Result<Decoded, DecodeMismatch>> {
        candidates
            .par_iter()
            .map(|c| {
                self.sampler
                    .decode(image, c, &self.matcher, &self.params.decode)
            })
            .collect()
    }
}

/// Detect markers of `dictionary` with default parameters.
pub fn detect_markers(
    image: &GrayImageView<'_>,
    dictionary: &Dictionary,
) -> Result<DetectionResult, DetectError> {
    MarkerDetector::new(dictionary.clone(), DetectorParams::default()).detect(image)
}

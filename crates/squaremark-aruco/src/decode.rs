//! Bit sampling of a single candidate and dictionary matching.

use crate::threshold::{mean_std, otsu_threshold};
use crate::{Candidate, DecodeParams, Match, Matcher};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use squaremark_core::{homography_from_4pt, sample_bilinear, GrayImageView, Homography, Quad};

/// Why a candidate did not decode.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DecodeMismatch {
    #[error("could not rectify candidate")]
    Sampling,
    #[error("border not solid: {erroneous} white cells, at most {allowed} allowed")]
    BorderNotSolid { erroneous: usize, allowed: usize },
    #[error("no codeword within {max_hamming} bits")]
    NoMatch { max_hamming: u8 },
}

/// A successfully decoded candidate.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Decoded {
    pub m: Match,
    /// Corners reordered so the first one is the marker's own top-left.
    pub corners: Quad,
    pub inverted: bool,
}

/// Per-cell sample offsets in canonical cell units, shared by all candidates.
pub(crate) struct CellSampler {
    cells: usize,
    border: usize,
    bits: usize,
    offsets: Vec<f32>,
}

impl CellSampler {
    pub fn new(params: &DecodeParams, marker_size: usize) -> Self {
        let k = params.perspective_remove_pixel_per_cell.max(1);
        let margin = params
            .perspective_remove_ignored_margin_per_cell
            .clamp(0.0, 0.45);
        let span = 1.0 - 2.0 * margin;
        let offsets = (0..k)
            .map(|i| margin + (i as f32 + 0.5) * span / k as f32)
            .collect();
        Self {
            cells: marker_size + 2 * params.marker_border_bits,
            border: params.marker_border_bits,
            bits: marker_size,
            offsets,
        }
    }

    /// Sample every cell of the marker grid; returns `cells²` groups of
    /// `k²` intensities, row-major.
    fn sample(&self, image: &GrayImageView<'_>, h: &Homography) -> Vec<u8> {
        let k = self.offsets.len();
        let mut out = Vec::with_capacity(self.cells * self.cells * k * k);
        for cy in 0..self.cells {
            for cx in 0..self.cells {
                for &oy in &self.offsets {
                    for &ox in &self.offsets {
                        let p = h.apply(Point2::new(cx as f64 + ox as f64, cy as f64 + oy as f64));
                        let v = sample_bilinear(image, p.x as f32, p.y as f32);
                        out.push(v.round().clamp(0.0, 255.0) as u8);
                    }
                }
            }
        }
        out
    }

    /// Decode one candidate against the matcher.
    pub fn decode(
        &self,
        image: &GrayImageView<'_>,
        cand: &Candidate,
        matcher: &Matcher,
        params: &DecodeParams,
    ) -> Result<Decoded, DecodeMismatch> {
        let c = self.cells as f64;
        let canonical = [
            Point2::new(0.0, 0.0),
            Point2::new(c, 0.0),
            Point2::new(c, c),
            Point2::new(0.0, c),
        ];
        let img_pts = cand.corners.map(|p| Point2::new(p.x as f64, p.y as f64));
        let h = homography_from_4pt(&canonical, &img_pts).ok_or(DecodeMismatch::Sampling)?;

        let samples = self.sample(image, &h);
        let (mean, std) = mean_std(&samples);
        let black = self.classify(&samples, mean, std, params.min_otsu_std_dev);

        let border_cells = self.cells * self.cells - self.bits * self.bits;
        let allowed =
            (border_cells as f32 * params.max_erroneous_bits_in_border_rate).floor() as usize;
        let white_border = self.count_white_border(&black);

        let inverted = if white_border <= allowed {
            false
        } else if params.detect_inverted_marker && border_cells - white_border <= allowed {
            true
        } else {
            return Err(DecodeMismatch::BorderNotSolid {
                erroneous: white_border,
                allowed,
            });
        };

        let code = self.inner_code(&black, inverted);
        let m = matcher.match_code(code).ok_or(DecodeMismatch::NoMatch {
            max_hamming: matcher.max_distance(),
        })?;

        let r = m.rotation as usize;
        let corners = std::array::from_fn(|i| cand.corners[(i + r) % 4]);
        Ok(Decoded {
            m,
            corners,
            inverted,
        })
    }

    /// Majority vote per cell: `true` = black.
    fn classify(&self, samples: &[u8], mean: f32, std: f32, min_std: f32) -> Vec<bool> {
        let per_cell = self.offsets.len() * self.offsets.len();
        if std < min_std {
            // uniform patch: all black or all white
            return vec![mean < 128.0; self.cells * self.cells];
        }
        let t = otsu_threshold(samples);
        samples
            .chunks(per_cell)
            .map(|cell| 2 * cell.iter().filter(|&&v| v <= t).count() > per_cell)
            .collect()
    }

    fn is_border(&self, cx: usize, cy: usize) -> bool {
        cx < self.border
            || cy < self.border
            || cx >= self.border + self.bits
            || cy >= self.border + self.bits
    }

    fn count_white_border(&self, black: &[bool]) -> usize {
        (0..self.cells)
            .flat_map(|cy| (0..self.cells).map(move |cx| (cx, cy)))
            .filter(|&(cx, cy)| self.is_border(cx, cy) && !black[cy * self.cells + cx])
            .count()
    }

    fn inner_code(&self, black: &[bool], inverted: bool) -> u64 {
        let mut code = 0u64;
        for by in 0..self.bits {
            for bx in 0..self.bits {
                let cell = (by + self.border) * self.cells + bx + self.border;
                // white = 1; an inverted marker swaps the colors
                if black[cell] == inverted {
                    code |= 1u64 << (by * self.bits + bx);
                }
            }
        }
        code
    }
}

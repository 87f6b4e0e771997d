//! Immutable marker codebooks.

use crate::bits::{mask, rotate_code_u64, BitMatrix, MAX_MARKER_SIZE};
use crate::matcher::{nearest_code, rotations, Match};
use squaremark_core::GrayImage;
use std::borrow::Cow;

/// Errors produced when building dictionaries or rendering markers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("marker id {id} is out of range (dictionary has {count} markers)")]
    IdOutOfRange { id: u32, count: usize },
    #[error("canvas of {side_pixels}px cannot hold {min_pixels} marker cells")]
    CanvasTooSmall {
        side_pixels: usize,
        min_pixels: usize,
    },
    #[error("marker size {0} is unsupported (expected 1..={MAX_MARKER_SIZE})")]
    UnsupportedMarkerSize(usize),
    #[error("dictionary has no codewords")]
    EmptyCodebook,
    #[error("bit matrix {index} is {side}x{side}, expected {expected}x{expected}")]
    BitMatrixSize {
        index: usize,
        side: usize,
        expected: usize,
    },
    #[error("codeword {second} duplicates codeword {first} under rotation {rotation}")]
    DuplicateCodeword {
        first: usize,
        second: usize,
        rotation: u8,
    },
}

/// A fixed ArUco/AprilTag-style dictionary.
///
/// Codes are row-major with the top-left bit in the least significant
/// position and white = 1 (see [`BitMatrix`]), matching OpenCV's bit values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dictionary {
    name: Cow<'static, str>,
    marker_size: usize,
    max_correction_bits: u8,
    codes: Cow<'static, [u64]>,
}

impl Dictionary {
    /// Build a validated dictionary from packed codes.
    ///
    /// Fails when two codewords coincide under any 90° rotation.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        marker_size: usize,
        max_correction_bits: u8,
        codes: impl Into<Cow<'static, [u64]>>,
    ) -> Result<Self, DictionaryError> {
        if marker_size == 0 || marker_size > MAX_MARKER_SIZE {
            return Err(DictionaryError::UnsupportedMarkerSize(marker_size));
        }
        let codes: Cow<'static, [u64]> = codes.into();
        if codes.is_empty() {
            return Err(DictionaryError::EmptyCodebook);
        }
        let m = mask(marker_size);
        let codes: Cow<'static, [u64]> = if codes.iter().any(|&c| c & !m != 0) {
            Cow::Owned(codes.iter().map(|&c| c & m).collect())
        } else {
            codes
        };
        check_unique_under_rotation(&codes, marker_size)?;

        Ok(Self {
            name: name.into(),
            marker_size,
            max_correction_bits,
            codes,
        })
    }

    /// Build a dictionary from a list of equally sized bit matrices.
    pub fn from_bit_matrices(
        name: impl Into<Cow<'static, str>>,
        matrices: &[BitMatrix],
        max_correction_bits: u8,
    ) -> Result<Self, DictionaryError> {
        let first = matrices.first().ok_or(DictionaryError::EmptyCodebook)?;
        let expected = first.side();
        let mut codes = Vec::with_capacity(matrices.len());
        for (index, m) in matrices.iter().enumerate() {
            if m.side() != expected {
                return Err(DictionaryError::BitMatrixSize {
                    index,
                    side: m.side(),
                    expected,
                });
            }
            codes.push(m.code());
        }
        Self::new(name, expected, max_correction_bits, codes)
    }

    /// Wrap a static table without validation; used for the built-in presets.
    pub(crate) const fn from_static(
        name: &'static str,
        marker_size: usize,
        max_correction_bits: u8,
        codes: &'static [u64],
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            marker_size,
            max_correction_bits,
            codes: Cow::Borrowed(codes),
        }
    }

    /// Human-readable name (for logging).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of inner bits per marker side.
    #[inline]
    pub fn marker_size(&self) -> usize {
        self.marker_size
    }

    /// Maximum Hamming distance tolerated by [`Dictionary::lookup`].
    #[inline]
    pub fn max_correction_bits(&self) -> u8 {
        self.max_correction_bits
    }

    /// Total number of inner bits per marker.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Packed codewords indexed by marker id.
    #[inline]
    pub fn codes(&self) -> &[u64] {
        &self.codes
    }

    pub fn bit_matrix(&self, id: u32) -> Option<BitMatrix> {
        let code = *self.codes.get(id as usize)?;
        BitMatrix::from_code(self.marker_size, code)
    }

    /// Best `(id, rotation, distance)` for a sampled bit matrix, accepted
    /// only within [`Dictionary::max_correction_bits`].
    ///
    /// Same search as [`crate::Matcher::match_code`], without the
    /// precomputed rotations.
    pub fn lookup(&self, bits: &BitMatrix) -> Option<Match> {
        if bits.side() != self.marker_size {
            return None;
        }
        let n = self.marker_size;
        nearest_code(
            self.codes.iter().map(|&code| rotations(code, n)),
            bits.code(),
            self.max_correction_bits,
        )
    }

    /// Render marker `id` with a one-cell black border into a square image.
    pub fn draw_marker(&self, id: u32, side_pixels: usize) -> Result<GrayImage, DictionaryError> {
        self.draw_marker_with_border(id, side_pixels, 1)
    }

    /// Render marker `id` as `side_pixels × side_pixels` with a black border of
    /// `border_bits` cells. A 1 bit is drawn white (255), a 0 bit black (0).
    pub fn draw_marker_with_border(
        &self,
        id: u32,
        side_pixels: usize,
        border_bits: usize,
    ) -> Result<GrayImage, DictionaryError> {
        let bits = self.bit_matrix(id).ok_or(DictionaryError::IdOutOfRange {
            id,
            count: self.len(),
        })?;
        let cells = self.marker_size + 2 * border_bits;
        if side_pixels < cells {
            return Err(DictionaryError::CanvasTooSmall {
                side_pixels,
                min_pixels: cells,
            });
        }

        let cell_of = |px: usize| px * cells / side_pixels;
        let mut img = GrayImage::filled(side_pixels, side_pixels, 255);
        for y in 0..side_pixels {
            let cy = cell_of(y);
            for x in 0..side_pixels {
                let cx = cell_of(x);
                let in_border = cx < border_bits
                    || cy < border_bits
                    || cx >= border_bits + self.marker_size
                    || cy >= border_bits + self.marker_size;
                let black = in_border || !bits.get(cx - border_bits, cy - border_bits);
                if black {
                    img.set(x, y, 0);
                }
            }
        }
        Ok(img)
    }
}

fn check_unique_under_rotation(codes: &[u64], n: usize) -> Result<(), DictionaryError> {
    let mut seen = std::collections::HashMap::with_capacity(codes.len() * 4);
    for (second, &code) in codes.iter().enumerate() {
        for rot in 0..4u8 {
            if let Some(&first) = seen.get(&rotate_code_u64(code, n, rot)) {
                if first != second {
                    return Err(DictionaryError::DuplicateCodeword {
                        first,
                        second,
                        rotation: rot,
                    });
                }
            }
        }
        for rot in 0..4u8 {
            seen.entry(rotate_code_u64(code, n, rot)).or_insert(second);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Dictionary {
        let a = BitMatrix::from_rows(&[[1u8, 0, 0], [0, 1, 1], [0, 0, 0]]).expect("a");
        let b = BitMatrix::from_rows(&[[1u8, 1, 1], [0, 0, 0], [1, 0, 0]]).expect("b");
        Dictionary::from_bit_matrices("tiny", &[a, b], 1).expect("dictionary")
    }

    #[test]
    fn lookup_reports_rotation_of_observation() {
        let d = tiny();
        for rot in 0..4u8 {
            let observed = d.bit_matrix(1).expect("code").rotated(rot);
            let m = d.lookup(&observed).expect("match");
            assert_eq!((m.id, m.rotation, m.distance), (1, rot, 0));
        }
    }

    #[test]
    fn lookup_agrees_with_matcher() {
        let d = tiny();
        let matcher = crate::Matcher::new(d.clone(), d.max_correction_bits());
        for code in 0..(1u64 << 9) {
            let bits = BitMatrix::from_code(3, code).expect("bits");
            assert_eq!(d.lookup(&bits), matcher.match_code(code), "code {code:#011b}");
        }
        let wrong_side = BitMatrix::from_code(4, 0).expect("bits");
        assert_eq!(d.lookup(&wrong_side), None);
    }

    #[test]
    fn duplicate_rotations_are_rejected() {
        let a = BitMatrix::from_rows(&[[1u8, 0], [0, 0]]).expect("a");
        let err = Dictionary::from_bit_matrices("dup", &[a, a.rotated(2)], 0).unwrap_err();
        assert_eq!(
            err,
            DictionaryError::DuplicateCodeword {
                first: 0,
                second: 1,
                rotation: 2
            }
        );
    }

    #[test]
    fn mixed_sizes_and_empty_lists_fail() {
        let a = BitMatrix::from_rows(&[[1u8, 0], [0, 0]]).expect("a");
        let b = BitMatrix::from_rows(&[[1u8, 0, 0], [0, 0, 0], [0, 0, 0]]).expect("b");
        assert!(matches!(
            Dictionary::from_bit_matrices("mixed", &[a, b], 0),
            Err(DictionaryError::BitMatrixSize { index: 1, .. })
        ));
        assert_eq!(
            Dictionary::from_bit_matrices("empty", &[], 0),
            Err(DictionaryError::EmptyCodebook)
        );
    }

    #[test]
    fn draw_marker_renders_border_and_bits() {
        let d = tiny();
        // 3 bits + 2 border cells = 5 cells of 4px
        let img = d.draw_marker(0, 20).expect("render");
        assert_eq!((img.width, img.height), (20, 20));
        // border
        assert_eq!(img.get(0, 0), 0);
        assert_eq!(img.get(19, 10), 0);
        // bit (0,0) set = white, bit (1,0) clear = black
        assert_eq!(img.get(5, 5), 255);
        assert_eq!(img.get(9, 5), 0);
        // bit (1,1) set
        assert_eq!(img.get(9, 9), 255);
    }

    #[test]
    fn draw_marker_rejects_small_canvas_and_bad_ids() {
        let d = tiny();
        assert_eq!(
            d.draw_marker(0, 4),
            Err(DictionaryError::CanvasTooSmall {
                side_pixels: 4,
                min_pixels: 5
            })
        );
        assert!(d.draw_marker(0, 5).is_ok());
        assert_eq!(
            d.draw_marker(2, 100),
            Err(DictionaryError::IdOutOfRange { id: 2, count: 2 })
        );
    }
}

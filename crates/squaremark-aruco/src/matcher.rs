//! Nearest-codeword search over all ids and rotations.

use crate::bits::rotate_code_u64;
use crate::Dictionary;
use serde::{Deserialize, Serialize};

/// A dictionary match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Marker id in the dictionary.
    pub id: u32,
    /// Rotation `0..=3` such that `observed == rotate(dict_code, rotation)`.
    pub rotation: u8,
    /// Hamming distance between observed and dictionary code (after rotation).
    pub distance: u8,
}

/// Matcher for a fixed dictionary with precomputed rotated codewords.
///
/// Brute force over ids and rotations; for dictionaries up to a few
/// thousand codes this is fast enough and keeps memory small.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_distance: u8,
    rotated: Vec<[u64; 4]>,
}

impl Matcher {
    /// Build a matcher accepting matches with Hamming distance `<= max_distance`.
    pub fn new(dict: Dictionary, max_distance: u8) -> Self {
        let n = dict.marker_size();
        let rotated = dict.codes().iter().map(|&base| rotations(base, n)).collect();

        Self {
            dict,
            max_distance,
            rotated,
        }
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    #[inline]
    pub fn max_distance(&self) -> u8 {
        self.max_distance
    }

    /// Find the best match within `max_distance`. Ties keep the lowest id
    /// and rotation.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        nearest_code(self.rotated.iter().copied(), observed, self.max_distance)
    }
}

/// `code` rotated clockwise by 0, 90, 180 and 270 degrees.
pub(crate) fn rotations(code: u64, n: usize) -> [u64; 4] {
    [
        code,
        rotate_code_u64(code, n, 1),
        rotate_code_u64(code, n, 2),
        rotate_code_u64(code, n, 3),
    ]
}

/// Nearest codeword to `observed` over every id (in order) and rotation.
pub(crate) fn nearest_code(
    rotated: impl IntoIterator<Item = [u64; 4]>,
    observed: u64,
    max_distance: u8,
) -> Option<Match> {
    let mut best: Option<Match> = None;

    for (id, rots) in rotated.into_iter().enumerate() {
        for (rot, &cand) in rots.iter().enumerate() {
            let d = (observed ^ cand).count_ones() as u8;
            if d > max_distance {
                continue;
            }
            if best.map(|b| d < b.distance).unwrap_or(true) {
                best = Some(Match {
                    id: id as u32,
                    rotation: rot as u8,
                    distance: d,
                });
                if d == 0 {
                    return best;
                }
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PredefinedDictionary;

    #[test]
    fn matcher_finds_rotated_code() {
        let dict = PredefinedDictionary::Dict4x4_50.dictionary().unwrap().clone();
        let matcher = Matcher::new(dict.clone(), 0);

        let base = dict.codes()[7];
        let observed = rotate_code_u64(base, dict.marker_size(), 1);
        let m = matcher.match_code(observed).expect("match");
        assert_eq!(m.id, 7);
        assert_eq!(m.rotation, 1);
        assert_eq!(m.distance, 0);
    }

    #[test]
    fn matcher_respects_distance_limit() {
        let dict = PredefinedDictionary::AprilTag36h11.dictionary().unwrap().clone();
        let base = dict.codes()[3];
        let noisy = base ^ 0b101;

        assert!(Matcher::new(dict.clone(), 1).match_code(noisy).is_none());
        let m = Matcher::new(dict, 2).match_code(noisy).expect("match");
        assert_eq!((m.id, m.rotation, m.distance), (3, 0, 2));
    }
}

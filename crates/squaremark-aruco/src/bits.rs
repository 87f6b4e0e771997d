//! Square bit grids packed into a `u64`.

use serde::{Deserialize, Serialize};

/// Largest marker side whose bits still fit a `u64`.
pub const MAX_MARKER_SIZE: usize = 8;

/// A `side × side` bit grid, row-major, bit `y * side + x`, white = 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitMatrix {
    side: usize,
    code: u64,
}

impl BitMatrix {
    /// Wrap a packed code. Bits above `side * side` are cleared.
    ///
    /// Returns `None` when `side` is zero or larger than [`MAX_MARKER_SIZE`].
    pub fn from_code(side: usize, code: u64) -> Option<Self> {
        if side == 0 || side > MAX_MARKER_SIZE {
            return None;
        }
        Some(Self {
            side,
            code: code & mask(side),
        })
    }

    /// Build from rows of cells; any non-zero cell is a white (1) bit.
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R]) -> Option<Self> {
        let side = rows.len();
        if side == 0 || side > MAX_MARKER_SIZE {
            return None;
        }
        let mut code = 0u64;
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != side {
                return None;
            }
            for (x, &v) in row.iter().enumerate() {
                if v != 0 {
                    code |= 1u64 << (y * side + x);
                }
            }
        }
        Some(Self { side, code })
    }

    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    #[inline]
    pub fn code(&self) -> u64 {
        self.code
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        (self.code >> (y * self.side + x)) & 1 == 1
    }

    /// Rotate clockwise by `rot * 90°`.
    pub fn rotated(&self, rot: u8) -> Self {
        Self {
            side: self.side,
            code: rotate_code_u64(self.code, self.side, rot),
        }
    }

    pub fn hamming(&self, other: &BitMatrix) -> u32 {
        (self.code ^ other.code).count_ones()
    }

    /// Rows of 0/1 cells, top row first.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        (0..self.side)
            .map(|y| (0..self.side).map(|x| self.get(x, y) as u8).collect())
            .collect()
    }
}

#[inline]
pub(crate) fn mask(side: usize) -> u64 {
    let bits = side * side;
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Rotate a code stored in row-major bits (`idx = y * n + x`) clockwise by
/// `rot * 90°`: the source top-left bit lands at the top-right after one step.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }

    #[inline]
    fn get(code: u64, idx: usize) -> u64 {
        (code >> idx) & 1
    }

    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            out |= get(code, sy * n + sx) << (y * n + x);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_four_times_is_identity() {
        let code = 0x0123_4567_89ab_cdef_u64;
        let mut r = code;
        for _ in 0..4 {
            r = rotate_code_u64(r, 8, 1);
        }
        assert_eq!(code, r);
    }

    #[test]
    fn single_rotation_moves_top_left_to_top_right() {
        let m = BitMatrix::from_rows(&[[1u8, 0, 0], [0, 0, 0], [0, 0, 0]]).expect("rows");
        let r = m.rotated(1);
        assert!(r.get(2, 0));
        assert_eq!(r.code().count_ones(), 1);
        assert!(m.rotated(2).get(2, 2));
        assert!(m.rotated(3).get(0, 2));
    }

    #[test]
    fn rows_round_trip_and_validate_shape() {
        let rows = vec![vec![1u8, 0], vec![1, 1]];
        let m = BitMatrix::from_rows(&rows).expect("rows");
        assert_eq!(m.code(), 0b1101);
        assert_eq!(m.to_rows(), rows);
        assert!(BitMatrix::from_rows(&[vec![1u8, 0], vec![1]]).is_none());
        assert!(BitMatrix::from_code(9, 0).is_none());
    }
}

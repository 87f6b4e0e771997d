//! Embedded code tables.
//!
//! The source-of-truth lives in `squaremark-aruco/data/*_CODES.json`; bits
//! are row-major with the top-left bit in the least significant position
//! and white = 1, the same bit values OpenCV stores for its predefined
//! dictionaries. Every JSON file in `data/` is picked up by the build script.

#![allow(clippy::unreadable_literal, non_upper_case_globals, dead_code)]

/// One embedded table, as read from `data/<name>_CODES.json`.
#[derive(Clone, Copy, Debug)]
pub struct CodeTable {
    pub name: &'static str,
    pub marker_size: usize,
    pub max_correction_bits: u8,
    pub codes: &'static [u64],
}

include!(concat!(env!("OUT_DIR"), "/builtins.rs"));

/// Look up an embedded table by name, e.g. `DICT_6X6_1000`.
pub fn table(name: &str) -> Option<&'static CodeTable> {
    TABLES.iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_listed_by_name() {
        let t = table("DICT_ARUCO_ORIGINAL").expect("bundled");
        assert_eq!((t.marker_size, t.codes.len()), (5, 1024));
        assert_eq!(t.codes, &DICT_ARUCO_ORIGINAL_CODES[..]);
        assert!(table("DICT_9X9_10").is_none());
        assert!(TABLES.iter().all(|t| t.marker_size * t.marker_size <= 64));
    }
}

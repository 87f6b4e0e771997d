//! Predefined dictionary families.

use crate::builtins::{self, CodeTable};
use crate::Dictionary;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// The standard ArUco and AprilTag presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredefinedDictionary {
    Dict4x4_50,
    Dict4x4_100,
    Dict4x4_250,
    Dict4x4_1000,
    Dict5x5_50,
    Dict5x5_100,
    Dict5x5_250,
    Dict5x5_1000,
    Dict6x6_50,
    Dict6x6_100,
    Dict6x6_250,
    Dict6x6_1000,
    Dict7x7_50,
    Dict7x7_100,
    Dict7x7_250,
    Dict7x7_1000,
    ArucoOriginal,
    AprilTag16h5,
    AprilTag25h9,
    AprilTag36h10,
    AprilTag36h11,
}

/// Error returned when parsing an unknown preset name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown dictionary name `{0}`")]
pub struct UnknownDictionary(pub String);

/// Error returned when a preset's code table is not embedded in this build.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no code table bundled for {preset}; add data/{}_CODES.json", .preset.table_name())]
pub struct MissingCodeTable {
    pub preset: PredefinedDictionary,
}

static CACHE: [OnceLock<Dictionary>; PredefinedDictionary::ALL.len()] =
    [const { OnceLock::new() }; PredefinedDictionary::ALL.len()];

impl PredefinedDictionary {
    pub const ALL: [PredefinedDictionary; 21] = [
        Self::Dict4x4_50,
        Self::Dict4x4_100,
        Self::Dict4x4_250,
        Self::Dict4x4_1000,
        Self::Dict5x5_50,
        Self::Dict5x5_100,
        Self::Dict5x5_250,
        Self::Dict5x5_1000,
        Self::Dict6x6_50,
        Self::Dict6x6_100,
        Self::Dict6x6_250,
        Self::Dict6x6_1000,
        Self::Dict7x7_50,
        Self::Dict7x7_100,
        Self::Dict7x7_250,
        Self::Dict7x7_1000,
        Self::ArucoOriginal,
        Self::AprilTag16h5,
        Self::AprilTag25h9,
        Self::AprilTag36h10,
        Self::AprilTag36h11,
    ];

    /// Canonical name, e.g. `6X6_250` or `APRILTAG_36h11`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dict4x4_50 => "4X4_50",
            Self::Dict4x4_100 => "4X4_100",
            Self::Dict4x4_250 => "4X4_250",
            Self::Dict4x4_1000 => "4X4_1000",
            Self::Dict5x5_50 => "5X5_50",
            Self::Dict5x5_100 => "5X5_100",
            Self::Dict5x5_250 => "5X5_250",
            Self::Dict5x5_1000 => "5X5_1000",
            Self::Dict6x6_50 => "6X6_50",
            Self::Dict6x6_100 => "6X6_100",
            Self::Dict6x6_250 => "6X6_250",
            Self::Dict6x6_1000 => "6X6_1000",
            Self::Dict7x7_50 => "7X7_50",
            Self::Dict7x7_100 => "7X7_100",
            Self::Dict7x7_250 => "7X7_250",
            Self::Dict7x7_1000 => "7X7_1000",
            Self::ArucoOriginal => "ARUCO_ORIGINAL",
            Self::AprilTag16h5 => "APRILTAG_16h5",
            Self::AprilTag25h9 => "APRILTAG_25h9",
            Self::AprilTag36h10 => "APRILTAG_36h10",
            Self::AprilTag36h11 => "APRILTAG_36h11",
        }
    }

    /// Inner bits per marker side.
    pub const fn marker_size(self) -> usize {
        match self {
            Self::Dict4x4_50 | Self::Dict4x4_100 | Self::Dict4x4_250 | Self::Dict4x4_1000 => 4,
            Self::AprilTag16h5 => 4,
            Self::Dict5x5_50 | Self::Dict5x5_100 | Self::Dict5x5_250 | Self::Dict5x5_1000 => 5,
            Self::ArucoOriginal | Self::AprilTag25h9 => 5,
            Self::Dict6x6_50 | Self::Dict6x6_100 | Self::Dict6x6_250 | Self::Dict6x6_1000 => 6,
            Self::AprilTag36h10 | Self::AprilTag36h11 => 6,
            Self::Dict7x7_50 | Self::Dict7x7_100 | Self::Dict7x7_250 | Self::Dict7x7_1000 => 7,
        }
    }

    /// Number of markers in the preset.
    pub const fn marker_count(self) -> usize {
        match self {
            Self::Dict4x4_50 | Self::Dict5x5_50 | Self::Dict6x6_50 | Self::Dict7x7_50 => 50,
            Self::Dict4x4_100 | Self::Dict5x5_100 | Self::Dict6x6_100 | Self::Dict7x7_100 => 100,
            Self::Dict4x4_250 | Self::Dict5x5_250 | Self::Dict6x6_250 | Self::Dict7x7_250 => 250,
            Self::Dict4x4_1000 | Self::Dict5x5_1000 | Self::Dict6x6_1000 | Self::Dict7x7_1000 => {
                1000
            }
            Self::ArucoOriginal => 1024,
            Self::AprilTag16h5 => 30,
            Self::AprilTag25h9 => 35,
            Self::AprilTag36h10 => 2320,
            Self::AprilTag36h11 => 587,
        }
    }

    /// Table the whole family is cut from. The ArUco families share one
    /// table per marker size; smaller presets are its prefixes.
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Dict4x4_50 | Self::Dict4x4_100 | Self::Dict4x4_250 | Self::Dict4x4_1000 => {
                "DICT_4X4_1000"
            }
            Self::Dict5x5_50 | Self::Dict5x5_100 | Self::Dict5x5_250 | Self::Dict5x5_1000 => {
                "DICT_5X5_1000"
            }
            Self::Dict6x6_50 | Self::Dict6x6_100 | Self::Dict6x6_250 | Self::Dict6x6_1000 => {
                "DICT_6X6_1000"
            }
            Self::Dict7x7_50 | Self::Dict7x7_100 | Self::Dict7x7_250 | Self::Dict7x7_1000 => {
                "DICT_7X7_1000"
            }
            Self::ArucoOriginal => "DICT_ARUCO_ORIGINAL",
            Self::AprilTag16h5 => "DICT_APRILTAG_16h5",
            Self::AprilTag25h9 => "DICT_APRILTAG_25h9",
            Self::AprilTag36h10 => "DICT_APRILTAG_36h10",
            Self::AprilTag36h11 => "DICT_APRILTAG_36h11",
        }
    }

    /// OpenCV's correction capacity for the ArUco presets; the AprilTag
    /// presets take theirs from the table.
    const fn nominal_correction(self) -> Option<u8> {
        match self {
            Self::Dict4x4_50 | Self::Dict4x4_100 | Self::Dict4x4_250 => Some(1),
            Self::Dict4x4_1000 => Some(0),
            Self::Dict5x5_50 | Self::Dict5x5_100 => Some(3),
            Self::Dict5x5_250 | Self::Dict5x5_1000 => Some(2),
            Self::Dict6x6_50 => Some(6),
            Self::Dict6x6_100 | Self::Dict6x6_250 => Some(5),
            Self::Dict6x6_1000 => Some(4),
            Self::Dict7x7_50 => Some(9),
            Self::Dict7x7_100 | Self::Dict7x7_250 => Some(8),
            Self::Dict7x7_1000 => Some(6),
            Self::ArucoOriginal => Some(0),
            Self::AprilTag16h5 | Self::AprilTag25h9 | Self::AprilTag36h10 | Self::AprilTag36h11 => {
                None
            }
        }
    }

    /// Embedded table holding at least [`PredefinedDictionary::marker_count`]
    /// codes. The 4x4 family also accepts the shorter `DICT_4X4_100` table.
    fn table(self) -> Option<&'static CodeTable> {
        let short = match self {
            Self::Dict4x4_50 | Self::Dict4x4_100 => Some("DICT_4X4_100"),
            _ => None,
        };
        std::iter::once(self.table_name())
            .chain(short)
            .filter_map(builtins::table)
            .find(|t| t.marker_size == self.marker_size() && t.codes.len() >= self.marker_count())
    }

    /// Whether this build embeds the code table for the preset.
    pub fn is_bundled(self) -> bool {
        self.table().is_some()
    }

    /// The shared, lazily built dictionary for this preset.
    pub fn dictionary(self) -> Result<&'static Dictionary, MissingCodeTable> {
        let slot = &CACHE[self as usize];
        if let Some(dict) = slot.get() {
            return Ok(dict);
        }
        let table = self.table().ok_or(MissingCodeTable { preset: self })?;
        Ok(slot.get_or_init(|| {
            let correction = self
                .nominal_correction()
                .unwrap_or(table.max_correction_bits);
            Dictionary::from_static(
                self.name(),
                self.marker_size(),
                correction,
                &table.codes[..self.marker_count()],
            )
        }))
    }
}

impl fmt::Display for PredefinedDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PredefinedDictionary {
    type Err = UnknownDictionary;

    /// Accepts canonical names case-insensitively, with or without a `DICT_`
    /// prefix (`6x6_250`, `DICT_APRILTAG_36h11`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let key = upper.strip_prefix("DICT_").unwrap_or(&upper);
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(key))
            .ok_or_else(|| UnknownDictionary(trimmed.to_string()))
    }
}

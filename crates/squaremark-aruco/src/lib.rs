//! ArUco/AprilTag-style square marker detection.
//!
//! This crate covers:
//! - immutable dictionaries: the standard presets (from code tables embedded
//!   at build time), custom codebooks and marker rendering,
//! - candidate extraction (adaptive threshold, contours, quad filtering),
//! - per-candidate bit sampling and error-correcting dictionary lookup,
//! - [`MarkerDetector`], which ties the stages together.
//!
//! ```no_run
//! use squaremark_aruco::{detect_markers, PredefinedDictionary};
//! use squaremark_core::GrayImage;
//!
//! let img = GrayImage::filled(640, 480, 255);
//! let dict = PredefinedDictionary::Dict4x4_50.dictionary().unwrap();
//! let result = detect_markers(&img.view(), dict).unwrap();
//! for m in &result.markers {
//!     println!("id {} at {:?}", m.id, m.corners[0]);
//! }
//! ```

pub mod builtins;
mod bits;
mod candidates;
mod contour;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod params;
mod polygon;
mod presets;
mod threshold;

pub use bits::{rotate_code_u64, BitMatrix, MAX_MARKER_SIZE};
pub use candidates::{extract_candidates, Candidate};
pub use decode::DecodeMismatch;
pub use detector::{
    detect_markers, DetectError, DetectedMarker, DetectionResult, MarkerDetector,
    RejectedCandidate,
};
pub use dictionary::{Dictionary, DictionaryError};
pub use matcher::{Match, Matcher};
pub use params::{DecodeParams, DetectorParams};
pub use presets::{MissingCodeTable, PredefinedDictionary, UnknownDictionary};

//! Core types and utilities for square fiducial detection.
//!
//! This crate is intentionally small and purely geometric: grayscale
//! buffers, bilinear sampling, homographies and quad helpers. It does *not*
//! depend on any image codec.

mod geometry;
mod homography;
mod image;
mod logger;

pub use geometry::{
    convex_hull, is_convex, line_intersection, max_area_quad, min_corner_distance,
    normalize_quad_winding, perimeter, signed_area, Quad,
};
pub use homography::{estimate_homography, homography_from_4pt, warp_perspective_gray, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

//! End-to-end helpers on `image` crate buffers.

use crate::aruco::{DetectError, DetectionResult, MarkerDetector};
use crate::calib::{order_chessboard_corners, ChessboardError, PatternSize};
use crate::core::GrayImageView;
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use nalgebra::Point2;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced while turning a file or buffer into a usable image.
#[derive(thiserror::Error, Debug)]
pub enum ImageInputError {
    #[error("cannot read image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },
    #[error("image {path} is empty")]
    Empty { path: PathBuf },
    #[error("invalid grayscale image buffer length (expected {expected} bytes, got {got})")]
    InvalidGrayBuffer { expected: usize, got: usize },
    #[error("invalid grayscale image dimensions (width={width}, height={height})")]
    InvalidGrayDimensions { width: u32, height: u32 },
}

/// Decode an image file and convert it to 8-bit grayscale.
pub fn load_gray(path: impl AsRef<Path>) -> Result<::image::GrayImage, ImageInputError> {
    let path = path.as_ref();
    let img = ::image::open(path).map_err(|source| ImageInputError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    if img.width() == 0 || img.height() == 0 {
        return Err(ImageInputError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(img.to_luma8())
}

/// Borrow an `image::GrayImage` as the core view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Build an `image::GrayImage` from a raw grayscale buffer.
pub fn gray_image_from_slice(
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<::image::GrayImage, ImageInputError> {
    let Some(expected) = (width as usize).checked_mul(height as usize) else {
        return Err(ImageInputError::InvalidGrayDimensions { width, height });
    };
    if expected == 0 {
        return Err(ImageInputError::InvalidGrayDimensions { width, height });
    }
    if pixels.len() != expected {
        return Err(ImageInputError::InvalidGrayBuffer {
            expected,
            got: pixels.len(),
        });
    }
    ::image::GrayImage::from_raw(width, height, pixels.to_vec())
        .ok_or(ImageInputError::InvalidGrayDimensions { width, height })
}

/// Detect markers in any `image` buffer; color input is converted to gray.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(width = img.width(), height = img.height()))
)]
pub fn detect_markers_image(
    img: &::image::DynamicImage,
    detector: &MarkerDetector,
) -> Result<DetectionResult, DetectError> {
    let gray = img.to_luma8();
    detector.detect(&gray_view(&gray))
}

/// ChESS settings used for chessboard corners.
///
/// Tuned for printed boards filling a fair part of the frame; callers with
/// difficult images should override it.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

/// Raw ChESS X-junction responses.
pub fn detect_chess_corners_raw(
    img: &::image::GrayImage,
    cfg: &ChessConfig,
) -> Vec<CornerDescriptor> {
    find_chess_corners_image(img, cfg)
}

/// Find the inner corners of a `pattern` chessboard, row-major.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(img, cfg),
        fields(width = img.width(), height = img.height())
    )
)]
pub fn find_chessboard_corners(
    img: &::image::GrayImage,
    pattern: PatternSize,
    cfg: &ChessConfig,
) -> Result<Vec<Point2<f32>>, ChessboardError> {
    let raw: Vec<Point2<f32>> = detect_chess_corners_raw(img, cfg)
        .iter()
        .map(|c| Point2::new(c.x, c.y))
        .collect();
    log::debug!("{} ChESS corners", raw.len());
    order_chessboard_corners(&raw, pattern)
}

//! Debug overlays on RGB images: marker quads, pose axes, chessboard corners.
//!
//! Everything clips at the image border; nothing here fails.

use crate::aruco::DetectionResult;
use crate::calib::{project_points, CameraIntrinsics, PatternSize, Pose};
use crate::core::Quad;
use ::image::{Rgb, RgbImage};
use nalgebra::{Point2, Point3};

pub const GREEN: Rgb<u8> = Rgb([0, 220, 0]);
pub const RED: Rgb<u8> = Rgb([230, 0, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 80, 255]);
pub const YELLOW: Rgb<u8> = Rgb([255, 210, 0]);

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u64) < img.width() as u64 && (y as u64) < img.height() as u64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Line sampled at half-pixel steps, drawn as a square brush of odd width
/// `thickness` (even widths round down).
pub fn draw_line(
    img: &mut RgbImage,
    p0: Point2<f32>,
    p1: Point2<f32>,
    color: Rgb<u8>,
    thickness: u32,
) {
    let len = (p1 - p0).norm();
    if !len.is_finite() {
        return;
    }
    let steps = (len * 2.0).ceil().max(1.0) as usize;
    let r = (thickness.max(1) as i64 - 1) / 2;
    for i in 0..=steps {
        let p = p0 + (p1 - p0) * (i as f32 / steps as f32);
        let (x, y) = (p.x.round() as i64, p.y.round() as i64);
        for dy in -r..=r {
            for dx in -r..=r {
                put(img, x + dx, y + dy, color);
            }
        }
    }
}

/// Closed outline of a quad with its first corner marked.
pub fn draw_quad(img: &mut RgbImage, quad: &Quad, color: Rgb<u8>) {
    for i in 0..4 {
        draw_line(img, quad[i], quad[(i + 1) % 4], color, 3);
    }
    draw_cross(img, quad[0], 4.0, BLUE);
}

pub fn draw_cross(img: &mut RgbImage, p: Point2<f32>, half: f32, color: Rgb<u8>) {
    let (dx, dy) = (nalgebra::Vector2::new(half, 0.0), nalgebra::Vector2::new(0.0, half));
    draw_line(img, p - dx, p + dx, color, 1);
    draw_line(img, p - dy, p + dy, color, 1);
}

/// Accepted markers in green; rejected candidates in red when asked for.
pub fn draw_detections(img: &mut RgbImage, result: &DetectionResult, draw_rejected: bool) {
    if draw_rejected {
        for r in &result.rejected {
            draw_quad(img, &r.corners, RED);
        }
    }
    for m in &result.markers {
        draw_quad(img, &m.corners, GREEN);
    }
}

/// Project the object frame's axes (x red, y green, z blue) of `length`.
pub fn draw_axes(
    img: &mut RgbImage,
    pose: &Pose,
    intrinsics: &CameraIntrinsics,
    length: f64,
) {
    let pts = project_points(
        &[
            Point3::origin(),
            Point3::new(length, 0.0, 0.0),
            Point3::new(0.0, length, 0.0),
            Point3::new(0.0, 0.0, length),
        ],
        pose,
        intrinsics,
    );
    let Some(origin) = pts[0] else {
        return;
    };
    let to_f32 = |p: Point2<f64>| Point2::new(p.x as f32, p.y as f32);
    for (end, color) in pts[1..].iter().zip([RED, GREEN, BLUE]) {
        if let Some(end) = end {
            draw_line(img, to_f32(origin), to_f32(*end), color, 3);
        }
    }
}

/// Ordered chessboard corners joined row by row, first corner highlighted.
pub fn draw_chessboard_corners(img: &mut RgbImage, corners: &[Point2<f32>], pattern: PatternSize) {
    for row in corners.chunks(pattern.cols.max(1)) {
        for pair in row.windows(2) {
            draw_line(img, pair[0], pair[1], YELLOW, 1);
        }
    }
    for (i, &p) in corners.iter().enumerate() {
        draw_cross(img, p, 3.0, if i == 0 { RED } else { GREEN });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_clip_at_the_border() {
        let mut img = RgbImage::new(10, 10);
        draw_line(
            &mut img,
            Point2::new(-5.0, 5.0),
            Point2::new(20.0, 5.0),
            RED,
            1,
        );
        assert!((0..10).all(|x| *img.get_pixel(x, 5) == RED));
        assert_eq!(*img.get_pixel(5, 4), Rgb([0, 0, 0]));
    }

    #[test]
    fn axes_start_at_projected_origin() {
        let mut img = RgbImage::new(64, 64);
        let cam = CameraIntrinsics::pinhole(100.0, 100.0, 32.0, 32.0).unwrap();
        let pose = Pose::new(nalgebra::Vector3::zeros(), nalgebra::Vector3::new(0.0, 0.0, 1.0));
        draw_axes(&mut img, &pose, &cam, 0.2);
        // x axis runs right from the centre
        assert_eq!(*img.get_pixel(45, 32), RED);
        // y axis runs down
        assert_eq!(*img.get_pixel(32, 45), GREEN);
    }
}

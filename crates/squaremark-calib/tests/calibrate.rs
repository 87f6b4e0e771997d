use approx::assert_relative_eq;
use nalgebra::{Point2, Rotation3, Vector3};
use squaremark_calib::{
    board_object_points, calibrate_camera, order_chessboard_corners, project_points,
    CalibrationOptions, CalibrationSample, CameraIntrinsics, DistortionModel, ImageSize,
    PatternSize, Pose,
};

const SQUARE: f64 = 0.03;

fn pattern() -> PatternSize {
    PatternSize::new(9, 6)
}

fn truth_camera(distortion: Vec<f64>) -> CameraIntrinsics {
    CameraIntrinsics::new(800.0, 790.0, 330.0, 235.0, distortion).unwrap()
}

/// Board poses with varied tilt, all keeping the board inside a 640x480 view.
fn board_poses() -> Vec<Pose> {
    let centre = Vector3::new(4.0 * SQUARE, 2.5 * SQUARE, 0.0);
    [
        (0.3, 0.0, 0.0, 0.01, 0.0, 0.6),
        (-0.3, 0.1, 0.05, -0.02, 0.01, 0.65),
        (0.0, 0.35, -0.1, 0.0, -0.02, 0.6),
        (0.1, -0.35, 0.1, 0.02, 0.0, 0.7),
        (0.25, 0.25, 0.0, -0.01, 0.02, 0.55),
        (-0.2, -0.3, 0.2, 0.0, 0.0, 0.6),
        (0.4, -0.1, -0.05, 0.01, -0.01, 0.7),
    ]
    .iter()
    .map(|&(ax, ay, az, dx, dy, z)| {
        let rot = Rotation3::from_euler_angles(ax, ay, az);
        let t = Vector3::new(dx, dy, z) - rot * centre;
        Pose::from_rotation(&rot, t)
    })
    .collect()
}

/// Small deterministic pixel jitter in `[-amp, amp]`.
fn jitter(i: usize, amp: f64) -> f64 {
    let v = ((i as u64).wrapping_mul(2_654_435_761) % 1000) as f64 / 1000.0;
    (2.0 * v - 1.0) * amp
}

fn samples(cam: &CameraIntrinsics, noise: f64) -> Vec<CalibrationSample> {
    let object = board_object_points(pattern(), SQUARE);
    board_poses()
        .iter()
        .enumerate()
        .map(|(v, pose)| {
            let image_points = project_points(&object, pose, cam)
                .into_iter()
                .enumerate()
                .map(|(i, p)| {
                    let p = p.expect("board in front of camera");
                    let k = v * 1000 + 2 * i;
                    Point2::new(p.x + jitter(k, noise), p.y + jitter(k + 1, noise))
                })
                .collect();
            CalibrationSample {
                object_points: object.clone(),
                image_points,
            }
        })
        .collect()
}

fn size() -> ImageSize {
    ImageSize::new(640, 480)
}

#[test]
fn recovers_pinhole_camera_from_exact_views() {
    let truth = truth_camera(vec![0.0; 5]);
    let result =
        calibrate_camera(&samples(&truth, 0.0), size(), &CalibrationOptions::default()).unwrap();

    let cam = &result.intrinsics;
    assert_relative_eq!(cam.fx(), 800.0, max_relative = 0.005);
    assert_relative_eq!(cam.fy(), 790.0, max_relative = 0.005);
    assert_relative_eq!(cam.cx(), 330.0, epsilon = 1.0);
    assert_relative_eq!(cam.cy(), 235.0, epsilon = 1.0);
    assert!(result.rms < 1e-3, "rms {}", result.rms);
    assert_eq!(result.poses.len(), 7);
    assert_eq!(result.per_view_errors.len(), 7);
    assert_eq!(result.rvecs().len(), result.tvecs().len());
}

#[test]
fn recovers_radial_distortion() {
    let truth = truth_camera(vec![-0.2, 0.05, 0.001, -0.0008, 0.0]);
    let result =
        calibrate_camera(&samples(&truth, 0.0), size(), &CalibrationOptions::default()).unwrap();
    let d = result.intrinsics.distortion();
    assert_eq!(d.len(), 5);
    assert_relative_eq!(d[0], -0.2, epsilon = 0.02);
    assert_relative_eq!(result.intrinsics.fx(), 800.0, max_relative = 0.01);
    assert!(result.rms < 1e-2, "rms {}", result.rms);
}

#[test]
fn noisy_views_stay_within_tolerance() {
    let truth = truth_camera(vec![0.0; 5]);
    let options = CalibrationOptions {
        distortion_model: DistortionModel::Radial4,
        ..CalibrationOptions::default()
    };
    let result = calibrate_camera(&samples(&truth, 0.2), size(), &options).unwrap();
    assert_relative_eq!(result.intrinsics.fx(), 800.0, max_relative = 0.02);
    assert_relative_eq!(result.intrinsics.fy(), 790.0, max_relative = 0.02);
    assert!(result.rms < 0.5, "rms {}", result.rms);
    assert_eq!(result.intrinsics.distortion().len(), 4);
}

#[test]
fn fixed_parameters_are_not_refined() {
    let truth = truth_camera(vec![0.0; 5]);
    let options = CalibrationOptions {
        fix_principal_point: true,
        zero_tangent_dist: true,
        ..CalibrationOptions::default()
    };
    let result = calibrate_camera(&samples(&truth, 0.0), size(), &options).unwrap();
    let cam = &result.intrinsics;
    assert_eq!((cam.cx(), cam.cy()), (319.5, 239.5));
    assert_eq!((cam.distortion()[2], cam.distortion()[3]), (0.0, 0.0));
}

#[test]
fn scrambled_detections_calibrate_after_ordering() {
    let truth = truth_camera(vec![0.0; 5]);
    let ordered_samples: Vec<CalibrationSample> = samples(&truth, 0.0)
        .into_iter()
        .map(|s| {
            let n = s.image_points.len();
            let raw: Vec<Point2<f32>> = (0..n)
                .map(|i| {
                    let p = s.image_points[(i * 5 + 1) % n];
                    Point2::new(p.x as f32, p.y as f32)
                })
                .collect();
            let grid = order_chessboard_corners(&raw, pattern()).expect("grid");
            CalibrationSample {
                object_points: s.object_points,
                image_points: grid
                    .iter()
                    .map(|p| Point2::new(p.x as f64, p.y as f64))
                    .collect(),
            }
        })
        .collect();

    let result =
        calibrate_camera(&ordered_samples, size(), &CalibrationOptions::default()).unwrap();
    // the grid origin may be any board corner; f is insensitive to that
    assert_relative_eq!(result.intrinsics.fx(), 800.0, max_relative = 0.02);
    assert!(result.rms < 0.05, "rms {}", result.rms);
}

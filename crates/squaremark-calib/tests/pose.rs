use approx::assert_relative_eq;
use nalgebra::{Point2, Rotation3, Vector3};
use squaremark_calib::{
    estimate_marker_poses, marker_object_points, project_points, reprojection_rms,
    CameraIntrinsics, Pose, PoseError, PoseOptions,
};
use squaremark_core::Quad;

fn to_quad(points: &[Option<Point2<f64>>]) -> Quad {
    std::array::from_fn(|i| {
        let p = points[i].expect("visible");
        Point2::new(p.x as f32, p.y as f32)
    })
}

#[test]
fn batch_poses_keep_marker_order() {
    let cam = CameraIntrinsics::new(700.0, 700.0, 320.0, 240.0, vec![-0.1, 0.01, 0.0, 0.0])
        .unwrap();
    let length = 0.05;
    let object = marker_object_points(length);
    let flip = Rotation3::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI);
    let truths = [
        Pose::from_rotation(&flip, Vector3::new(-0.1, 0.0, 0.5)),
        Pose::from_rotation(
            &(flip * Rotation3::from_euler_angles(0.3, -0.2, 0.4)),
            Vector3::new(0.08, 0.05, 0.6),
        ),
    ];
    let mut quads: Vec<Quad> = truths
        .iter()
        .map(|p| to_quad(&project_points(&object, p, &cam)))
        .collect();
    // a collapsed quad in the middle must not disturb its neighbours
    quads.insert(1, [Point2::new(5.0, 5.0); 4]);

    let poses = estimate_marker_poses(&quads, length, &cam, &PoseOptions::default());
    assert_eq!(poses.len(), 3);
    assert_eq!(poses[1], Err(PoseError::Degenerate));
    for (est, truth) in [&poses[0], &poses[2]].into_iter().zip(&truths) {
        let est = est.as_ref().expect("pose");
        assert_relative_eq!(est.tvec, truth.tvec, epsilon = 1e-3);
        let image: Vec<Point2<f64>> = project_points(&object, truth, &cam)
            .into_iter()
            .flatten()
            .collect();
        assert!(reprojection_rms(&object, &image, est, &cam) < 0.05);
    }
}

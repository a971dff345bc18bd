use approx::assert_relative_eq;
use avframe_3d::{Cuboid, CuboidSize, Transform};
use avframe_frame::{CameraImage, FrameUri, Viewport};
use avframe_image::{BBox, ImageSize};
use rand::{Rng, SeedableRng};

const K: [[f64; 3]; 3] = [[100.0, 0.0, 50.0], [0.0, 100.0, 50.0], [0.0, 0.0, 1.0]];
const SIZE: ImageSize = ImageSize {
    width: 100,
    height: 100,
};
const CUBE: CuboidSize = CuboidSize {
    width: 2.0,
    length: 2.0,
    height: 2.0,
};

fn synthetic_camera() -> Result<CameraImage, Box<dyn std::error::Error>> {
    Ok(CameraImage::new(
        "CAM_FRONT",
        vec![],
        SIZE,
        0,
        Transform::identity(),
        K,
    )?)
}

#[test]
fn cuboid_ahead_projects_to_centered_box() -> Result<(), Box<dyn std::error::Error>> {
    let camera = synthetic_camera()?;
    let cuboid = Cuboid::from_pose("t", "car", 0, &Transform::from_translation([0.0, 0.0, 10.0]), CUBE);
    let bbox = camera.project_cuboid_to_bbox(&cuboid);

    assert!(bbox.is_visible());
    let [u, v] = bbox.center();
    assert_relative_eq!(u, 50.0, epsilon = 1e-9);
    assert_relative_eq!(v, 50.0, epsilon = 1e-9);
    // 100 * 2 / 10 at the center plane; the near face makes it slightly larger
    assert_relative_eq!(bbox.width(), 20.0, epsilon = 2.5);
    assert_relative_eq!(bbox.height(), 20.0, epsilon = 2.5);
    Ok(())
}

#[test]
fn cuboid_behind_is_invisible() -> Result<(), Box<dyn std::error::Error>> {
    let camera = synthetic_camera()?;
    let cuboid = Cuboid::from_pose("t", "car", 0, &Transform::from_translation([0.0, 0.0, -10.0]), CUBE);
    let bbox = camera.project_cuboid_to_bbox(&cuboid);
    assert!(!bbox.is_visible());
    assert_eq!(bbox.get_area(), 0.0);
    Ok(())
}

#[test]
fn random_cuboids_fully_behind_are_invisible() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let yaw = Transform::from_axis_angle(&[0.0, 1.0, 0.0], 0.3, [0.0, 0.0, 0.0])?;
    let camera = CameraImage::new("CAM", vec![], SIZE, 0, yaw, K)?;

    for _ in 0..200 {
        // all corners stay behind the camera plane
        let center = [
            rng.random_range(-50.0..50.0),
            rng.random_range(-50.0..50.0),
            rng.random_range(-60.0..-3.0),
        ];
        let pose = camera.cam_from_ego().inverse().compose(&Transform::from_translation(center));
        let cuboid = Cuboid::from_pose("t", "car", 0, &pose, CUBE);
        assert!(!camera.project_cuboid_to_bbox(&cuboid).is_visible());
    }
    Ok(())
}

#[test]
fn point_on_optical_axis_hits_principal_point() -> Result<(), Box<dyn std::error::Error>> {
    // camera mounted 1.5m forward and rotated to look along ego +x
    let rotation = [[0.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]];
    let cam_from_mount = Transform::new(rotation, [0.0; 3])?;
    let ego_from_cam = Transform::from_translation([1.5, 0.0, 0.0]).compose(&cam_from_mount.inverse());
    let camera = CameraImage::new("CAM", vec![], SIZE, 0, ego_from_cam.inverse(), K)?;

    let axis = camera.principal_axis_in_ego();
    assert_relative_eq!(axis[0], 1.0, epsilon = 1e-12);

    let origin = camera.camera_origin_in_ego();
    let point = [origin[0] + 7.0 * axis[0], origin[1] + 7.0 * axis[1], origin[2] + 7.0 * axis[2]];
    let projected = camera.project_ego_to_image(&[point], true);
    assert_eq!(projected.len(), 1);
    assert_relative_eq!(projected[0].uv[0], K[0][2], epsilon = 1e-9);
    assert_relative_eq!(projected[0].uv[1], K[1][2], epsilon = 1e-9);
    assert_relative_eq!(projected[0].depth, 7.0, epsilon = 1e-9);
    Ok(())
}

#[test]
fn uri_roundtrip_with_and_without_viewport() -> Result<(), Box<dyn std::error::Error>> {
    let plain = FrameUri::new("nuscenes", "val", "scene-0103", 1533151603547590, "CAM_FRONT_LEFT")?;
    assert_eq!(FrameUri::parse(&plain.serialize())?, plain);

    let narrowed = plain.with_viewport(Viewport::from(&BBox::new(10.0, 10.0, 64.0, 32.0, SIZE)));
    assert_eq!(FrameUri::parse(&narrowed.serialize())?, narrowed);
    assert_ne!(narrowed, plain);
    Ok(())
}

use avframe_3d::{CoordFrame, Cuboid, PointCloud, PointCloudError, Transform, TransformError};
use avframe_image::{viz, BBox, ImageError, ImageSize};
use glam::{DMat3, DVec3};

/// Smallest `|det K|` accepted for an intrinsic matrix.
const MIN_INTRINSICS_DETERMINANT: f64 = 1e-12;

/// Errors raised while building a [`CameraImage`].
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The intrinsic matrix is singular or contains non-finite values.
    #[error("Invalid intrinsics for camera {camera}: {reason}")]
    InvalidIntrinsics {
        /// Camera name.
        camera: String,
        /// What is wrong with the matrix.
        reason: String,
    },

    /// The extrinsics are not a valid rigid transform.
    #[error(transparent)]
    InvalidTransform(#[from] TransformError),
}

/// A point projected into a camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    /// Index of the point in the input slice.
    pub index: usize,
    /// Pixel coordinates `(u, v)`; NaN for points behind the camera.
    pub uv: [f64; 2],
    /// Depth along the camera `z` axis.
    pub depth: f64,
}

impl ProjectedPoint {
    /// Whether the point lies on or behind the camera plane.
    pub fn is_behind_camera(&self) -> bool {
        !(self.depth > 0.0)
    }
}

/// One camera image of a frame together with its calibration.
///
/// Built once per frame by the assembler and read-only afterwards. The
/// camera owns the projection of ego-frame points and cuboids into pixels.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct CameraImage {
    camera_name: String,
    image_bytes: Vec<u8>,
    image_size: ImageSize,
    viewport: BBox,
    timestamp: i64,
    cam_from_ego: Transform,
    intrinsics: [[f64; 3]; 3],
    principal_axis_in_ego: [f64; 3],
    bboxes: Vec<BBox>,
    cloud: Option<PointCloud>,
}

impl CameraImage {
    /// Create a camera record viewing the full image.
    ///
    /// `intrinsics` is the row-major pinhole matrix `K` and `cam_from_ego`
    /// maps ego-frame points into the camera frame.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::InvalidIntrinsics`] if `K` is singular or has
    /// non-finite entries.
    pub fn new(
        camera_name: impl Into<String>,
        image_bytes: Vec<u8>,
        image_size: ImageSize,
        timestamp: i64,
        cam_from_ego: Transform,
        intrinsics: [[f64; 3]; 3],
    ) -> Result<Self, CameraError> {
        let camera_name = camera_name.into();
        let principal_axis_in_ego = principal_axis(&camera_name, &intrinsics, &cam_from_ego)?;

        Ok(Self {
            camera_name,
            image_bytes,
            image_size,
            viewport: BBox::of_size(image_size),
            timestamp,
            cam_from_ego,
            intrinsics,
            principal_axis_in_ego,
            bboxes: Vec::new(),
            cloud: None,
        })
    }

    /// Narrow the camera to a sub-region of the image; it is clipped to the
    /// image bounds.
    pub fn with_viewport(mut self, viewport: &BBox) -> Self {
        self.viewport = viewport.clip_to(self.image_size);
        self
    }

    /// Attach the projected boxes.
    pub fn with_bboxes(mut self, bboxes: Vec<BBox>) -> Self {
        self.bboxes = bboxes;
        self
    }

    /// Attach a projected point cloud.
    pub fn with_cloud(mut self, cloud: PointCloud) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// The camera name, e.g. `CAM_FRONT`.
    pub fn camera_name(&self) -> &str {
        &self.camera_name
    }

    /// The encoded image.
    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }

    /// The image size in pixels.
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    /// The region of interest; the full image unless narrowed.
    pub fn viewport(&self) -> &BBox {
        &self.viewport
    }

    /// Capture timestamp of the image.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Maps ego-frame points into the camera frame.
    pub fn cam_from_ego(&self) -> &Transform {
        &self.cam_from_ego
    }

    /// The row-major intrinsic matrix `K`.
    pub fn intrinsics(&self) -> &[[f64; 3]; 3] {
        &self.intrinsics
    }

    /// Unit vector along the optical axis, in the ego frame.
    pub fn principal_axis_in_ego(&self) -> [f64; 3] {
        self.principal_axis_in_ego
    }

    /// The camera center in the ego frame.
    pub fn camera_origin_in_ego(&self) -> [f64; 3] {
        self.cam_from_ego.inverse().apply(&[0.0; 3])
    }

    /// The projected boxes in image pixels.
    pub fn bboxes(&self) -> &[BBox] {
        &self.bboxes
    }

    /// The projected point cloud, rows are `[u, v, depth]`.
    pub fn cloud(&self) -> Option<&PointCloud> {
        self.cloud.as_ref()
    }

    /// The boxes re-expressed in viewport-local pixels.
    pub fn bboxes_in_viewport(&self) -> Vec<BBox> {
        self.bboxes
            .iter()
            .map(|b| b.relative_to(&self.viewport))
            .collect()
    }

    fn pixel_from_cam(&self, p: &[f64; 3]) -> [f64; 2] {
        let k = &self.intrinsics;
        let (x, y) = (p[0] / p[2], p[1] / p[2]);
        [
            k[0][0] * x + k[0][1] * y + k[0][2],
            k[1][0] * x + k[1][1] * y + k[1][2],
        ]
    }

    /// Project ego-frame points into the image.
    ///
    /// Points on or behind the camera plane are dropped when
    /// `omit_offscreen` is set and otherwise kept with a NaN pixel. With
    /// `omit_offscreen`, points landing outside `[0, width) x [0, height)`
    /// are dropped too. Surviving points keep the input order.
    ///
    /// # Examples
    ///
    /// ```
    /// use avframe_3d::Transform;
    /// use avframe_frame::CameraImage;
    /// use avframe_image::ImageSize;
    ///
    /// let k = [[100.0, 0.0, 50.0], [0.0, 100.0, 50.0], [0.0, 0.0, 1.0]];
    /// let size = ImageSize { width: 100, height: 100 };
    /// let camera = CameraImage::new("CAM", vec![], size, 0, Transform::identity(), k).unwrap();
    ///
    /// let projected = camera.project_ego_to_image(&[[0.0, 0.0, 5.0], [0.0, 0.0, -5.0]], true);
    /// assert_eq!(projected.len(), 1);
    /// assert_eq!(projected[0].uv, [50.0, 50.0]);
    /// ```
    pub fn project_ego_to_image(
        &self,
        points_in_ego: &[[f64; 3]],
        omit_offscreen: bool,
    ) -> Vec<ProjectedPoint> {
        self.cam_from_ego
            .apply_many(points_in_ego)
            .iter()
            .enumerate()
            .filter_map(|(index, p)| {
                let depth = p[2];
                if !(depth > 0.0) {
                    return (!omit_offscreen).then_some(ProjectedPoint {
                        index,
                        uv: [f64::NAN; 2],
                        depth,
                    });
                }

                let uv = self.pixel_from_cam(p);
                if omit_offscreen && !self.image_size.contains(uv[0], uv[1]) {
                    return None;
                }
                Some(ProjectedPoint { index, uv, depth })
            })
            .collect()
    }

    /// Project a cuboid given in the ego frame to an image-space box.
    ///
    /// The box spans the pixels of the corners in front of the camera,
    /// intersected with the viewport, and carries the cuboid's category and
    /// track. It is marked not visible when no corner is in front of the
    /// camera, when the cuboid center is behind the camera origin along the
    /// principal axis, or when nothing is left after clipping.
    pub fn project_cuboid_to_bbox(&self, cuboid: &Cuboid) -> BBox {
        let corners_in_cam = self.cam_from_ego.apply_many(cuboid.corners());
        let pixels: Vec<[f64; 2]> = corners_in_cam
            .iter()
            .filter(|p| p[2] > 0.0)
            .map(|p| self.pixel_from_cam(p))
            .collect();

        let center = DVec3::from_array(cuboid.center());
        let origin = DVec3::from_array(self.camera_origin_in_ego());
        let in_front =
            (center - origin).dot(DVec3::from_array(self.principal_axis_in_ego)) > 0.0;

        let extent = pixels.iter().fold(None, |acc: Option<[f64; 4]>, uv| {
            Some(match acc {
                None => [uv[0], uv[1], uv[0], uv[1]],
                Some([u0, v0, u1, v1]) => [u0.min(uv[0]), v0.min(uv[1]), u1.max(uv[0]), v1.max(uv[1])],
            })
        });
        let [u0, v0, u1, v1] = extent.unwrap_or([0.0; 4]);

        let bbox = BBox::from_extent(u0, v0, u1, v1, self.image_size)
            .get_intersection_with(&self.viewport)
            .with_category(cuboid.category_name())
            .with_track_id(cuboid.track_id());

        if pixels.is_empty() || !in_front || bbox.get_area() <= 0.0 {
            bbox.into_invisible()
        } else {
            bbox
        }
    }

    /// Project a point cloud into the image, dropping offscreen points.
    ///
    /// The result is named `<sensor>_in_cam`, lives in the
    /// [`CoordFrame::Image`] frame and has one `[u, v, depth]` row per
    /// surviving point.
    pub fn projected_cloud(&self, cloud: &PointCloud) -> Result<PointCloud, PointCloudError> {
        let in_ego = cloud.to_ego()?;
        let rows = self
            .project_ego_to_image(in_ego.points(), true)
            .into_iter()
            .map(|p| [p.uv[0], p.uv[1], p.depth])
            .collect();
        Ok(in_ego.with_points(
            format!("{}_in_cam", cloud.sensor_name()),
            rows,
            CoordFrame::Image,
        ))
    }

    /// Decode the image and draw the visible boxes on it.
    pub fn debug_overlay(&self, thickness: u32) -> Result<viz::RgbImage, ImageError> {
        viz::debug_overlay(&self.image_bytes, &self.bboxes, thickness)
    }
}

/// Unit optical axis of a camera in the ego frame.
///
/// With `M = K * R` the axis is `sign(det M) * m3 / |m3|`, where `m3` is the
/// third row of `M` and `R` the rotation of `cam_from_ego`.
pub fn principal_axis(
    camera_name: &str,
    intrinsics: &[[f64; 3]; 3],
    cam_from_ego: &Transform,
) -> Result<[f64; 3], CameraError> {
    let invalid = |reason: String| CameraError::InvalidIntrinsics {
        camera: camera_name.to_string(),
        reason,
    };

    if !intrinsics.iter().flatten().all(|v| v.is_finite()) {
        return Err(invalid("non-finite entries".to_string()));
    }

    // glam is column-major
    let k = DMat3::from_cols_array_2d(intrinsics).transpose();
    let det_k = k.determinant();
    if det_k.abs() < MIN_INTRINSICS_DETERMINANT {
        return Err(invalid(format!("singular matrix (det {det_k:.3e})")));
    }

    let r = DMat3::from_cols_array_2d(cam_from_ego.rotation()).transpose();
    let m = k * r;
    let m3 = m.row(2);
    let norm = m3.length();
    if !(norm > 0.0) {
        return Err(invalid("degenerate projection row".to_string()));
    }

    Ok((m.determinant().signum() * m3 / norm).to_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use avframe_3d::CuboidSize;

    const K: [[f64; 3]; 3] = [[100.0, 0.0, 50.0], [0.0, 100.0, 50.0], [0.0, 0.0, 1.0]];
    const SIZE: ImageSize = ImageSize {
        width: 100,
        height: 100,
    };
    const UNIT: CuboidSize = CuboidSize {
        width: 2.0,
        length: 2.0,
        height: 2.0,
    };

    fn camera() -> Result<CameraImage, CameraError> {
        CameraImage::new("CAM_FRONT", vec![], SIZE, 0, Transform::identity(), K)
    }

    fn cuboid_at(center: [f64; 3]) -> Cuboid {
        Cuboid::from_pose("t0", "car", 0, &Transform::from_translation(center), UNIT)
    }

    #[test]
    fn test_principal_axis_identity() -> Result<(), CameraError> {
        let cam = camera()?;
        assert_eq!(cam.principal_axis_in_ego(), [0.0, 0.0, 1.0]);
        assert_eq!(cam.camera_origin_in_ego(), [0.0; 3]);
        Ok(())
    }

    #[test]
    fn test_principal_axis_follows_rotation() -> Result<(), Box<dyn std::error::Error>> {
        // camera looking along ego +x: cam z = ego x, cam x = -ego y, cam y = -ego z
        let rotation = [[0.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0]];
        let cam_from_ego = Transform::new(rotation, [0.0, 0.0, 0.0])?;
        let axis = principal_axis("CAM", &K, &cam_from_ego)?;
        assert_relative_eq!(axis[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(axis[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(axis[2], 0.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_singular_intrinsics() {
        let k = [[100.0, 0.0, 50.0], [0.0, 0.0, 50.0], [0.0, 0.0, 1.0]];
        let result = CameraImage::new("CAM", vec![], SIZE, 0, Transform::identity(), k);
        assert!(matches!(result, Err(CameraError::InvalidIntrinsics { .. })));

        let k = [[f64::NAN, 0.0, 50.0], [0.0, 1.0, 50.0], [0.0, 0.0, 1.0]];
        let result = CameraImage::new("CAM", vec![], SIZE, 0, Transform::identity(), k);
        assert!(matches!(result, Err(CameraError::InvalidIntrinsics { .. })));
    }

    #[test]
    fn test_optical_axis_point_hits_principal_point() -> Result<(), CameraError> {
        let cam = camera()?;
        for depth in [0.5, 3.0, 1000.0] {
            let projected = cam.project_ego_to_image(&[[0.0, 0.0, depth]], true);
            assert_eq!(projected.len(), 1);
            assert_relative_eq!(projected[0].uv[0], 50.0);
            assert_relative_eq!(projected[0].uv[1], 50.0);
            assert_relative_eq!(projected[0].depth, depth);
        }
        Ok(())
    }

    #[test]
    fn test_project_keeps_order_and_sentinel() -> Result<(), CameraError> {
        let cam = camera()?;
        let points = [
            [0.0, 0.0, -1.0],
            [1.0, 0.0, 10.0],
            [100.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
            [-1.0, 0.0, 10.0],
        ];

        let kept = cam.project_ego_to_image(&points, true);
        let indices: Vec<usize> = kept.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 4]);
        assert_relative_eq!(kept[0].uv[0], 60.0);
        assert_relative_eq!(kept[1].uv[0], 40.0);

        let all = cam.project_ego_to_image(&points, false);
        assert_eq!(all.len(), points.len());
        assert!(all[0].is_behind_camera() && all[0].uv[0].is_nan());
        assert!(all[3].is_behind_camera());
        // offscreen but in front keeps its pixel
        assert_relative_eq!(all[2].uv[0], 10050.0);
        assert!(!all[2].is_behind_camera());
        Ok(())
    }

    #[test]
    fn test_cuboid_in_front() -> Result<(), CameraError> {
        let cam = camera()?;
        let bbox = cam.project_cuboid_to_bbox(&cuboid_at([0.0, 0.0, 10.0]));
        assert!(bbox.is_visible());
        assert_eq!(bbox.category_name(), "car");
        assert_eq!(bbox.track_id(), Some("t0"));
        let [cu, cv] = bbox.center();
        assert_relative_eq!(cu, 50.0, epsilon = 1e-9);
        assert_relative_eq!(cv, 50.0, epsilon = 1e-9);
        // the near face at depth 9 spans 2 * 100 / 9 pixels
        assert_relative_eq!(bbox.width(), 200.0 / 9.0, epsilon = 1e-9);
        assert_relative_eq!(bbox.height(), 200.0 / 9.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_cuboid_behind() -> Result<(), CameraError> {
        let cam = camera()?;
        let bbox = cam.project_cuboid_to_bbox(&cuboid_at([0.0, 0.0, -10.0]));
        assert!(!bbox.is_visible());
        assert_eq!(bbox.get_area(), 0.0);
        Ok(())
    }

    #[test]
    fn test_cuboid_straddling_camera_plane() -> Result<(), CameraError> {
        let cam = camera()?;
        // center slightly in front, back corners behind the camera
        let bbox = cam.project_cuboid_to_bbox(&cuboid_at([0.0, 0.0, 0.5]));
        assert!(bbox.is_visible());
        assert!(bbox.is_full_image());

        // center behind, front corners in front: not visible
        let bbox = cam.project_cuboid_to_bbox(&cuboid_at([0.0, 0.0, -0.5]));
        assert!(!bbox.is_visible());
        Ok(())
    }

    #[test]
    fn test_cuboid_offscreen() -> Result<(), CameraError> {
        let cam = camera()?;
        let bbox = cam.project_cuboid_to_bbox(&cuboid_at([50.0, 0.0, 10.0]));
        assert!(!bbox.is_visible());
        assert_eq!(bbox.get_area(), 0.0);
        Ok(())
    }

    #[test]
    fn test_cuboid_clipped_to_viewport() -> Result<(), CameraError> {
        let viewport = BBox::new(0.0, 0.0, 50.0, 100.0, SIZE);
        let cam = camera()?.with_viewport(&viewport);
        let bbox = cam.project_cuboid_to_bbox(&cuboid_at([0.0, 0.0, 10.0]));
        assert!(bbox.is_visible());
        assert_relative_eq!(bbox.x2(), 50.0);

        let right = cam.project_cuboid_to_bbox(&cuboid_at([3.0, 0.0, 10.0]));
        assert!(!right.is_visible());

        let cam = cam.with_bboxes(vec![bbox.clone()]);
        let local = cam.bboxes_in_viewport();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].image_size(), ImageSize { width: 50, height: 100 });
        Ok(())
    }

    #[test]
    fn test_projected_cloud() -> Result<(), Box<dyn std::error::Error>> {
        let cam = camera()?;
        // lidar 1m behind the ego origin
        let cloud = PointCloud::new(
            "LIDAR_TOP",
            7,
            vec![[0.0, 0.0, 11.0], [0.0, 0.0, -3.0]],
            CoordFrame::Sensor,
            Transform::from_translation([0.0, 0.0, 1.0]),
        );
        let projected = cam.projected_cloud(&cloud)?;
        assert_eq!(projected.sensor_name(), "LIDAR_TOP_in_cam");
        assert_eq!(projected.frame(), CoordFrame::Image);
        assert_eq!(projected.timestamp(), 7);
        assert_eq!(projected.points(), &[[50.0, 50.0, 10.0]]);
        Ok(())
    }
}

//! Records are validated when they are deserialized or built: a rotation
//! that is not orthonormal never makes it past the adapter boundary.

use std::collections::BTreeMap;

use avframe_3d::{transforms, Cuboid, CuboidSize, Transform, TransformError};
use avframe_image::ImageSize;

/// A rotation as stored by a dataset: a row-major matrix or a `(w, x, y, z)`
/// quaternion.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Rotation {
    /// Row-major 3x3 matrix.
    Matrix([[f64; 3]; 3]),
    /// Unit quaternion `(w, x, y, z)`.
    Quaternion([f64; 4]),
}

impl Rotation {
    /// Convert to a row-major rotation matrix.
    pub fn to_matrix(&self) -> Result<[[f64; 3]; 3], TransformError> {
        match self {
            Rotation::Matrix(m) => Ok(*m),
            Rotation::Quaternion(q) => transforms::quaternion_to_rotation_matrix(q),
        }
    }
}

fn rigid(rotation: &Rotation, translation: [f64; 3]) -> Result<Transform, TransformError> {
    Transform::new(rotation.to_matrix()?, translation)
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RawPose {
    timestamp: i64,
    rotation: Rotation,
    translation: [f64; 3],
}

/// The ego vehicle pose at one timestamp.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawPose", into = "RawPose")]
pub struct PoseRecord {
    /// Timestamp of the sensor reading the pose was localized from.
    pub timestamp: i64,
    /// Maps ego-frame points into the world frame.
    pub world_from_ego: Transform,
}

impl PoseRecord {
    /// Build a pose from a raw rotation and translation.
    pub fn new(
        timestamp: i64,
        rotation: &Rotation,
        translation: [f64; 3],
    ) -> Result<Self, TransformError> {
        Ok(Self {
            timestamp,
            world_from_ego: rigid(rotation, translation)?,
        })
    }

    /// Maps world-frame points into the ego frame.
    pub fn world_to_ego(&self) -> Transform {
        self.world_from_ego.inverse()
    }
}

impl TryFrom<RawPose> for PoseRecord {
    type Error = TransformError;

    fn try_from(raw: RawPose) -> Result<Self, Self::Error> {
        Self::new(raw.timestamp, &raw.rotation, raw.translation)
    }
}

impl From<PoseRecord> for RawPose {
    fn from(pose: PoseRecord) -> Self {
        Self {
            timestamp: pose.timestamp,
            rotation: Rotation::Matrix(*pose.world_from_ego.rotation()),
            translation: *pose.world_from_ego.translation(),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RawCalibration {
    sensor: String,
    rotation: Rotation,
    translation: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera_intrinsic: Option<[[f64; 3]; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<usize>,
}

/// Where a sensor is mounted on the vehicle and, for cameras, its
/// intrinsics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawCalibration", into = "RawCalibration")]
pub struct CalibrationRecord {
    /// Sensor name, e.g. `CAM_FRONT` or `LIDAR_TOP`.
    pub sensor: String,
    /// Maps sensor-frame points into the ego frame.
    pub ego_from_sensor: Transform,
    /// Row-major pinhole matrix `K`; cameras only.
    pub intrinsics: Option<[[f64; 3]; 3]>,
    /// Image size; cameras only.
    pub image_size: Option<ImageSize>,
}

impl CalibrationRecord {
    /// Calibration of a non-imaging sensor such as a lidar.
    pub fn sensor(
        sensor: impl Into<String>,
        rotation: &Rotation,
        translation: [f64; 3],
    ) -> Result<Self, TransformError> {
        Ok(Self {
            sensor: sensor.into(),
            ego_from_sensor: rigid(rotation, translation)?,
            intrinsics: None,
            image_size: None,
        })
    }

    /// Calibration of a camera.
    pub fn camera(
        sensor: impl Into<String>,
        rotation: &Rotation,
        translation: [f64; 3],
        intrinsics: [[f64; 3]; 3],
        image_size: ImageSize,
    ) -> Result<Self, TransformError> {
        Ok(Self {
            intrinsics: Some(intrinsics),
            image_size: Some(image_size),
            ..Self::sensor(sensor, rotation, translation)?
        })
    }

    /// Whether the record describes a camera.
    pub fn is_camera(&self) -> bool {
        self.intrinsics.is_some() && self.image_size.is_some()
    }

    /// Maps ego-frame points into the sensor frame.
    pub fn sensor_from_ego(&self) -> Transform {
        self.ego_from_sensor.inverse()
    }
}

impl TryFrom<RawCalibration> for CalibrationRecord {
    type Error = TransformError;

    fn try_from(raw: RawCalibration) -> Result<Self, Self::Error> {
        let record = Self::sensor(raw.sensor, &raw.rotation, raw.translation)?;
        let image_size = match (raw.width, raw.height) {
            (Some(width), Some(height)) => Some(ImageSize { width, height }),
            _ => None,
        };
        Ok(Self {
            intrinsics: raw.camera_intrinsic,
            image_size,
            ..record
        })
    }
}

impl From<CalibrationRecord> for RawCalibration {
    fn from(record: CalibrationRecord) -> Self {
        Self {
            sensor: record.sensor,
            rotation: Rotation::Matrix(*record.ego_from_sensor.rotation()),
            translation: *record.ego_from_sensor.translation(),
            camera_intrinsic: record.intrinsics,
            width: record.image_size.map(|s| s.width),
            height: record.image_size.map(|s| s.height),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawGeometry {
    Pose {
        rotation: Rotation,
        translation: [f64; 3],
        size: CuboidSize,
    },
    Corners {
        corners: [[f64; 3]; 8],
    },
}

/// The 3D extent of an annotated object in the world frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawGeometry", into = "RawGeometry")]
pub enum AnnotationGeometry {
    /// An oriented box.
    Pose {
        /// Maps object-frame points into the world frame.
        world_from_obj: Transform,
        /// Box extent.
        size: CuboidSize,
    },
    /// Eight box corners without orientation.
    Corners([[f64; 3]; 8]),
}

impl TryFrom<RawGeometry> for AnnotationGeometry {
    type Error = TransformError;

    fn try_from(raw: RawGeometry) -> Result<Self, Self::Error> {
        match raw {
            RawGeometry::Pose {
                rotation,
                translation,
                size,
            } => Ok(Self::Pose {
                world_from_obj: rigid(&rotation, translation)?,
                size,
            }),
            RawGeometry::Corners { corners } => {
                if corners.iter().flatten().all(|v| v.is_finite()) {
                    Ok(Self::Corners(corners))
                } else {
                    Err(TransformError::NonFinite)
                }
            }
        }
    }
}

impl From<AnnotationGeometry> for RawGeometry {
    fn from(geometry: AnnotationGeometry) -> Self {
        match geometry {
            AnnotationGeometry::Pose {
                world_from_obj,
                size,
            } => Self::Pose {
                rotation: Rotation::Matrix(*world_from_obj.rotation()),
                translation: *world_from_obj.translation(),
                size,
            },
            AnnotationGeometry::Corners(corners) => Self::Corners { corners },
        }
    }
}

/// One annotated object at one sample.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationRecord {
    /// Stable identifier of the object across samples.
    pub track_id: String,
    /// Category label, e.g. `vehicle.car`.
    pub category_name: String,
    /// The object's box in the world frame.
    pub geometry: AnnotationGeometry,
    /// Attribute names, e.g. `vehicle.moving`.
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Dataset token of the annotation, kept as cuboid metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AnnotationRecord {
    /// Build the cuboid of this annotation in the ego frame.
    ///
    /// `world_to_ego` maps world-frame points into the ego frame at the
    /// frame's reference timestamp.
    pub fn to_cuboid(&self, world_to_ego: &Transform, timestamp: i64) -> Cuboid {
        let cuboid = match &self.geometry {
            AnnotationGeometry::Pose {
                world_from_obj,
                size,
            } => Cuboid::from_pose(
                &self.track_id,
                &self.category_name,
                timestamp,
                &world_to_ego.compose(world_from_obj),
                *size,
            ),
            AnnotationGeometry::Corners(corners) => {
                let mut in_ego = [[0.0; 3]; 8];
                for (dst, src) in in_ego.iter_mut().zip(corners.iter()) {
                    *dst = world_to_ego.apply(src);
                }
                Cuboid::from_corners(&self.track_id, &self.category_name, timestamp, in_ego)
            }
        };

        let cuboid = cuboid.with_extra("attributes", self.attributes.join("|"));
        match &self.token {
            Some(token) => cuboid.with_extra("token", token),
            None => cuboid,
        }
    }
}

/// One synchronized capture of all sensors of a segment.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SampleRecord {
    /// Dataset token of the sample.
    pub token: String,
    /// Reference timestamp; frame uris are keyed by it.
    pub timestamp: i64,
    /// Per-sensor capture timestamps when they differ from `timestamp`.
    #[serde(default)]
    pub sensor_timestamps: BTreeMap<String, i64>,
}

impl SampleRecord {
    /// A sample whose sensors all share its timestamp.
    pub fn new(token: impl Into<String>, timestamp: i64) -> Self {
        Self {
            token: token.into(),
            timestamp,
            sensor_timestamps: BTreeMap::new(),
        }
    }

    /// Record the capture timestamp of one sensor.
    pub fn with_sensor_timestamp(mut self, sensor: impl Into<String>, timestamp: i64) -> Self {
        self.sensor_timestamps.insert(sensor.into(), timestamp);
        self
    }

    /// Capture timestamp of `sensor`, falling back to the sample timestamp.
    pub fn sensor_timestamp(&self, sensor: &str) -> i64 {
        self.sensor_timestamps
            .get(sensor)
            .copied()
            .unwrap_or(self.timestamp)
    }
}

/// A recording segment (scene or log) and the split it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SegmentInfo {
    /// Segment identifier.
    pub id: String,
    /// Split name, e.g. `train`.
    pub split: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pose_from_quaternion_json() -> Result<(), Box<dyn std::error::Error>> {
        // 90 degrees about z
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let json = format!(
            r#"{{"timestamp": 3, "rotation": [{half}, 0.0, 0.0, {half}], "translation": [1.0, 2.0, 0.0]}}"#
        );
        let pose: PoseRecord = serde_json::from_str(&json)?;
        let p = pose.world_from_ego.apply(&[1.0, 0.0, 0.0]);
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 3.0, epsilon = 1e-12);

        let back: PoseRecord = serde_json::from_str(&serde_json::to_string(&pose)?)?;
        assert!(back.world_from_ego.abs_diff_eq(&pose.world_from_ego, 1e-12));
        Ok(())
    }

    #[test]
    fn test_rejects_skewed_rotation() {
        let json = r#"{"timestamp": 0, "rotation": [[1.0, 0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], "translation": [0.0, 0.0, 0.0]}"#;
        assert!(serde_json::from_str::<PoseRecord>(json).is_err());

        let json = r#"{"sensor": "CAM", "rotation": [2.0, 0.0, 0.0, 0.0], "translation": [0.0, 0.0, 0.0]}"#;
        // quaternions are normalized, so this one is fine
        assert!(serde_json::from_str::<CalibrationRecord>(json).is_ok());
    }

    #[test]
    fn test_calibration_camera_json() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"{
            "sensor": "CAM_FRONT",
            "rotation": [1.0, 0.0, 0.0, 0.0],
            "translation": [1.5, 0.0, 1.6],
            "camera_intrinsic": [[1266.4, 0.0, 816.3], [0.0, 1266.4, 491.5], [0.0, 0.0, 1.0]],
            "width": 1600,
            "height": 900
        }"#;
        let record: CalibrationRecord = serde_json::from_str(json)?;
        assert!(record.is_camera());
        assert_eq!(
            record.image_size,
            Some(ImageSize {
                width: 1600,
                height: 900
            })
        );
        let origin = record.sensor_from_ego().apply(&[1.5, 0.0, 1.6]);
        assert_eq!(origin, [0.0; 3]);

        let lidar: CalibrationRecord = serde_json::from_str(
            r#"{"sensor": "LIDAR_TOP", "rotation": [1.0, 0.0, 0.0, 0.0], "translation": [0.0, 0.0, 1.8]}"#,
        )?;
        assert!(!lidar.is_camera());
        Ok(())
    }

    #[test]
    fn test_annotation_to_cuboid() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"{
            "track_id": "inst-1",
            "category_name": "vehicle.car",
            "geometry": {
                "type": "pose",
                "rotation": [1.0, 0.0, 0.0, 0.0],
                "translation": [110.0, 50.0, 1.0],
                "size": {"width": 2.0, "length": 4.0, "height": 1.5}
            },
            "attributes": ["vehicle.moving", "cycle.with_rider"],
            "token": "ann-7"
        }"#;
        let record: AnnotationRecord = serde_json::from_str(json)?;

        // ego sits at (100, 50, 0) in the world
        let pose = PoseRecord::new(0, &Rotation::Quaternion([1.0, 0.0, 0.0, 0.0]), [100.0, 50.0, 0.0])?;
        let cuboid = record.to_cuboid(&pose.world_to_ego(), 9);
        let center = cuboid.center();
        assert_relative_eq!(center[0], 10.0, epsilon = 1e-9);
        assert_relative_eq!(center[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(center[2], 1.0, epsilon = 1e-9);
        assert_eq!(cuboid.timestamp(), 9);
        assert_eq!(
            cuboid.extra().get("attributes").map(String::as_str),
            Some("vehicle.moving|cycle.with_rider")
        );
        assert_eq!(cuboid.extra().get("token").map(String::as_str), Some("ann-7"));

        let corners = AnnotationRecord {
            geometry: AnnotationGeometry::Corners(*cuboid.corners()),
            token: None,
            ..record
        };
        // corners given in the ego frame already
        let same = corners.to_cuboid(&Transform::identity(), 9);
        assert_relative_eq!(same.center()[0], 10.0, epsilon = 1e-9);
        assert!(same.extra().get("token").is_none());
        Ok(())
    }

    #[test]
    fn test_sample_sensor_timestamp() {
        let sample = SampleRecord::new("s0", 100).with_sensor_timestamp("CAM_FRONT", 112);
        assert_eq!(sample.sensor_timestamp("CAM_FRONT"), 112);
        assert_eq!(sample.sensor_timestamp("LIDAR_TOP"), 100);
    }
}

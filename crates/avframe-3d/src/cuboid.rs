use std::collections::BTreeMap;

use crate::{ops, transforms::Transform};

/// Physical extent of a cuboid in meters.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    serde::Serialize,
    serde::Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct CuboidSize {
    /// Extent along the object's y (left) axis.
    pub width: f64,
    /// Extent along the object's x (forward) axis.
    pub length: f64,
    /// Extent along the object's z (up) axis.
    pub height: f64,
}

impl CuboidSize {
    /// The eight corners in the object frame, centered at the origin.
    ///
    /// Corners 0..4 form the front face (`+x`), 4..8 the rear face, each face
    /// ordered top-left, top-right, bottom-right, bottom-left when seen from
    /// the front.
    pub fn local_corners(&self) -> [[f64; 3]; 8] {
        let (l, w, h) = (self.length / 2.0, self.width / 2.0, self.height / 2.0);
        [
            [l, w, h],
            [l, -w, h],
            [l, -w, -h],
            [l, w, -h],
            [-l, w, h],
            [-l, -w, h],
            [-l, -w, -h],
            [-l, w, -h],
        ]
    }
}

/// An oriented 3D box annotating one tracked object at one timestamp.
///
/// Corners are stored in the ego frame. A cuboid is built once per annotated
/// object per frame and not modified afterwards.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct Cuboid {
    track_id: String,
    category_name: String,
    timestamp: i64,
    box3d: [[f64; 3]; 8],
    size: CuboidSize,
    obj_from_ego: Transform,
    distance_meters: f64,
    motion_corrected: bool,
    extra: BTreeMap<String, String>,
}

impl Cuboid {
    /// Build a cuboid from the object's pose in the ego frame.
    ///
    /// `ego_from_obj` maps object-local coordinates into the ego frame, i.e.
    /// its translation is the cuboid center.
    ///
    /// Example:
    ///
    /// ```
    /// use avframe_3d::{Cuboid, CuboidSize, Transform};
    ///
    /// let size = CuboidSize { width: 2.0, length: 4.0, height: 1.5 };
    /// let pose = Transform::from_translation([10.0, 0.0, 0.0]);
    /// let cuboid = Cuboid::from_pose("track-1", "car", 0, &pose, size);
    /// assert_eq!(cuboid.center(), [10.0, 0.0, 0.0]);
    /// assert!((cuboid.distance_meters() - (8.0f64 * 8.0 + 1.0 + 0.5625).sqrt()).abs() < 1e-9);
    /// ```
    pub fn from_pose(
        track_id: impl Into<String>,
        category_name: impl Into<String>,
        timestamp: i64,
        ego_from_obj: &Transform,
        size: CuboidSize,
    ) -> Self {
        let local = size.local_corners();
        let mut box3d = [[0.0; 3]; 8];
        for (dst, src) in box3d.iter_mut().zip(local.iter()) {
            *dst = ego_from_obj.apply(src);
        }

        Self {
            track_id: track_id.into(),
            category_name: category_name.into(),
            timestamp,
            distance_meters: ops::min_distance_to(&box3d, &[0.0; 3]),
            box3d,
            size,
            obj_from_ego: ego_from_obj.inverse(),
            motion_corrected: false,
            extra: BTreeMap::new(),
        }
    }

    /// Build a cuboid from eight corners already expressed in the ego frame.
    ///
    /// Sources that only ship corners carry no orientation, so the pose is
    /// the corner centroid with an identity rotation and the size is the
    /// axis-aligned extent of the corners.
    pub fn from_corners(
        track_id: impl Into<String>,
        category_name: impl Into<String>,
        timestamp: i64,
        box3d: [[f64; 3]; 8],
    ) -> Self {
        let center = ops::centroid(&box3d).unwrap_or([0.0; 3]);
        let (min, max) = ops::bounds(&box3d).unwrap_or(([0.0; 3], [0.0; 3]));
        let size = CuboidSize {
            length: max[0] - min[0],
            width: max[1] - min[1],
            height: max[2] - min[2],
        };

        Self {
            track_id: track_id.into(),
            category_name: category_name.into(),
            timestamp,
            distance_meters: ops::min_distance_to(&box3d, &[0.0; 3]),
            box3d,
            size,
            obj_from_ego: Transform::from_translation(center).inverse(),
            motion_corrected: false,
            extra: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry, e.g. the source annotation token.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Mark whether the corners were motion compensated.
    pub fn with_motion_corrected(mut self, motion_corrected: bool) -> Self {
        self.motion_corrected = motion_corrected;
        self
    }

    /// Stable identifier of the tracked object.
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Category label, e.g. `vehicle.car`.
    pub fn category_name(&self) -> &str {
        &self.category_name
    }

    /// Annotation timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The eight corners in the ego frame.
    pub fn corners(&self) -> &[[f64; 3]; 8] {
        &self.box3d
    }

    /// Physical extent in meters.
    pub fn size(&self) -> &CuboidSize {
        &self.size
    }

    /// Maps ego-frame points into the object frame.
    pub fn obj_from_ego(&self) -> &Transform {
        &self.obj_from_ego
    }

    /// The cuboid center in the ego frame.
    pub fn center(&self) -> [f64; 3] {
        ops::centroid(&self.box3d).unwrap_or([0.0; 3])
    }

    /// Distance from the ego origin to the closest corner.
    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    /// Whether the corners were motion compensated.
    pub fn motion_corrected(&self) -> bool {
        self.motion_corrected
    }

    /// Free-form metadata.
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }
}

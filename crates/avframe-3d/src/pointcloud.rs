use crate::{ops, transforms::Transform};

/// The coordinate frame a set of points is expressed in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub enum CoordFrame {
    /// Fixed global frame of a recording segment.
    World,
    /// Vehicle-centered frame.
    Ego,
    /// The frame of the sensor that captured the points.
    Sensor,
    /// Camera pixel space; rows are `[u, v, depth]`.
    Image,
}

/// Errors raised by point cloud frame conversions.
#[derive(Debug, thiserror::Error)]
pub enum PointCloudError {
    /// The cloud is not in a frame the requested conversion starts from.
    #[error("Point cloud {sensor} is in the {actual:?} frame, expected {expected:?}")]
    UnexpectedFrame {
        /// Sensor name of the cloud.
        sensor: String,
        /// Frame required by the conversion.
        expected: CoordFrame,
        /// Frame the cloud is actually in.
        actual: CoordFrame,
    },
}

/// Points captured by one sensor at one timestamp.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct PointCloud {
    // The name of the capturing sensor, e.g. `LIDAR_TOP`.
    sensor_name: String,
    // Capture timestamp in the dataset's native unit.
    timestamp: i64,
    // Nx3 points in `frame`.
    points: Vec<[f64; 3]>,
    // The frame `points` are expressed in.
    frame: CoordFrame,
    // Calibration of the sensor relative to the ego frame.
    sensor_from_ego: Transform,
    // Whether ego motion during the sweep was compensated.
    motion_corrected: bool,
}

impl PointCloud {
    /// Create a new point cloud.
    pub fn new(
        sensor_name: impl Into<String>,
        timestamp: i64,
        points: Vec<[f64; 3]>,
        frame: CoordFrame,
        sensor_from_ego: Transform,
    ) -> Self {
        Self {
            sensor_name: sensor_name.into(),
            timestamp,
            points,
            frame,
            sensor_from_ego,
            motion_corrected: false,
        }
    }

    /// Mark whether ego motion during the sweep has been compensated.
    pub fn with_motion_corrected(mut self, motion_corrected: bool) -> Self {
        self.motion_corrected = motion_corrected;
        self
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// The name of the capturing sensor.
    pub fn sensor_name(&self) -> &str {
        &self.sensor_name
    }

    /// The capture timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The frame the points are expressed in.
    pub fn frame(&self) -> CoordFrame {
        self.frame
    }

    /// The sensor calibration relative to the ego frame.
    pub fn sensor_from_ego(&self) -> &Transform {
        &self.sensor_from_ego
    }

    /// Whether ego motion during the sweep was compensated.
    pub fn motion_corrected(&self) -> bool {
        self.motion_corrected
    }

    /// Re-express a sensor-frame cloud in the ego frame.
    ///
    /// A cloud already in the ego frame is returned unchanged.
    pub fn to_ego(&self) -> Result<PointCloud, PointCloudError> {
        match self.frame {
            CoordFrame::Ego => Ok(self.clone()),
            CoordFrame::Sensor => Ok(self.transformed(&self.sensor_from_ego.inverse(), CoordFrame::Ego)),
            actual => Err(PointCloudError::UnexpectedFrame {
                sensor: self.sensor_name.clone(),
                expected: CoordFrame::Sensor,
                actual,
            }),
        }
    }

    /// Apply `transform` to every point and tag the result with `frame`.
    pub fn transformed(&self, transform: &Transform, frame: CoordFrame) -> PointCloud {
        Self {
            points: transform.apply_many(&self.points),
            frame,
            ..self.clone()
        }
    }

    /// Replace the points with a derived set, e.g. a projection into a camera.
    pub fn with_points(
        &self,
        sensor_name: impl Into<String>,
        points: Vec<[f64; 3]>,
        frame: CoordFrame,
    ) -> PointCloud {
        Self {
            sensor_name: sensor_name.into(),
            points,
            frame,
            ..self.clone()
        }
    }

    /// Get the minimum bound of the point cloud.
    pub fn min_bound(&self) -> Option<[f64; 3]> {
        ops::bounds(&self.points).map(|(min, _)| min)
    }

    /// Get the maximum bound of the point cloud.
    pub fn max_bound(&self) -> Option<[f64; 3]> {
        ops::bounds(&self.points).map(|(_, max)| max)
    }
}

use std::collections::BTreeMap;

use avframe_3d::io::LidarError;

use crate::records::{
    AnnotationRecord, CalibrationRecord, PoseRecord, SampleRecord, SegmentInfo,
};

/// Errors raised by source adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Reading a file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON document is malformed or fails validation.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A lidar sweep could not be read.
    #[error(transparent)]
    Lidar(#[from] LidarError),

    /// The adapter has no segment with this id.
    #[error("Unknown segment {0}")]
    UnknownSegment(String),

    /// A referenced sensor blob does not exist.
    #[error("No {sensor} data for segment {segment_id} at timestamp {timestamp}")]
    MissingBlob {
        /// Segment identifier.
        segment_id: String,
        /// Sensor name.
        sensor: String,
        /// Requested timestamp.
        timestamp: i64,
    },
}

/// The records a dataset family provides to the frame assembler.
///
/// One implementation exists per dataset family. Absent records are
/// reported as `Ok(None)` (or an empty list for annotations) so the caller
/// decides which ones are fatal; `Err` is reserved for failures reading the
/// source itself.
pub trait SourceAdapter: Send + Sync {
    /// Name of the dataset, used as the uri `dataset` field.
    fn dataset(&self) -> &str;

    /// All segments with their split.
    fn segments(&self) -> Result<Vec<SegmentInfo>, AdapterError>;

    /// All samples of a segment.
    fn samples(&self, segment_id: &str) -> Result<Vec<SampleRecord>, AdapterError>;

    /// Names of the calibrated cameras of a segment, sorted.
    fn camera_names(&self, segment_id: &str) -> Result<Vec<String>, AdapterError>;

    /// The ego pose at `timestamp`.
    fn pose_record(
        &self,
        segment_id: &str,
        timestamp: i64,
    ) -> Result<Option<PoseRecord>, AdapterError>;

    /// The calibration of `sensor`.
    fn calibration_record(
        &self,
        segment_id: &str,
        sensor: &str,
    ) -> Result<Option<CalibrationRecord>, AdapterError>;

    /// The annotated objects of the sample at `timestamp`, in the world frame.
    fn annotations(
        &self,
        segment_id: &str,
        timestamp: i64,
    ) -> Result<Vec<AnnotationRecord>, AdapterError>;

    /// The encoded image captured by `camera` at `timestamp`.
    fn image_bytes(
        &self,
        segment_id: &str,
        camera: &str,
        timestamp: i64,
    ) -> Result<Vec<u8>, AdapterError>;

    /// The points captured by `sensor` at `timestamp`, in the sensor frame.
    fn point_cloud(
        &self,
        segment_id: &str,
        sensor: &str,
        timestamp: i64,
    ) -> Result<Option<Vec<[f64; 3]>>, AdapterError>;
}

#[derive(Debug, Clone, Default)]
struct SegmentData {
    split: String,
    samples: Vec<SampleRecord>,
    poses: BTreeMap<i64, PoseRecord>,
    calibrations: BTreeMap<String, CalibrationRecord>,
    annotations: BTreeMap<i64, Vec<AnnotationRecord>>,
    images: BTreeMap<(String, i64), Vec<u8>>,
    clouds: BTreeMap<(String, i64), Vec<[f64; 3]>>,
}

/// An adapter serving records held in memory, for synthetic data and tests.
///
/// # Examples
///
/// ```
/// use avframe_frame::adapter::{InMemoryAdapter, SourceAdapter};
/// use avframe_frame::records::SampleRecord;
///
/// let adapter = InMemoryAdapter::new("synthetic")
///     .with_segment("scene-0", "train")
///     .with_sample("scene-0", SampleRecord::new("s0", 100));
///
/// assert_eq!(adapter.samples("scene-0").unwrap().len(), 1);
/// assert!(adapter.pose_record("scene-0", 100).unwrap().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryAdapter {
    dataset: String,
    segments: BTreeMap<String, SegmentData>,
}

impl InMemoryAdapter {
    /// Create an empty adapter for `dataset`.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            segments: BTreeMap::new(),
        }
    }

    fn segment_mut(&mut self, segment_id: impl Into<String>) -> &mut SegmentData {
        self.segments.entry(segment_id.into()).or_default()
    }

    fn segment(&self, segment_id: &str) -> Result<&SegmentData, AdapterError> {
        self.segments
            .get(segment_id)
            .ok_or_else(|| AdapterError::UnknownSegment(segment_id.to_string()))
    }

    /// Declare a segment and its split.
    pub fn with_segment(mut self, segment_id: impl Into<String>, split: impl Into<String>) -> Self {
        self.segment_mut(segment_id).split = split.into();
        self
    }

    /// Add a sample to a segment.
    pub fn with_sample(mut self, segment_id: impl Into<String>, sample: SampleRecord) -> Self {
        self.segment_mut(segment_id).samples.push(sample);
        self
    }

    /// Add an ego pose, keyed by its timestamp.
    pub fn with_pose(mut self, segment_id: impl Into<String>, pose: PoseRecord) -> Self {
        self.segment_mut(segment_id).poses.insert(pose.timestamp, pose);
        self
    }

    /// Add a sensor calibration, keyed by sensor name.
    pub fn with_calibration(
        mut self,
        segment_id: impl Into<String>,
        calibration: CalibrationRecord,
    ) -> Self {
        self.segment_mut(segment_id)
            .calibrations
            .insert(calibration.sensor.clone(), calibration);
        self
    }

    /// Add an annotated object to the sample at `timestamp`.
    pub fn with_annotation(
        mut self,
        segment_id: impl Into<String>,
        timestamp: i64,
        annotation: AnnotationRecord,
    ) -> Self {
        self.segment_mut(segment_id)
            .annotations
            .entry(timestamp)
            .or_default()
            .push(annotation);
        self
    }

    /// Add an encoded camera image.
    pub fn with_image(
        mut self,
        segment_id: impl Into<String>,
        camera: impl Into<String>,
        timestamp: i64,
        bytes: Vec<u8>,
    ) -> Self {
        self.segment_mut(segment_id)
            .images
            .insert((camera.into(), timestamp), bytes);
        self
    }

    /// Add a sensor-frame point cloud.
    pub fn with_point_cloud(
        mut self,
        segment_id: impl Into<String>,
        sensor: impl Into<String>,
        timestamp: i64,
        points: Vec<[f64; 3]>,
    ) -> Self {
        self.segment_mut(segment_id)
            .clouds
            .insert((sensor.into(), timestamp), points);
        self
    }
}

impl SourceAdapter for InMemoryAdapter {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn segments(&self) -> Result<Vec<SegmentInfo>, AdapterError> {
        Ok(self
            .segments
            .iter()
            .map(|(id, data)| SegmentInfo {
                id: id.clone(),
                split: data.split.clone(),
            })
            .collect())
    }

    fn samples(&self, segment_id: &str) -> Result<Vec<SampleRecord>, AdapterError> {
        Ok(self.segment(segment_id)?.samples.clone())
    }

    fn camera_names(&self, segment_id: &str) -> Result<Vec<String>, AdapterError> {
        Ok(self
            .segment(segment_id)?
            .calibrations
            .values()
            .filter(|c| c.is_camera())
            .map(|c| c.sensor.clone())
            .collect())
    }

    fn pose_record(
        &self,
        segment_id: &str,
        timestamp: i64,
    ) -> Result<Option<PoseRecord>, AdapterError> {
        Ok(self.segment(segment_id)?.poses.get(&timestamp).cloned())
    }

    fn calibration_record(
        &self,
        segment_id: &str,
        sensor: &str,
    ) -> Result<Option<CalibrationRecord>, AdapterError> {
        Ok(self.segment(segment_id)?.calibrations.get(sensor).cloned())
    }

    fn annotations(
        &self,
        segment_id: &str,
        timestamp: i64,
    ) -> Result<Vec<AnnotationRecord>, AdapterError> {
        Ok(self
            .segment(segment_id)?
            .annotations
            .get(&timestamp)
            .cloned()
            .unwrap_or_default())
    }

    fn image_bytes(
        &self,
        segment_id: &str,
        camera: &str,
        timestamp: i64,
    ) -> Result<Vec<u8>, AdapterError> {
        self.segment(segment_id)?
            .images
            .get(&(camera.to_string(), timestamp))
            .cloned()
            .ok_or_else(|| AdapterError::MissingBlob {
                segment_id: segment_id.to_string(),
                sensor: camera.to_string(),
                timestamp,
            })
    }

    fn point_cloud(
        &self,
        segment_id: &str,
        sensor: &str,
        timestamp: i64,
    ) -> Result<Option<Vec<[f64; 3]>>, AdapterError> {
        Ok(self
            .segment(segment_id)?
            .clouds
            .get(&(sensor.to_string(), timestamp))
            .cloned())
    }
}

use avframe_3d::{PointCloudError, TransformError};

use crate::{adapter::AdapterError, camera::CameraError, uri::UriError};

/// Errors raised while assembling, encoding or writing a frame.
///
/// Degenerate projections (objects behind the camera or off screen) are not
/// errors; they show up as invisible boxes and dropped points.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The segment has no sample at the requested timestamp.
    #[error("No sample in segment {segment_id} at timestamp {timestamp}")]
    MissingSample {
        /// Segment identifier.
        segment_id: String,
        /// Requested timestamp.
        timestamp: i64,
    },

    /// A pose or calibration record required by the frame is absent.
    #[error("Missing {what} for {sensor} in segment {segment_id}")]
    MissingCalibration {
        /// Segment identifier.
        segment_id: String,
        /// Sensor the record belongs to.
        sensor: String,
        /// The kind of record, e.g. `ego pose at 1532402927647951`.
        what: String,
    },

    /// The uri names a dataset the adapter does not serve.
    #[error("Uri dataset {requested} does not match adapter dataset {served}")]
    DatasetMismatch {
        /// Dataset in the uri.
        requested: String,
        /// Dataset of the adapter.
        served: String,
    },

    /// A record holds an invalid rigid transform.
    #[error(transparent)]
    InvalidTransform(#[from] TransformError),

    /// A camera calibration is unusable, e.g. singular intrinsics.
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// A point cloud is in the wrong frame for the requested conversion.
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),

    /// The source adapter failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// A uri could not be parsed or built.
    #[error(transparent)]
    Uri(#[from] UriError),

    /// Encoding a frame failed.
    #[error(transparent)]
    Encode(#[from] bincode::error::EncodeError),

    /// Decoding a frame failed.
    #[error(transparent)]
    Decode(#[from] bincode::error::DecodeError),

    /// Writing a frame failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A pipeline configuration file is not valid json.
    #[error(transparent)]
    Config(#[from] serde_json::Error),

    /// The worker pool could not be created.
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

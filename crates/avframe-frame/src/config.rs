use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{AdapterError, SourceAdapter};
use crate::error::FrameError;
use crate::manifest::ManifestAdapter;

/// Splits enumerated when none are requested.
pub const DEFAULT_SPLITS: [&str; 2] = ["train", "val"];

/// What the frame assembler attaches to each camera image.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Project the point clouds of `point_cloud_sensors` into the camera.
    pub project_clouds_to_cam: bool,
    /// Project the annotated cuboids into the camera.
    pub project_cuboids_to_cam: bool,
    /// Drop boxes of cuboids that are not visible instead of keeping them
    /// marked invisible.
    pub ignore_invisible_cuboids: bool,
    /// Point cloud sensors, in order of preference; the first one with a
    /// sweep at the sample is projected.
    pub point_cloud_sensors: Vec<String>,
    /// The primary high-rate sensor whose timestamp defines the ego pose.
    pub pose_sensor: String,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            project_clouds_to_cam: true,
            project_cuboids_to_cam: true,
            ignore_invisible_cuboids: true,
            point_cloud_sensors: vec!["LIDAR_TOP".to_string()],
            pose_sensor: "LIDAR_TOP".to_string(),
        }
    }
}

/// How a batch of uris is split up and run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Uris assembled between two cancellation checkpoints and progress
    /// reports.
    pub uris_per_chunk: usize,
    /// Worker threads; `None` uses one per core.
    pub num_threads: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            uris_per_chunk: 1000,
            num_threads: None,
        }
    }
}

/// Selects the source adapter implementation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterConfig {
    /// A directory with a `manifest.json`.
    Manifest {
        /// The dataset directory.
        root: PathBuf,
    },
}

impl AdapterConfig {
    /// Open the configured adapter.
    pub fn open(&self) -> Result<Arc<dyn SourceAdapter>, AdapterError> {
        match self {
            AdapterConfig::Manifest { root } => Ok(Arc::new(ManifestAdapter::open(root)?)),
        }
    }
}

/// A complete batch run description, as read from a json file.
///
/// ```json
/// {
///   "adapter": { "kind": "manifest", "root": "/data/nuscenes-mini" },
///   "assembler": { "project_clouds_to_cam": false },
///   "batch": { "uris_per_chunk": 200 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Where the records come from.
    pub adapter: AdapterConfig,
    /// What goes into each frame.
    #[serde(default)]
    pub assembler: AssemblerConfig,
    /// How the uris are scheduled.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl PipelineConfig {
    /// Read a configuration from a json file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() -> Result<(), serde_json::Error> {
        let config: AssemblerConfig = serde_json::from_str("{}")?;
        assert_eq!(config, AssemblerConfig::default());
        assert_eq!(config.pose_sensor, "LIDAR_TOP");

        let batch: BatchConfig = serde_json::from_str(r#"{"num_threads": 2}"#)?;
        assert_eq!(batch.uris_per_chunk, 1000);
        assert_eq!(batch.num_threads, Some(2));
        Ok(())
    }

    #[test]
    fn test_adapter_config() -> Result<(), serde_json::Error> {
        let config: AdapterConfig =
            serde_json::from_str(r#"{"kind": "manifest", "root": "/data/nuscenes-mini"}"#)?;
        assert_eq!(
            config,
            AdapterConfig::Manifest {
                root: PathBuf::from("/data/nuscenes-mini")
            }
        );
        assert!(serde_json::from_str::<AdapterConfig>(r#"{"kind": "bigquery"}"#).is_err());
        assert!(config.open().is_err());
        Ok(())
    }

    #[test]
    fn test_pipeline_config_from_path() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{
                "adapter": {"kind": "manifest", "root": "data"},
                "assembler": {"project_clouds_to_cam": false, "point_cloud_sensors": ["LIDAR_TOP", "RADAR_FRONT"]},
                "batch": {"uris_per_chunk": 10}
            }"#,
        )?;
        let config = PipelineConfig::from_path(&path)?;
        assert!(!config.assembler.project_clouds_to_cam);
        assert!(config.assembler.project_cuboids_to_cam);
        assert_eq!(config.assembler.point_cloud_sensors.len(), 2);
        assert_eq!(config.batch.uris_per_chunk, 10);
        assert_eq!(config.batch.num_threads, None);

        std::fs::write(&path, r#"{"assembler": {}}"#)?;
        assert!(matches!(
            PipelineConfig::from_path(&path),
            Err(FrameError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_path(dir.path().join("missing.json")),
            Err(FrameError::Io(_))
        ));
        Ok(())
    }
}

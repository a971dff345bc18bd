use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use avframe_3d::io;

use crate::adapter::{AdapterError, SourceAdapter};
use crate::records::{
    AnnotationRecord, CalibrationRecord, PoseRecord, SampleRecord, SegmentInfo,
};

/// File name of the manifest inside a dataset directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// On-disk encoding of a lidar sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LidarFormat {
    /// Binary PCD with float x/y/z fields.
    #[default]
    Pcd,
    /// Packed little-endian float32 records of `stride` values per point.
    Float32 {
        /// Floats per point.
        stride: usize,
    },
}

/// A sensor blob stored next to the manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlobEntry {
    /// Sensor name.
    pub sensor: String,
    /// Capture timestamp.
    pub timestamp: i64,
    /// Path relative to the dataset root.
    pub path: PathBuf,
    /// Encoding of lidar sweeps; ignored for images.
    #[serde(default)]
    pub format: LidarFormat,
}

/// The annotated objects of one sample.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SampleAnnotations {
    /// Sample timestamp.
    pub timestamp: i64,
    /// Objects in the world frame.
    pub records: Vec<AnnotationRecord>,
}

/// One segment of a manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ManifestSegment {
    /// Segment identifier.
    pub id: String,
    /// Split name.
    pub split: String,
    /// Samples in capture order.
    pub samples: Vec<SampleRecord>,
    /// Ego poses.
    #[serde(default)]
    pub poses: Vec<PoseRecord>,
    /// Sensor calibrations.
    #[serde(default)]
    pub calibrations: Vec<CalibrationRecord>,
    /// Annotations per sample.
    #[serde(default)]
    pub annotations: Vec<SampleAnnotations>,
    /// Camera images.
    #[serde(default)]
    pub images: Vec<BlobEntry>,
    /// Lidar sweeps.
    #[serde(default)]
    pub point_clouds: Vec<BlobEntry>,
}

/// The `manifest.json` document describing a dataset directory.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    /// Dataset name.
    pub dataset: String,
    /// Segments of the dataset.
    pub segments: Vec<ManifestSegment>,
}

#[derive(Debug)]
struct SegmentTables {
    info: SegmentInfo,
    samples: Vec<SampleRecord>,
    poses: BTreeMap<i64, PoseRecord>,
    calibrations: BTreeMap<String, CalibrationRecord>,
    annotations: BTreeMap<i64, Vec<AnnotationRecord>>,
    images: BTreeMap<(String, i64), BlobEntry>,
    point_clouds: BTreeMap<(String, i64), BlobEntry>,
}

impl From<ManifestSegment> for SegmentTables {
    fn from(segment: ManifestSegment) -> Self {
        let blobs = |entries: Vec<BlobEntry>| -> BTreeMap<(String, i64), BlobEntry> {
            entries
                .into_iter()
                .map(|b| ((b.sensor.clone(), b.timestamp), b))
                .collect()
        };

        let mut annotations: BTreeMap<i64, Vec<AnnotationRecord>> = BTreeMap::new();
        for entry in segment.annotations {
            annotations
                .entry(entry.timestamp)
                .or_default()
                .extend(entry.records);
        }

        Self {
            info: SegmentInfo {
                id: segment.id,
                split: segment.split,
            },
            samples: segment.samples,
            poses: segment
                .poses
                .into_iter()
                .map(|p| (p.timestamp, p))
                .collect(),
            calibrations: segment
                .calibrations
                .into_iter()
                .map(|c| (c.sensor.clone(), c))
                .collect(),
            annotations,
            images: blobs(segment.images),
            point_clouds: blobs(segment.point_clouds),
        }
    }
}

/// Serves a dataset directory holding a [`Manifest`] and the blob files it
/// references.
///
/// Records are parsed and validated when the adapter is opened; images and
/// lidar sweeps are read from disk on request.
#[derive(Debug)]
pub struct ManifestAdapter {
    root: PathBuf,
    dataset: String,
    segments: BTreeMap<String, SegmentTables>,
}

impl ManifestAdapter {
    /// Open the dataset directory `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let root = root.as_ref().to_path_buf();
        let file = std::fs::File::open(root.join(MANIFEST_FILE_NAME))?;
        let manifest: Manifest = serde_json::from_reader(std::io::BufReader::new(file))?;
        log::info!(
            "Opened {} with {} segments from {}",
            manifest.dataset,
            manifest.segments.len(),
            root.display()
        );
        Ok(Self::from_manifest(root, manifest))
    }

    /// Serve an already parsed manifest whose blob paths are relative to
    /// `root`.
    pub fn from_manifest(root: impl Into<PathBuf>, manifest: Manifest) -> Self {
        Self {
            root: root.into(),
            dataset: manifest.dataset,
            segments: manifest
                .segments
                .into_iter()
                .map(|s| (s.id.clone(), SegmentTables::from(s)))
                .collect(),
        }
    }

    /// The dataset directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn segment(&self, segment_id: &str) -> Result<&SegmentTables, AdapterError> {
        self.segments
            .get(segment_id)
            .ok_or_else(|| AdapterError::UnknownSegment(segment_id.to_string()))
    }
}

impl SourceAdapter for ManifestAdapter {
    fn dataset(&self) -> &str {
        &self.dataset
    }

    fn segments(&self) -> Result<Vec<SegmentInfo>, AdapterError> {
        Ok(self.segments.values().map(|s| s.info.clone()).collect())
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
        let entry = self
            .segment(segment_id)?
            .images
            .get(&(camera.to_string(), timestamp))
            .ok_or_else(|| AdapterError::MissingBlob {
                segment_id: segment_id.to_string(),
                sensor: camera.to_string(),
                timestamp,
            })?;
        Ok(std::fs::read(self.root.join(&entry.path))?)
    }

    fn point_cloud(
        &self,
        segment_id: &str,
        sensor: &str,
        timestamp: i64,
    ) -> Result<Option<Vec<[f64; 3]>>, AdapterError> {
        let Some(entry) = self
            .segment(segment_id)?
            .point_clouds
            .get(&(sensor.to_string(), timestamp))
        else {
            return Ok(None);
        };

        let path = self.root.join(&entry.path);
        let points = match entry.format {
            LidarFormat::Pcd => io::read_pcd_binary(&path)?,
            LidarFormat::Float32 { stride } => io::read_float_records(&path, stride)?,
        };
        log::debug!("Read {} points from {}", points.len(), path.display());
        Ok(Some(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "dataset": "mini",
        "segments": [{
            "id": "scene-0001",
            "split": "val",
            "samples": [{"token": "s0", "timestamp": 10, "sensor_timestamps": {"CAM_FRONT": 12}}],
            "poses": [{"timestamp": 10, "rotation": [1.0, 0.0, 0.0, 0.0], "translation": [5.0, 0.0, 0.0]}],
            "calibrations": [
                {"sensor": "LIDAR_TOP", "rotation": [1.0, 0.0, 0.0, 0.0], "translation": [0.0, 0.0, 1.8]},
                {"sensor": "CAM_FRONT", "rotation": [1.0, 0.0, 0.0, 0.0], "translation": [1.0, 0.0, 1.5],
                 "camera_intrinsic": [[100.0, 0.0, 50.0], [0.0, 100.0, 50.0], [0.0, 0.0, 1.0]],
                 "width": 100, "height": 100}
            ],
            "annotations": [{"timestamp": 10, "records": [{
                "track_id": "t0", "category_name": "car",
                "geometry": {"type": "corners", "corners": [
                    [1.0, 1.0, 1.0], [1.0, -1.0, 1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0],
                    [-1.0, 1.0, 1.0], [-1.0, -1.0, 1.0], [-1.0, -1.0, -1.0], [-1.0, 1.0, -1.0]
                ]}
            }]}],
            "images": [{"sensor": "CAM_FRONT", "timestamp": 12, "path": "samples/front.jpg"}],
            "point_clouds": [{"sensor": "LIDAR_TOP", "timestamp": 10, "path": "sweeps/top.bin",
                              "format": {"float32": {"stride": 5}}}]
        }]
    }"#;

    fn write_dataset(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(root.join("samples"))?;
        std::fs::create_dir_all(root.join("sweeps"))?;
        std::fs::write(root.join(MANIFEST_FILE_NAME), MANIFEST)?;
        std::fs::write(root.join("samples/front.jpg"), [0xff, 0xd8, 0xff])?;
        let sweep: Vec<u8> = [1.0f32, 2.0, 3.0, 0.5, 7.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        std::fs::write(root.join("sweeps/top.bin"), sweep)?;
        Ok(())
    }

    #[test]
    fn test_manifest_adapter() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        write_dataset(dir.path())?;

        let adapter = ManifestAdapter::open(dir.path())?;
        assert_eq!(adapter.dataset(), "mini");
        assert_eq!(
            adapter.segments()?,
            vec![SegmentInfo {
                id: "scene-0001".into(),
                split: "val".into()
            }]
        );
        assert_eq!(adapter.camera_names("scene-0001")?, vec!["CAM_FRONT"]);
        assert_eq!(adapter.samples("scene-0001")?[0].sensor_timestamp("CAM_FRONT"), 12);
        assert!(adapter.pose_record("scene-0001", 10)?.is_some());
        assert!(adapter.pose_record("scene-0001", 11)?.is_none());
        assert_eq!(adapter.annotations("scene-0001", 10)?.len(), 1);
        assert_eq!(adapter.image_bytes("scene-0001", "CAM_FRONT", 12)?, vec![0xff, 0xd8, 0xff]);
        assert_eq!(
            adapter.point_cloud("scene-0001", "LIDAR_TOP", 10)?,
            Some(vec![[1.0, 2.0, 3.0]])
        );
        assert_eq!(adapter.point_cloud("scene-0001", "RADAR_FRONT", 10)?, None);
        Ok(())
    }

    #[test]
    fn test_invalid_calibration_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let skewed = MANIFEST.replace(
            r#""rotation": [1.0, 0.0, 0.0, 0.0], "translation": [5.0, 0.0, 0.0]"#,
            r#""rotation": [[1.0, 0.2, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], "translation": [5.0, 0.0, 0.0]"#,
        );
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), skewed)?;
        assert!(matches!(
            ManifestAdapter::open(dir.path()),
            Err(AdapterError::Json(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_manifest() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(
            ManifestAdapter::open(dir.path()),
            Err(AdapterError::Io(_))
        ));
        Ok(())
    }
}

use std::sync::Arc;

use avframe_3d::{CoordFrame, PointCloud, Transform};
use avframe_image::BBox;

use crate::adapter::SourceAdapter;
use crate::camera::CameraImage;
use crate::config::{AssemblerConfig, DEFAULT_SPLITS};
use crate::error::FrameError;
use crate::frame::Frame;
use crate::index::SegmentResolver;
use crate::records::SampleRecord;
use crate::uri::FrameUri;

/// Assembles frames from the records of one source adapter.
///
/// Assembly is a pure function of the uri and the adapter's records, so one
/// assembler can be shared by many worker threads. The only state it keeps
/// is the per-segment sample index.
pub struct FrameAssembler {
    adapter: Arc<dyn SourceAdapter>,
    config: AssemblerConfig,
    resolver: SegmentResolver,
}

impl FrameAssembler {
    /// Create an assembler for `adapter`.
    pub fn new(adapter: Arc<dyn SourceAdapter>, config: AssemblerConfig) -> Self {
        Self {
            adapter,
            config,
            resolver: SegmentResolver::new(),
        }
    }

    /// The assembler configuration.
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// The source adapter.
    pub fn adapter(&self) -> &dyn SourceAdapter {
        self.adapter.as_ref()
    }

    /// The per-segment index cache.
    pub fn resolver(&self) -> &SegmentResolver {
        &self.resolver
    }

    /// One uri per sample and camera of every segment in `splits`, sorted.
    ///
    /// An empty `splits` means [`DEFAULT_SPLITS`].
    pub fn camera_uris(&self, splits: &[&str]) -> Result<Vec<FrameUri>, FrameError> {
        let splits: &[&str] = if splits.is_empty() {
            &DEFAULT_SPLITS
        } else {
            splits
        };

        let mut uris = Vec::new();
        for segment in self.adapter.segments()? {
            if !splits.contains(&segment.split.as_str()) {
                continue;
            }
            let index = self.resolver.resolve(self.adapter(), &segment.id)?;
            let cameras = self.adapter.camera_names(&segment.id)?;
            for sample in index.samples() {
                for camera in &cameras {
                    uris.push(FrameUri::new(
                        self.adapter.dataset(),
                        &segment.split,
                        &segment.id,
                        sample.timestamp,
                        camera,
                    )?);
                }
            }
        }
        uris.sort();
        Ok(uris)
    }

    /// Assemble the frame named by `uri`.
    ///
    /// # Errors
    ///
    /// Fails with [`FrameError::MissingSample`] if the segment has no sample
    /// at the uri timestamp, and with [`FrameError::MissingCalibration`] if
    /// the ego pose or a required sensor calibration is absent. Missing
    /// annotations and missing point clouds are not errors.
    pub fn assemble(&self, uri: &FrameUri) -> Result<Frame, FrameError> {
        if uri.dataset() != self.adapter.dataset() {
            return Err(FrameError::DatasetMismatch {
                requested: uri.dataset().to_string(),
                served: self.adapter.dataset().to_string(),
            });
        }

        let segment_id = uri.segment_id();
        let index = self.resolver.resolve(self.adapter(), segment_id)?;
        let sample = index
            .sample_at(uri.timestamp())
            .ok_or_else(|| FrameError::MissingSample {
                segment_id: segment_id.to_string(),
                timestamp: uri.timestamp(),
            })?;

        let world_to_ego = self.world_to_ego(segment_id, sample)?;
        let camera_image = self.camera_image(uri, sample, &world_to_ego)?;

        log::debug!(
            "Assembled {}: {} boxes, {} projected points",
            uri,
            camera_image.bboxes().len(),
            camera_image.cloud().map_or(0, |c| c.len()),
        );

        Ok(Frame {
            uri: uri.clone(),
            world_to_ego,
            camera_images: vec![camera_image],
        })
    }

    // The pose sensor's timestamp defines the ego pose; cameras may fire
    // asynchronously and must not move the ego frame.
    fn world_to_ego(&self, segment_id: &str, sample: &SampleRecord) -> Result<Transform, FrameError> {
        let sensor = &self.config.pose_sensor;
        let timestamp = sample.sensor_timestamp(sensor);
        let pose = self
            .adapter
            .pose_record(segment_id, timestamp)?
            .ok_or_else(|| FrameError::MissingCalibration {
                segment_id: segment_id.to_string(),
                sensor: sensor.clone(),
                what: format!("ego pose at {timestamp}"),
            })?;
        Ok(pose.world_to_ego())
    }

    fn camera_image(
        &self,
        uri: &FrameUri,
        sample: &SampleRecord,
        world_to_ego: &Transform,
    ) -> Result<CameraImage, FrameError> {
        let segment_id = uri.segment_id();
        let camera = uri.camera();
        let missing = |what: &str| FrameError::MissingCalibration {
            segment_id: segment_id.to_string(),
            sensor: camera.to_string(),
            what: what.to_string(),
        };

        let calibration = self
            .adapter
            .calibration_record(segment_id, camera)?
            .ok_or_else(|| missing("calibration"))?;
        let intrinsics = calibration.intrinsics.ok_or_else(|| missing("intrinsics"))?;
        let image_size = calibration.image_size.ok_or_else(|| missing("image size"))?;

        let timestamp = sample.sensor_timestamp(camera);
        let image_bytes = self.adapter.image_bytes(segment_id, camera, timestamp)?;

        let mut camera_image = CameraImage::new(
            camera,
            image_bytes,
            image_size,
            timestamp,
            calibration.sensor_from_ego(),
            intrinsics,
        )?;
        if let Some(viewport) = uri.viewport() {
            camera_image = camera_image.with_viewport(&viewport.to_bbox(image_size));
        }

        if self.config.project_cuboids_to_cam {
            let bboxes = self.project_cuboids(uri, sample, world_to_ego, &camera_image)?;
            camera_image = camera_image.with_bboxes(bboxes);
        }

        if self.config.project_clouds_to_cam {
            if let Some(cloud) = self.point_cloud_in_cam(segment_id, sample, &camera_image)? {
                camera_image = camera_image.with_cloud(cloud);
            }
        }

        Ok(camera_image)
    }

    fn project_cuboids(
        &self,
        uri: &FrameUri,
        sample: &SampleRecord,
        world_to_ego: &Transform,
        camera_image: &CameraImage,
    ) -> Result<Vec<BBox>, FrameError> {
        let annotations = self.adapter.annotations(uri.segment_id(), sample.timestamp)?;

        let mut bboxes = Vec::with_capacity(annotations.len());
        let mut dropped = 0;
        for annotation in annotations
            .iter()
            .filter(|a| uri.track_id().map_or(true, |t| t == a.track_id))
        {
            let cuboid = annotation.to_cuboid(world_to_ego, camera_image.timestamp());
            let bbox = camera_image.project_cuboid_to_bbox(&cuboid);
            if self.config.ignore_invisible_cuboids && !bbox.is_visible() {
                dropped += 1;
                continue;
            }
            bboxes.push(bbox);
        }

        log::debug!(
            "{}: kept {} of {} cuboids",
            uri,
            bboxes.len(),
            bboxes.len() + dropped
        );
        Ok(bboxes)
    }

    fn point_cloud_in_cam(
        &self,
        segment_id: &str,
        sample: &SampleRecord,
        camera_image: &CameraImage,
    ) -> Result<Option<PointCloud>, FrameError> {
        for sensor in &self.config.point_cloud_sensors {
            let timestamp = sample.sensor_timestamp(sensor);
            let Some(points) = self.adapter.point_cloud(segment_id, sensor, timestamp)? else {
                log::debug!("No {sensor} sweep in {segment_id} at {timestamp}");
                continue;
            };

            let calibration = self
                .adapter
                .calibration_record(segment_id, sensor)?
                .ok_or_else(|| FrameError::MissingCalibration {
                    segment_id: segment_id.to_string(),
                    sensor: sensor.clone(),
                    what: "calibration".to_string(),
                })?;

            let cloud = PointCloud::new(
                sensor,
                timestamp,
                points,
                CoordFrame::Sensor,
                calibration.sensor_from_ego(),
            );
            return Ok(Some(camera_image.projected_cloud(&cloud)?));
        }
        Ok(None)
    }
}

use std::collections::BTreeMap;
use std::fmt;

use crate::frame::Frame;

/// Visible and invisible box counts of one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxCounts {
    /// Boxes marked visible.
    pub visible: u64,
    /// Boxes kept but marked invisible.
    pub invisible: u64,
}

/// Counts over a set of assembled frames.
///
/// Maps are ordered so the rendered report is stable and can be diffed
/// between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Number of frames observed.
    pub frames: u64,
    /// Frames per split.
    pub frames_per_split: BTreeMap<String, u64>,
    /// Camera images per camera name.
    pub frames_per_camera: BTreeMap<String, u64>,
    /// Boxes per category.
    pub boxes_per_category: BTreeMap<String, BoxCounts>,
    /// Projected points over all camera images.
    pub projected_points: u64,
}

impl FrameStats {
    /// Add one frame to the counts.
    pub fn observe(&mut self, frame: &Frame) {
        self.frames += 1;
        *self
            .frames_per_split
            .entry(frame.uri.split().to_string())
            .or_default() += 1;

        for camera in &frame.camera_images {
            *self
                .frames_per_camera
                .entry(camera.camera_name().to_string())
                .or_default() += 1;
            for bbox in camera.bboxes() {
                let counts = self
                    .boxes_per_category
                    .entry(bbox.category_name().to_string())
                    .or_default();
                if bbox.is_visible() {
                    counts.visible += 1;
                } else {
                    counts.invisible += 1;
                }
            }
            self.projected_points += camera.cloud().map_or(0, |c| c.len()) as u64;
        }
    }

    /// Add the counts of `other`.
    pub fn merge(&mut self, other: &FrameStats) {
        self.frames += other.frames;
        for (split, n) in &other.frames_per_split {
            *self.frames_per_split.entry(split.clone()).or_default() += n;
        }
        for (camera, n) in &other.frames_per_camera {
            *self.frames_per_camera.entry(camera.clone()).or_default() += n;
        }
        for (category, counts) in &other.boxes_per_category {
            let entry = self.boxes_per_category.entry(category.clone()).or_default();
            entry.visible += counts.visible;
            entry.invisible += counts.invisible;
        }
        self.projected_points += other.projected_points;
    }

    /// Total visible and invisible boxes.
    pub fn total_boxes(&self) -> BoxCounts {
        self.boxes_per_category
            .values()
            .fold(BoxCounts::default(), |acc, c| BoxCounts {
                visible: acc.visible + c.visible,
                invisible: acc.invisible + c.invisible,
            })
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total_boxes();
        writeln!(f, "frames: {}", self.frames)?;
        writeln!(f, "projected points: {}", self.projected_points)?;
        writeln!(f, "boxes: {} visible, {} invisible", total.visible, total.invisible)?;

        writeln!(f, "[splits]")?;
        for (split, n) in &self.frames_per_split {
            writeln!(f, "{split}: {n}")?;
        }
        writeln!(f, "[cameras]")?;
        for (camera, n) in &self.frames_per_camera {
            writeln!(f, "{camera}: {n}")?;
        }
        writeln!(f, "[categories]")?;
        for (category, c) in &self.boxes_per_category {
            writeln!(f, "{category}: {} visible, {} invisible", c.visible, c.invisible)?;
        }
        Ok(())
    }
}

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;

use crate::assembler::FrameAssembler;
use crate::config::BatchConfig;
use crate::error::FrameError;
use crate::frame::Frame;
use crate::stats::FrameStats;
use crate::thruput::ThroughputCounter;
use crate::uri::FrameUri;

/// Consumer of assembled frames, e.g. a storage writer.
pub trait FrameSink: Send + Sync {
    /// Store one frame and return the number of bytes written.
    fn write(&self, frame: &Frame) -> Result<usize, FrameError>;
}

/// Keeps frames in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Mutex<Vec<Frame>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored frames sorted by uri.
    pub fn into_frames(self) -> Vec<Frame> {
        let mut frames = self
            .frames
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        frames.sort_by(|a, b| a.uri.cmp(&b.uri));
        frames
    }
}

impl FrameSink for MemorySink {
    fn write(&self, frame: &Frame) -> Result<usize, FrameError> {
        let bytes = frame.to_bytes()?.len();
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());
        Ok(bytes)
    }
}

/// Writes each frame as a bincode file under a root directory.
///
/// The layout is
/// `<root>/<dataset>/<segment_id>/<timestamp>_<camera>[@vp-<x>-<y>-<w>-<h>][@track-<id>].frame`.
/// Name components are percent-escaped so that distinct uris never share a
/// file. Frames are written to a temporary file and renamed into place, so
/// a failed write leaves no partial frame behind.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Extension of the written files.
    pub const EXTENSION: &'static str = "frame";

    /// Write frames below `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, FrameError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The file a frame with `uri` is written to.
    pub fn path_for(&self, uri: &FrameUri) -> PathBuf {
        let mut name = format!("{}_{}", uri.timestamp(), escape_component(uri.camera()));
        if let Some(v) = uri.viewport() {
            name.push_str(&format!("@vp-{}-{}-{}-{}", v.x, v.y, v.width, v.height));
        }
        if let Some(track_id) = uri.track_id() {
            name.push_str("@track-");
            name.push_str(&escape_component(track_id));
        }
        self.root
            .join(escape_component(uri.dataset()))
            .join(escape_component(uri.segment_id()))
            .join(format!("{name}.{}", Self::EXTENSION))
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FrameSink for DirectorySink {
    fn write(&self, frame: &Frame) -> Result<usize, FrameError> {
        let path = self.path_for(&frame.uri);
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;
        let bytes = frame.to_bytes()?;

        // the temporary file is removed on drop if anything below fails
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(std::io::Error::from)?;
        Ok(bytes.len())
    }
}

// Keeps ascii alphanumerics, `-` and `_`; every other byte becomes `%XX`.
// The mapping is reversible and never yields `.`, `..` or a separator.
fn escape_component(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for byte in component.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Shared flag to stop a batch run.
///
/// Uris that have not started when the flag is raised are skipped; frames
/// already being assembled run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// Frames assembled and written.
    pub written: u64,
    /// Bytes written.
    pub bytes: u64,
    /// Uris whose frame failed, with the error message.
    pub skipped: Vec<(FrameUri, String)>,
    /// Uris never started because the run was cancelled.
    pub not_started: u64,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Counts over the written frames.
    pub stats: FrameStats,
    /// Throughput of the run.
    pub throughput: ThroughputCounter,
}

enum Outcome {
    Written { bytes: usize, stats: FrameStats },
    Skipped(FrameUri, String),
    NotStarted,
}

fn process(
    assembler: &FrameAssembler,
    sink: &dyn FrameSink,
    uri: &FrameUri,
    cancel: &CancelToken,
) -> Outcome {
    if cancel.is_cancelled() {
        return Outcome::NotStarted;
    }

    let result = assembler.assemble(uri).and_then(|frame| {
        let bytes = sink.write(&frame)?;
        let mut stats = FrameStats::default();
        stats.observe(&frame);
        Ok((bytes, stats))
    });

    match result {
        Ok((bytes, stats)) => Outcome::Written { bytes, stats },
        Err(err) => {
            log::warn!("Skipping {uri}: {err}");
            Outcome::Skipped(uri.clone(), err.to_string())
        }
    }
}

/// Assemble `uris` in parallel and hand every frame to `sink`.
///
/// Uris are processed in chunks of [`BatchConfig::uris_per_chunk`]. A frame
/// that fails to assemble or write is logged and skipped; the run goes on
/// with the next uri. Only a failure to create the worker pool is returned
/// as an error.
pub fn run_batch(
    assembler: &FrameAssembler,
    uris: &[FrameUri],
    sink: &dyn FrameSink,
    config: &BatchConfig,
    cancel: &CancelToken,
) -> Result<BatchReport, FrameError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(num_threads) = config.num_threads {
        builder = builder.num_threads(num_threads);
    }
    let pool = builder.build()?;

    let mut report = BatchReport {
        written: 0,
        bytes: 0,
        skipped: Vec::new(),
        not_started: 0,
        cancelled: false,
        stats: FrameStats::default(),
        throughput: ThroughputCounter::new(),
    };

    for chunk in uris.chunks(config.uris_per_chunk.max(1)) {
        let outcomes: Vec<Outcome> = pool.install(|| {
            chunk
                .par_iter()
                .map(|uri| process(assembler, sink, uri, cancel))
                .collect()
        });

        let (mut frames, mut bytes) = (0, 0);
        for outcome in outcomes {
            match outcome {
                Outcome::Written { bytes: n, stats } => {
                    frames += 1;
                    bytes += n as u64;
                    report.stats.merge(&stats);
                }
                Outcome::Skipped(uri, err) => report.skipped.push((uri, err)),
                Outcome::NotStarted => report.not_started += 1,
            }
        }
        report.written += frames;
        report.bytes += bytes;
        report.throughput.update(frames, bytes);

        log::info!(
            "{} of {} uris done, {} skipped ({:.1} frames/s)",
            report.written + report.skipped.len() as u64,
            uris.len(),
            report.skipped.len(),
            report.throughput.recent_frames_per_second()
        );

        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
    }

    let done = report.written + report.skipped.len() as u64 + report.not_started;
    report.not_started += uris.len() as u64 - done;

    log::info!("Batch finished: {}", report.throughput);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_component() {
        assert_eq!(escape_component("scene-0061"), "scene-0061");
        assert_eq!(escape_component("CAM_FRONT"), "CAM_FRONT");
        assert_eq!(escape_component("../etc/passwd"), "%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(escape_component("a b:c"), "a%20b%3Ac");
        assert_eq!(escape_component("50%"), "50%25");
    }

    #[test]
    fn test_path_for() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let sink = DirectorySink::new(dir.path())?;
        let uri = FrameUri::new("nuscenes", "train", "scene/1", 42, "CAM_FRONT")?.with_viewport(
            crate::uri::Viewport {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            },
        );
        assert_eq!(
            sink.path_for(&uri),
            dir.path().join("nuscenes/scene%2F1/42_CAM_FRONT@vp-1-2-3-4.frame")
        );
        Ok(())
    }

    #[test]
    fn test_distinct_uris_get_distinct_paths() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let sink = DirectorySink::new(dir.path())?;
        let uri = FrameUri::new("nuscenes", "train", "scene-1", 42, "CAM_FRONT")?;
        let viewport = crate::uri::Viewport {
            x: 1,
            y: 2,
            width: 3,
            height: 4,
        };

        let uris = vec![
            uri.clone(),
            uri.with_viewport(viewport),
            uri.with_track_id("1_2_3_4"),
            uri.with_track_id("vp-1-2-3-4"),
            uri.with_track_id("@vp-1-2-3-4"),
            uri.with_viewport(viewport).with_track_id("t"),
            FrameUri::new("nuscenes", "train", "scene-1", 42, "CAM FRONT")?,
            FrameUri::new("nuscenes", "train", "scene-1", 42, "CAM.FRONT")?,
            FrameUri::new("nuscenes", "train", "scene-1", 42, "CAM_FRONT@vp-1-2-3-4")?,
            FrameUri::new("nuscenes", "train", "scene_1", 42, "CAM_FRONT")?,
            FrameUri::new("nuscenes", "train", "scene/1", 42, "CAM_FRONT")?,
            FrameUri::new("nuscenes", "train", "scene-1", 4, "2_CAM_FRONT")?,
        ];
        let paths: std::collections::BTreeSet<PathBuf> =
            uris.iter().map(|u| sink.path_for(u)).collect();
        assert_eq!(paths.len(), uris.len());
        for path in &paths {
            assert!(path.starts_with(dir.path()));
            assert_eq!(path.components().count(), dir.path().components().count() + 3);
        }
        Ok(())
    }

    #[test]
    fn test_failed_write_leaves_no_partial_frame() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let sink = DirectorySink::new(dir.path())?;
        let frame = Frame {
            uri: FrameUri::new("nuscenes", "train", "scene-1", 42, "CAM_FRONT")?,
            world_to_ego: avframe_3d::Transform::identity(),
            camera_images: vec![],
        };
        let path = sink.path_for(&frame.uri);

        // a directory in place of the target makes the final rename fail
        std::fs::create_dir_all(&path)?;
        assert!(sink.write(&frame).is_err());
        assert!(path.is_dir());
        let entries = std::fs::read_dir(path.parent().ok_or("no parent")?)?.count();
        assert_eq!(entries, 1);

        std::fs::remove_dir(&path)?;
        let written = sink.write(&frame)?;
        assert!(path.is_file());
        assert_eq!(std::fs::metadata(&path)?.len(), written as u64);
        assert_eq!(Frame::from_bytes(&std::fs::read(&path)?)?, frame);
        Ok(())
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}

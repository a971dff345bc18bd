use std::time::{Duration, Instant};

/// The smoothing factor for the frames-per-second estimate.
const SMOOTHING: f64 = 0.9;

/// Counts frames and bytes written by a batch and estimates throughput.
///
/// # Examples
///
/// ```
/// use avframe_frame::thruput::ThroughputCounter;
///
/// let mut counter = ThroughputCounter::new();
/// counter.update(10, 2048);
/// assert_eq!(counter.frames(), 10);
/// assert_eq!(counter.bytes(), 2048);
/// ```
#[derive(Debug, Clone)]
pub struct ThroughputCounter {
    started: Instant,
    last_update: Instant,
    frames: u64,
    bytes: u64,
    smoothed_fps: f64,
}

impl ThroughputCounter {
    /// Start counting now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_update: now,
            frames: 0,
            bytes: 0,
            smoothed_fps: 0.0,
        }
    }

    /// Record `frames` frames totalling `bytes` bytes.
    pub fn update(&mut self, frames: u64, bytes: u64) {
        self.frames += frames;
        self.bytes += bytes;

        let now = Instant::now();
        let seconds = now.duration_since(self.last_update).as_secs_f64();
        if seconds > 0.0 {
            let instant_fps = frames as f64 / seconds;
            self.smoothed_fps = if self.smoothed_fps == 0.0 {
                instant_fps
            } else {
                self.smoothed_fps * SMOOTHING + instant_fps * (1.0 - SMOOTHING)
            };
        }
        self.last_update = now;
    }

    /// Total frames recorded.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Total bytes recorded.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Time since the counter was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Frames per second over the whole run.
    pub fn frames_per_second(&self) -> f64 {
        let seconds = self.elapsed().as_secs_f64();
        if seconds > 0.0 {
            self.frames as f64 / seconds
        } else {
            0.0
        }
    }

    /// Smoothed recent frames per second.
    #[inline]
    pub fn recent_frames_per_second(&self) -> f64 {
        self.smoothed_fps
    }
}

impl Default for ThroughputCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThroughputCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {:.1} MiB in {:.2}s ({:.1} frames/s)",
            self.frames,
            self.bytes as f64 / (1024.0 * 1024.0),
            self.elapsed().as_secs_f64(),
            self.frames_per_second()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_counter() {
        let mut counter = ThroughputCounter::new();
        std::thread::sleep(Duration::from_millis(5));
        counter.update(3, 100);
        counter.update(2, 50);
        assert_eq!(counter.frames(), 5);
        assert_eq!(counter.bytes(), 150);
        assert!(counter.frames_per_second() > 0.0);
        assert!(counter.recent_frames_per_second() > 0.0);
        assert!(counter.to_string().starts_with("5 frames"));
    }
}

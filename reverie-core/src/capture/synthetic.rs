//! `SyntheticCamera` — deterministic test-pattern device.
//!
//! Renders a bright vertical block over a noisy dark background. The block
//! centre follows `path` (normalized x positions), one step per frame,
//! wrapping around. Lets the capture thread, the motion detector and the
//! gesture producer run end-to-end without hardware.
//!
//! A [`DeviceProbe`] records how the device was used so tests can check the
//! single-thread, release-once discipline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::device::{CaptureDevice, Frame, FrameSize, ResolutionList};
use crate::error::{Result, ReverieError};

const BACKGROUND_LUMA: u8 = 24;
const BLOCK_LUMA: u8 = 220;

/// Usage counters shared with the test or host that built the camera.
#[derive(Debug, Default)]
pub struct DeviceProbe {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub frames: AtomicUsize,
    pub used_after_release: AtomicBool,
    threads: Mutex<HashSet<ThreadId>>,
}

impl DeviceProbe {
    /// Distinct threads that touched the device.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    fn touch(&self) {
        self.threads.lock().insert(thread::current().id());
    }
}

pub struct SyntheticCamera {
    supported: ResolutionList,
    size: Option<FrameSize>,
    frame_interval: Duration,
    next_frame_at: Instant,
    path: Vec<f32>,
    step: usize,
    noise: u8,
    rng: StdRng,
    fail_after: Option<usize>,
    fail_open: bool,
    released: bool,
    probe: Arc<DeviceProbe>,
}

impl SyntheticCamera {
    pub fn new(supported: ResolutionList) -> Self {
        Self {
            supported,
            size: None,
            frame_interval: Duration::from_millis(33),
            next_frame_at: Instant::now(),
            path: vec![0.5],
            step: 0,
            noise: 6,
            rng: StdRng::seed_from_u64(0x5eed),
            fail_after: None,
            fail_open: false,
            released: false,
            probe: Arc::new(DeviceProbe::default()),
        }
    }

    /// Frames per second the device delivers.
    pub fn with_fps(mut self, fps: f32) -> Self {
        let fps = if fps.is_finite() { fps.clamp(1.0, 240.0) } else { 30.0 };
        self.frame_interval = Duration::from_secs_f32(1.0 / fps);
        self
    }

    /// Block centre positions in [0.0, 1.0], one per frame, cycled.
    pub fn with_path(mut self, path: Vec<f32>) -> Self {
        if !path.is_empty() {
            self.path = path;
        }
        self
    }

    /// A block sweeping from the left edge to the right edge in `steps` frames.
    pub fn with_sweep(self, steps: usize) -> Self {
        let steps = steps.max(2);
        let path = (0..steps)
            .map(|i| 0.05 + 0.9 * i as f32 / (steps - 1) as f32)
            .collect();
        self.with_path(path)
    }

    /// Maximum per-pixel background noise.
    pub fn with_noise(mut self, noise: u8) -> Self {
        self.noise = noise;
        self
    }

    /// Fail every read after `frames` successful ones.
    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Fail `open`.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn probe(&self) -> Arc<DeviceProbe> {
        Arc::clone(&self.probe)
    }

    fn render(&mut self, size: FrameSize) -> Frame {
        let width = size.width as usize;
        let mut luma: Vec<u8> = (0..size.area())
            .map(|_| BACKGROUND_LUMA.saturating_add(self.rng.gen_range(0..=self.noise)))
            .collect();

        let centre = self.path[self.step % self.path.len()].clamp(0.0, 1.0);
        self.step += 1;

        let half = (width / 16).max(1);
        let cx = ((centre * width as f32) as usize).min(width.saturating_sub(1));
        let x0 = cx.saturating_sub(half);
        let x1 = (cx + half).min(width);
        if width > 0 {
            for row in luma.chunks_exact_mut(width) {
                row[x0..x1].fill(BLOCK_LUMA);
            }
        }

        Frame::new(size, luma)
    }
}

impl CaptureDevice for SyntheticCamera {
    fn open(&mut self, requested: FrameSize) -> Result<FrameSize> {
        self.probe.touch();
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(ReverieError::DeviceFault("synthetic open failure".into()));
        }
        let size = self
            .supported
            .closest(requested)
            .ok_or_else(|| ReverieError::DeviceFault("no supported sizes".into()))?;
        self.size = Some(size);
        self.next_frame_at = Instant::now() + self.frame_interval;
        Ok(size)
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        self.probe.touch();
        if self.released {
            self.probe.used_after_release.store(true, Ordering::SeqCst);
            return Err(ReverieError::DeviceFault("read after release".into()));
        }
        let size = self
            .size
            .ok_or_else(|| ReverieError::DeviceFault("read before open".into()))?;

        let delivered = self.probe.frames.load(Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| delivered >= limit) {
            return Err(ReverieError::DeviceFault("synthetic read failure".into()));
        }

        let now = Instant::now();
        if self.next_frame_at > now + timeout {
            thread::sleep(timeout);
            return Ok(None);
        }
        if self.next_frame_at > now {
            thread::sleep(self.next_frame_at - now);
        }
        self.next_frame_at += self.frame_interval;

        let frame = self.render(size);
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.probe.touch();
        if self.released {
            self.probe.used_after_release.store(true, Ordering::SeqCst);
            return;
        }
        self.released = true;
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
    }
}

//! Capture device boundary and resolution lookup.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether both dimensions are no larger than `other`'s.
    pub fn fits_within(&self, other: FrameSize) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One grayscale frame, row-major, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub size: FrameSize,
    pub luma: Vec<u8>,
}

impl Frame {
    pub fn new(size: FrameSize, luma: Vec<u8>) -> Self {
        debug_assert_eq!(luma.len() as u64, size.area());
        Self { size, luma }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        self.luma
            .get(y as usize * self.size.width as usize + x as usize)
            .copied()
    }

    /// Flip left/right in place.
    pub fn mirror_horizontal(&mut self) {
        let width = self.size.width as usize;
        if width == 0 {
            return;
        }
        for row in self.luma.chunks_exact_mut(width) {
            row.reverse();
        }
    }
}

/// Contract for camera-like devices.
///
/// A device is moved into the capture loop thread and only ever touched
/// there; it does not need to be `Sync`.
pub trait CaptureDevice: Send + 'static {
    /// Open the device as close to `requested` as it supports.
    ///
    /// # Errors
    /// Returns `ReverieError::DeviceFault` when the device cannot be opened.
    fn open(&mut self, requested: FrameSize) -> Result<FrameSize>;

    /// Block for at most `timeout` waiting for the next frame.
    /// `Ok(None)` means no frame arrived in time.
    ///
    /// # Errors
    /// Returns `ReverieError::DeviceFault` on a read failure.
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Close the device. Called exactly once by the capture loop.
    fn release(&mut self);
}

/// A device that has been opened and will be released when dropped.
pub(crate) struct OpenDevice {
    device: Box<dyn CaptureDevice>,
    size: FrameSize,
}

impl OpenDevice {
    /// Open `device`. A failed open still releases it so no half-open
    /// handle is left behind.
    pub(crate) fn open(mut device: Box<dyn CaptureDevice>, requested: FrameSize) -> Result<Self> {
        match device.open(requested) {
            Ok(size) => Ok(Self { device, size }),
            Err(e) => {
                device.release();
                Err(e)
            }
        }
    }

    pub(crate) fn size(&self) -> FrameSize {
        self.size
    }

    pub(crate) fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        self.device.read_frame(timeout)
    }
}

impl Drop for OpenDevice {
    fn drop(&mut self) {
        self.device.release();
        debug!(size = %self.size, "capture device released");
    }
}

/// Sizes a device supports, largest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionList {
    sizes: Vec<FrameSize>,
}

impl ResolutionList {
    pub fn new(sizes: impl IntoIterator<Item = FrameSize>) -> Self {
        let mut sizes: Vec<FrameSize> = sizes.into_iter().collect();
        sizes.sort_by_key(|s| std::cmp::Reverse((s.area(), s.width)));
        sizes.dedup();
        Self { sizes }
    }

    pub fn sizes(&self) -> &[FrameSize] {
        &self.sizes
    }

    /// Exact membership only.
    pub fn contains(&self, size: FrameSize) -> bool {
        self.sizes.contains(&size)
    }

    /// Best supported size for `requested`.
    ///
    /// An exact match wins; otherwise the largest size that fits inside the
    /// request; otherwise (request smaller than everything) the smallest
    /// supported size. `None` only for an empty list.
    pub fn closest(&self, requested: FrameSize) -> Option<FrameSize> {
        if self.contains(requested) {
            return Some(requested);
        }
        self.sizes
            .iter()
            .copied()
            .find(|s| s.fits_within(requested))
            .or_else(|| self.sizes.last().copied())
    }
}

//! Downstream consumers of captured frames.

use super::{device::Frame, device::FrameSize, Viewpoint};

/// Per-frame context forwarded alongside each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Frame counter for the current capture thread, starting at 0.
    pub seq: u64,
    /// Sensitivity in [0.0, 1.0] fixed for the current capture session.
    pub sensitivity: f32,
    /// Viewpoint already applied to the frame.
    pub viewpoint: Viewpoint,
}

/// Receives frames on the capture loop thread.
///
/// Implementations run inline with frame reads, so slow sinks lower the
/// effective frame rate.
pub trait FrameSink: Send + 'static {
    fn on_frame(&mut self, frame: &Frame, ctx: &FrameContext);

    /// A capture session began at `size`.
    fn on_capture_started(&mut self, _size: FrameSize) {}

    /// The current capture session ended (stop, interrupt or device fault).
    fn on_capture_stopped(&mut self) {}
}

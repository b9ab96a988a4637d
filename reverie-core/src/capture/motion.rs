//! `MotionDetector` — frame-differencing sink that emits `MotionEvent`s.
//!
//! ## Algorithm
//!
//! 1. Compare each pixel with the same pixel of the previous frame.
//! 2. A pixel "changed" when the absolute luma delta reaches the threshold
//!    derived from the session sensitivity (higher sensitivity → lower
//!    threshold).
//! 3. Coverage = changed / total. At or above `min_coverage` the frame is
//!    moving and the event carries the centroid of the changed pixels.
//!
//! The frame arrives viewpoint-corrected, so `x` already matches what the
//! player sees.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use super::{
    device::{Frame, FrameSize},
    sink::{FrameContext, FrameSink},
};
use crate::events::MotionEvent;

/// Configuration for `MotionDetector`.
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// Changed-pixel fraction that counts as movement. Default: 0.01.
    pub min_coverage: f32,
    /// Capacity of the event channel. Default: 256.
    pub event_capacity: usize,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_coverage: 0.01,
            event_capacity: 256,
        }
    }
}

/// Per-pixel luma delta that counts as change at `sensitivity`.
pub fn pixel_threshold(sensitivity: f32) -> u8 {
    let s = if sensitivity.is_finite() {
        sensitivity.clamp(0.0, 1.0)
    } else {
        0.5
    };
    (8.0 + (1.0 - s) * 120.0).round() as u8
}

pub struct MotionDetector {
    config: MotionConfig,
    previous: Vec<u8>,
    previous_size: Option<FrameSize>,
    events_tx: Sender<MotionEvent>,
    dropped: u64,
}

impl MotionDetector {
    /// Create a detector and the receiver its events go to. Clone the
    /// receiver for each gesture producer.
    pub fn new(config: MotionConfig) -> (Self, Receiver<MotionEvent>) {
        let (events_tx, events_rx) = bounded(config.event_capacity.max(1));
        let detector = Self {
            config,
            previous: Vec::new(),
            previous_size: None,
            events_tx,
            dropped: 0,
        };
        (detector, events_rx)
    }

    fn diff(&self, frame: &Frame, threshold: u8, seq: u64) -> MotionEvent {
        let width = frame.size.width.max(1) as usize;
        let mut changed = 0u64;
        let mut sum_x = 0u64;
        let mut sum_y = 0u64;

        for (i, (&now, &before)) in frame.luma.iter().zip(&self.previous).enumerate() {
            if now.abs_diff(before) >= threshold {
                changed += 1;
                sum_x += (i % width) as u64;
                sum_y += (i / width) as u64;
            }
        }

        let total = frame.luma.len().max(1) as f32;
        let coverage = changed as f32 / total;
        let moving = changed > 0 && coverage >= self.config.min_coverage;

        let (x, y) = if changed > 0 {
            (
                (sum_x as f32 / changed as f32 + 0.5) / frame.size.width.max(1) as f32,
                (sum_y as f32 / changed as f32 + 0.5) / frame.size.height.max(1) as f32,
            )
        } else {
            (0.5, 0.5)
        };

        MotionEvent {
            seq,
            x,
            y,
            coverage,
            moving,
        }
    }

    fn emit(&mut self, event: MotionEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped.is_power_of_two() {
                    warn!(dropped = self.dropped, "motion event queue full");
                }
            }
            // Nobody is listening; frames still flow.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl FrameSink for MotionDetector {
    fn on_frame(&mut self, frame: &Frame, ctx: &FrameContext) {
        if self.previous_size == Some(frame.size) {
            let event = self.diff(frame, pixel_threshold(ctx.sensitivity), ctx.seq);
            self.emit(event);
        }

        self.previous.clear();
        self.previous.extend_from_slice(&frame.luma);
        self.previous_size = Some(frame.size);
    }

    fn on_capture_started(&mut self, size: FrameSize) {
        debug!(%size, "motion detector armed");
        self.previous.clear();
        self.previous_size = None;
    }

    fn on_capture_stopped(&mut self) {
        self.previous.clear();
        self.previous_size = None;
    }
}

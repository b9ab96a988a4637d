//! Gesture producer fed by the motion detector.
//!
//! The horizontal field of view is split into one equal band per choice,
//! leftmost band = first choice. Holding motion inside a single band for
//! `dwell_events` consecutive frames selects that choice. A still frame or a
//! move into another band restarts the count.

use crossbeam_channel::{select, Receiver};
use tracing::debug;

use crate::{
    error::Result,
    events::{InputKind, MotionEvent},
    input::{listener::Listener, InputMethod},
    prompt::PromptHandle,
};

/// Configuration for `GestureInputMethod`.
#[derive(Debug, Clone)]
pub struct GestureConfig {
    /// Consecutive moving events in one band needed to select it. Default: 6.
    pub dwell_events: u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self { dwell_events: 6 }
    }
}

/// Band index for a normalized horizontal position.
pub fn band_for(x: f32, bands: usize) -> usize {
    if bands == 0 {
        return 0;
    }
    let x = if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 };
    ((x * bands as f32) as usize).min(bands - 1)
}

/// Tracks dwell inside one band.
#[derive(Debug, Default)]
struct DwellTracker {
    band: Option<usize>,
    count: u32,
}

impl DwellTracker {
    fn observe(&mut self, event: &MotionEvent, bands: usize, dwell_events: u32) -> Option<usize> {
        if !event.moving {
            self.band = None;
            self.count = 0;
            return None;
        }

        let band = band_for(event.x, bands);
        if self.band == Some(band) {
            self.count += 1;
        } else {
            self.band = Some(band);
            self.count = 1;
        }

        (self.count >= dwell_events.max(1)).then_some(band)
    }
}

pub struct GestureInputMethod {
    events: Receiver<MotionEvent>,
    config: GestureConfig,
    listener: Option<Listener>,
}

impl GestureInputMethod {
    /// `events` is usually a clone of the motion detector's output receiver.
    pub fn new(events: Receiver<MotionEvent>, config: GestureConfig) -> Self {
        Self {
            events,
            config,
            listener: None,
        }
    }
}

impl InputMethod for GestureInputMethod {
    fn kind(&self) -> InputKind {
        InputKind::Gesture
    }

    fn show(&mut self, prompt: PromptHandle) -> Result<()> {
        self.dismiss();

        // Motion from before the prompt appeared is not an answer.
        let stale = self.events.try_iter().count();
        debug!(prompt_id = prompt.id(), stale, "gesture producer armed");

        let events = self.events.clone();
        let dwell_events = self.config.dwell_events;
        let bands = prompt.choices().len();
        let name = format!("gesture-prompt-{}", prompt.id());

        let listener = Listener::spawn(name, move |stop_rx| {
            let mut tracker = DwellTracker::default();
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(events) -> msg => {
                        let Ok(event) = msg else { break };
                        if let Some(index) = tracker.observe(&event, bands, dwell_events) {
                            prompt.resolve(index, InputKind::Gesture);
                            break;
                        }
                    }
                }
            }
        })?;
        self.listener = Some(listener);
        Ok(())
    }

    fn dismiss(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
    }
}

impl Drop for GestureInputMethod {
    fn drop(&mut self) {
        self.dismiss();
    }
}

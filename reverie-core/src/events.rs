//! Serializable events surfaced by input producers.
//!
//! `InputDiagnostic` is broadcast over `tokio::sync::broadcast` so a host can
//! show feedback ("too much background noise") without touching the prompt.
//! `MotionEvent` flows from the motion detector to gesture producers over a
//! crossbeam channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which modality produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Speech,
    Click,
    Gesture,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputKind::Speech => "speech",
            InputKind::Click => "click",
            InputKind::Gesture => "gesture",
        };
        f.write_str(name)
    }
}

/// Why a prompt finished without a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelReason {
    TimedOut,
    Interrupted,
    Dismissed,
}

/// Kind of audio trouble reported by the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioProblem {
    Noise,
    NoSignal,
    TooLoud,
    TooQuiet,
    TooFast,
    TooSlow,
}

/// Diagnostic stream for hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputDiagnostic {
    /// The recognizer heard something it could not use. Never resolves a prompt.
    #[serde(rename_all = "camelCase")]
    AudioSignalProblem { prompt_id: u64, problem: AudioProblem },
    /// A producer won the race for a prompt.
    #[serde(rename_all = "camelCase")]
    Resolved {
        prompt_id: u64,
        index: usize,
        source: InputKind,
    },
    /// The prompt finished without a winner.
    #[serde(rename_all = "camelCase")]
    Cancelled { prompt_id: u64, reason: CancelReason },
}

/// Per-frame output of the motion detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionEvent {
    /// Sequence number of the frame that produced this event.
    pub seq: u64,
    /// Horizontal centroid of motion in [0.0, 1.0], already viewpoint-corrected.
    pub x: f32,
    /// Vertical centroid of motion in [0.0, 1.0].
    pub y: f32,
    /// Fraction of pixels that changed since the previous frame.
    pub coverage: f32,
    /// Whether coverage exceeded the detector's activity floor.
    pub moving: bool,
}

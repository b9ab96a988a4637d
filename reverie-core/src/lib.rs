//! # reverie-core
//!
//! Choice arbitration runtime for interactive fiction.
//!
//! ## Architecture
//!
//! ```text
//!  SpeechRecognitionInputMethod ─┐
//!  ClickInputMethod ─────────────┼─► PromptHandle::resolve ─► Prompt (Mutex + Condvar)
//!  GestureInputMethod ───────────┘                                  │
//!        ▲                                                          ▼
//!        │ MotionEvent                                  consumer: Prompt::wait
//!  CaptureThread ─► MotionDetector (FrameSink)
//! ```
//!
//! Every producer runs on its own thread and races to resolve the prompt.
//! The prompt's lock is the only arbiter: the first resolve wins, all later
//! ones are dropped.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod capture;
pub mod error;
pub mod events;
pub mod input;
pub mod prompt;
pub mod speech;

// Convenience re-exports for downstream crates
pub use capture::{
    CaptureConfig, CaptureReport, CaptureSettings, CaptureState, CaptureThread,
    MotionDetectorCaptureThread, Viewpoint,
};
pub use error::{ReverieError, Result};
pub use events::{CancelReason, InputDiagnostic, InputKind, MotionEvent};
pub use input::{
    click::{ClickChannel, ClickInputMethod},
    gesture::{GestureConfig, GestureInputMethod},
    InputMethod, InputMethods,
};
pub use prompt::{
    choice::{Choice, Choices, Intention},
    Cancelled, Interrupter, Prompt, PromptGuard, PromptHandle, Resolution,
};
pub use speech::{
    Grammar, RecognitionResult, Recognizer, RecognizerEvent, RecognizerHandle, SpeechConfig,
    SpeechRecognitionInputMethod,
};

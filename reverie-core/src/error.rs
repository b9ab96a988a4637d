use thiserror::Error;

use crate::prompt::Cancelled;

/// All errors produced by reverie-core.
#[derive(Debug, Error)]
pub enum ReverieError {
    #[error("invalid choices: {0}")]
    InvalidChoices(String),

    #[error("prompt has already been dismissed")]
    PromptDismissed,

    #[error("recognizer error: {0}")]
    Recognizer(String),

    #[error("capture device fault: {0}")]
    DeviceFault(String),

    #[error("cannot {op} while capture thread is {state}")]
    InvalidCaptureState {
        op: &'static str,
        state: crate::capture::CaptureState,
    },

    #[error("capture settings cannot change while capturing")]
    SettingsLocked,

    #[error("capture loop panicked")]
    CaptureLoopPanicked,

    #[error("prompt cancelled: {0}")]
    Cancelled(#[from] Cancelled),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ReverieError>;

//! Keyboard stand-in for a speech engine.
//!
//! Lines typed at the terminal are posted as recognized utterances with full
//! confidence, but only while a prompt is listening. The core still does the
//! phrase matching, so typing "i have a dream" behaves like saying it.

use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use reverie_core::{speech::Grammar, RecognitionResult, Recognizer, RecognizerEvent, Result};
use tracing::debug;

type Listening = Arc<Mutex<Option<Sender<RecognizerEvent>>>>;

#[derive(Default)]
pub struct TypedSpeech {
    listening: Listening,
}

impl TypedSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal-side handle for posting typed utterances.
    pub fn feed(&self) -> TypedFeed {
        TypedFeed {
            listening: Arc::clone(&self.listening),
        }
    }
}

impl Recognizer for TypedSpeech {
    fn start_listening(&mut self, grammar: &Grammar, events: Sender<RecognizerEvent>) -> Result<()> {
        debug!(phrases = grammar.phrases().count(), "typed speech listening");
        *self.listening.lock() = Some(events);
        Ok(())
    }

    fn stop_listening(&mut self) -> Result<()> {
        self.listening.lock().take();
        Ok(())
    }
}

#[derive(Clone)]
pub struct TypedFeed {
    listening: Listening,
}

impl TypedFeed {
    /// Post `text` as heard speech. Returns `false` when nothing is
    /// listening or the listener has fallen behind.
    pub fn say(&self, text: &str) -> bool {
        let guard = self.listening.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        let event = RecognizerEvent::Recognized(vec![RecognitionResult {
            text: text.to_string(),
            confidence: 1.0,
        }]);
        tx.try_send(event).is_ok()
    }
}

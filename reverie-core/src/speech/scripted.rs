//! `ScriptedRecognizer` — stand-in engine that replays canned events.
//!
//! Each `start_listening` call consumes the next queued session script and
//! plays it on a feeder thread, one step per delay. Useful for tests and for
//! exercising the whole prompt flow without a real speech engine.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Grammar, RecognitionResult, Recognizer, RecognizerEvent};
use crate::error::Result;
use crate::events::AudioProblem;

/// One scripted event and how long to wait before posting it.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub delay: Duration,
    pub event: RecognizerEvent,
}

impl ScriptStep {
    pub fn heard(delay: Duration, text: &str, confidence: f32) -> Self {
        Self {
            delay,
            event: RecognizerEvent::Recognized(vec![RecognitionResult {
                text: text.into(),
                confidence,
            }]),
        }
    }

    pub fn problem(delay: Duration, problem: AudioProblem) -> Self {
        Self {
            delay,
            event: RecognizerEvent::AudioSignalProblem(problem),
        }
    }
}

struct Feeder {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Replays one queued script per listening session.
#[derive(Default)]
pub struct ScriptedRecognizer {
    sessions: VecDeque<Vec<ScriptStep>>,
    grammars: Arc<Mutex<Vec<Grammar>>>,
    feeder: Option<Feeder>,
    stop_calls: Arc<Mutex<usize>>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next listening session.
    pub fn push_session(&mut self, steps: Vec<ScriptStep>) {
        self.sessions.push_back(steps);
    }

    /// Grammars received so far, shared so tests can inspect them after the
    /// recognizer has moved into a handle.
    pub fn grammars(&self) -> Arc<Mutex<Vec<Grammar>>> {
        Arc::clone(&self.grammars)
    }

    /// Number of `stop_listening` calls that actually stopped a session.
    pub fn stop_count(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.stop_calls)
    }
}

impl Recognizer for ScriptedRecognizer {
    fn start_listening(&mut self, grammar: &Grammar, events: Sender<RecognizerEvent>) -> Result<()> {
        self.stop_listening()?;
        self.grammars.lock().push(grammar.clone());

        let steps = self.sessions.pop_front().unwrap_or_default();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("scripted-recognizer".into())
            .spawn(move || {
                for step in steps {
                    match stop_rx.recv_timeout(step.delay) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => return,
                    }
                    if events.send(step.event).is_err() {
                        return;
                    }
                }
                // Hold the sender open until stopped, like a live engine.
                let _ = stop_rx.recv();
            })?;

        self.feeder = Some(Feeder { stop_tx, handle });
        debug!("scripted recognizer listening");
        Ok(())
    }

    fn stop_listening(&mut self) -> Result<()> {
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.stop_tx.try_send(());
            if feeder.handle.join().is_err() {
                warn!("scripted recognizer feeder panicked");
            }
            *self.stop_calls.lock() += 1;
        }
        Ok(())
    }
}

impl Drop for ScriptedRecognizer {
    fn drop(&mut self) {
        let _ = self.stop_listening();
    }
}

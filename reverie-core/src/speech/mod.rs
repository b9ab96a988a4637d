//! Speech-recognition producer.
//!
//! The recognizer engine itself is external: it is driven through the
//! [`Recognizer`] trait and reports back by posting [`RecognizerEvent`]s into
//! a crossbeam channel. A listener thread drains that channel, matches text
//! against the prompt's choices and resolves the prompt.
//!
//! The engine is long-lived and shared across prompts through a
//! [`RecognizerHandle`]; a prompt only borrows it for one decision.

pub mod matcher;
pub mod scripted;

use std::sync::Arc;

use crossbeam_channel::{bounded, select, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    events::{AudioProblem, InputDiagnostic, InputKind},
    input::{listener::Listener, InputMethod},
    prompt::{
        choice::{Choices, Intention},
        PromptHandle,
    },
};

/// Recognizer events buffered between the engine and the listener thread.
const EVENT_QUEUE_CAP: usize = 64;

/// One hypothesis from the recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub text: String,
    /// Engine confidence in [0.0, 1.0].
    pub confidence: f32,
}

/// Messages the engine posts while listening.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Ranked hypotheses for one utterance.
    Recognized(Vec<RecognitionResult>),
    /// Diagnostic only, never resolves a prompt.
    AudioSignalProblem(AudioProblem),
}

/// Phrases for one choice, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarRule {
    pub index: usize,
    pub phrases: Vec<String>,
}

/// Vocabulary handed to the recognizer for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    locale: String,
    intention: Intention,
    rules: Vec<GrammarRule>,
}

impl Grammar {
    pub fn from_choices(choices: &Choices) -> Self {
        let rules = choices
            .iter()
            .enumerate()
            .map(|(index, choice)| {
                let mut phrases: Vec<String> = Vec::new();
                for phrase in choice.utterances().map(matcher::normalize) {
                    if !phrase.is_empty() && !phrases.contains(&phrase) {
                        phrases.push(phrase);
                    }
                }
                GrammarRule { index, phrases }
            })
            .collect();

        Self {
            locale: choices.locale().to_string(),
            intention: choices.intention(),
            rules,
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn intention(&self) -> Intention {
        self.intention
    }

    pub fn rules(&self) -> &[GrammarRule] {
        &self.rules
    }

    /// Every phrase across all rules, in choice order.
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .flat_map(|r| r.phrases.iter().map(String::as_str))
    }
}

/// Contract for speech engines.
pub trait Recognizer: Send + 'static {
    /// Load `grammar` and start posting events to `events` until
    /// `stop_listening`.
    ///
    /// # Errors
    /// Returns an error if the engine cannot start.
    fn start_listening(&mut self, grammar: &Grammar, events: Sender<RecognizerEvent>) -> Result<()>;

    /// Stop listening and drop the event sender. Must be idempotent.
    fn stop_listening(&mut self) -> Result<()>;
}

/// Shared handle to a long-lived engine.
///
/// The `parking_lot::Mutex` gives whichever prompt is active exclusive use.
#[derive(Clone)]
pub struct RecognizerHandle(pub Arc<Mutex<dyn Recognizer>>);

impl RecognizerHandle {
    pub fn new<R: Recognizer>(recognizer: R) -> Self {
        Self(Arc::new(Mutex::new(recognizer)))
    }
}

impl std::fmt::Debug for RecognizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerHandle").finish_non_exhaustive()
    }
}

/// Configuration for speech matching.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Confidence floor for `Intention::Decide`. Default: 0.5.
    pub decide_min_confidence: f32,
    /// Confidence floor for `Intention::Confirm`. Default: 0.7.
    pub confirm_min_confidence: f32,
    /// Minimum token overlap for a best-effort `Decide` match. Default: 0.6.
    pub fuzzy_threshold: f32,
}

impl SpeechConfig {
    pub fn min_confidence(&self, intention: Intention) -> f32 {
        match intention {
            Intention::Decide => self.decide_min_confidence,
            Intention::Confirm => self.confirm_min_confidence,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            decide_min_confidence: 0.5,
            confirm_min_confidence: 0.7,
            fuzzy_threshold: 0.6,
        }
    }
}

/// Producer that resolves a prompt from recognized speech.
pub struct SpeechRecognitionInputMethod {
    recognizer: RecognizerHandle,
    config: SpeechConfig,
    listener: Option<Listener>,
}

impl SpeechRecognitionInputMethod {
    pub fn new(recognizer: RecognizerHandle, config: SpeechConfig) -> Self {
        Self {
            recognizer,
            config,
            listener: None,
        }
    }
}

impl InputMethod for SpeechRecognitionInputMethod {
    fn kind(&self) -> InputKind {
        InputKind::Speech
    }

    fn show(&mut self, prompt: PromptHandle) -> Result<()> {
        self.dismiss();

        let grammar = Grammar::from_choices(prompt.choices());
        let (events_tx, events_rx) = bounded(EVENT_QUEUE_CAP);
        self.recognizer.0.lock().start_listening(&grammar, events_tx)?;
        info!(
            prompt_id = prompt.id(),
            locale = grammar.locale(),
            phrases = grammar.phrases().count(),
            "recognizer listening"
        );

        let config = self.config.clone();
        let name = format!("speech-prompt-{}", prompt.id());
        let spawned = Listener::spawn(name, move |stop_rx| loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(events_rx) -> msg => match msg {
                    Ok(RecognizerEvent::Recognized(results)) => {
                        match matcher::match_results(&config, &grammar, &results) {
                            Some(index) => {
                                if prompt.resolve(index, InputKind::Speech) {
                                    break;
                                }
                            }
                            None => debug!(
                                prompt_id = prompt.id(),
                                hypotheses = results.len(),
                                "no choice matched recognized speech"
                            ),
                        }
                    }
                    Ok(RecognizerEvent::AudioSignalProblem(problem)) => {
                        warn!(prompt_id = prompt.id(), ?problem, "audio signal problem");
                        prompt.report(InputDiagnostic::AudioSignalProblem {
                            prompt_id: prompt.id(),
                            problem,
                        });
                    }
                    Err(_) => break,
                },
            }
        });

        match spawned {
            Ok(listener) => {
                self.listener = Some(listener);
                Ok(())
            }
            Err(e) => {
                if let Err(stop_err) = self.recognizer.0.lock().stop_listening() {
                    warn!("failed to stop recognizer after listener spawn error: {stop_err}");
                }
                Err(e.into())
            }
        }
    }

    fn dismiss(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };

        // Engine first, so it stops posting before the listener goes away.
        if let Err(e) = self.recognizer.0.lock().stop_listening() {
            warn!("failed to stop recognizer: {e}");
        }
        listener.stop();
        debug!("recognizer released");
    }
}

impl Drop for SpeechRecognitionInputMethod {
    fn drop(&mut self) {
        self.dismiss();
    }
}

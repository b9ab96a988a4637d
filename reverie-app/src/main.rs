//! Reverie terminal host.
//!
//! Plays a story graph through the arbitration core. Every prompt races
//! three producers:
//!
//! - typing a choice number clicks it;
//! - typing anything else is treated as speech and matched against the
//!   choice phrases;
//! - with `--gestures`, a synthetic camera sweeps a bright block across the
//!   frame and holding motion over a choice's band selects it.
//!
//! Type `quit` (or close stdin) to leave.
//!
//! ## Runtime note
//!
//! Prompts block, so the story loop runs on a blocking task. The Tokio
//! runtime only drives the diagnostics log.

mod settings;
mod story;
mod typed;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use reverie_core::{
    capture::{
        device::{FrameSize, ResolutionList},
        motion::MotionConfig,
        synthetic::SyntheticCamera,
    },
    input::click::ClickSender,
    Cancelled, CaptureConfig, ClickChannel, InputDiagnostic, InputMethods, Interrupter,
    MotionDetectorCaptureThread, Prompt, RecognizerHandle, SpeechRecognitionInputMethod,
};
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use story::Story;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use typed::{TypedFeed, TypedSpeech};

const DIAGNOSTICS_CAPACITY: usize = 64;

struct Args {
    settings_path: PathBuf,
    story_path: Option<PathBuf>,
    gestures: bool,
    timeout_secs: Option<u64>,
    write_settings: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut settings_path: Option<PathBuf> = None;
    let mut story_path: Option<PathBuf> = None;
    let mut gestures = false;
    let mut timeout_secs: Option<u64> = None;
    let mut write_settings = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --settings".into());
                };
                settings_path = Some(PathBuf::from(v));
            }
            "--story" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --story".into());
                };
                story_path = Some(PathBuf::from(v));
            }
            "--timeout" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --timeout".into());
                };
                timeout_secs = Some(
                    v.parse::<u64>()
                        .map_err(|_| "invalid value for --timeout".to_string())?,
                );
            }
            "--gestures" => gestures = true,
            "--write-settings" => write_settings = true,
            "--help" | "-h" => {
                println!(
                    "Usage: reverie [--story <file.json>] [--settings <file.json>] \\
  [--timeout <secs>] [--gestures] [--write-settings]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(Args {
        settings_path: settings_path.unwrap_or_else(default_settings_path),
        story_path,
        gestures,
        timeout_secs,
        write_settings,
    })
}

/// Command-line flags win over the settings file.
fn effective_settings(args: &Args) -> AppSettings {
    let mut settings = load_settings(&args.settings_path);
    if args.gestures {
        settings.gestures_enabled = true;
    }
    if let Some(secs) = args.timeout_secs {
        settings.prompt_timeout_secs = secs;
    }
    settings.normalize();
    settings
}

/// The prompt currently on screen, so `quit` can interrupt its wait.
#[derive(Clone, Default)]
struct Session {
    quit: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Interrupter>>>,
}

impl Session {
    fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
        if let Some(interrupter) = self.current.lock().as_ref() {
            interrupter.interrupt();
        }
    }

    /// Register `interrupter` and report whether the player already quit.
    fn enter(&self, interrupter: Interrupter) -> bool {
        *self.current.lock() = Some(interrupter);
        self.quit.load(Ordering::SeqCst)
    }

    fn leave(&self) {
        self.current.lock().take();
    }
}

/// Route terminal lines to the click and speech producers.
fn spawn_terminal_reader(clicks: ClickSender, speech: TypedFeed, session: Session) -> Result<()> {
    std::thread::Builder::new()
        .name("terminal-input".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("q") {
                    break;
                }
                match line.parse::<usize>() {
                    Ok(n) if n >= 1 => {
                        clicks.click(n - 1);
                    }
                    _ => {
                        if !speech.say(line) {
                            debug!("typed speech ignored, no prompt listening");
                        }
                    }
                }
            }
            session.request_quit();
        })
        .context("spawning terminal reader")?;
    Ok(())
}

fn start_camera(settings: &AppSettings) -> Result<MotionDetectorCaptureThread> {
    let camera = SyntheticCamera::new(ResolutionList::new([
        FrameSize::new(320, 240),
        FrameSize::new(160, 120),
    ]))
    .with_fps(30.0)
    .with_sweep(150);

    let mut capture = MotionDetectorCaptureThread::new(
        camera,
        CaptureConfig {
            requested_size: FrameSize::new(160, 120),
            ..CaptureConfig::default()
        },
        MotionConfig::default(),
    );
    capture.set_settings(settings.capture_settings())?;
    let size = capture.start()?;
    capture.start_capture()?;
    info!(%size, "synthetic camera running");
    Ok(capture)
}

fn stop_camera(mut capture: MotionDetectorCaptureThread) {
    if let Err(e) = capture.interrupt() {
        warn!("camera interrupt failed: {e}");
        return;
    }
    match capture.join() {
        Ok(report) => info!(
            frames = report.frames,
            sessions = report.sessions,
            "synthetic camera stopped"
        ),
        Err(e) => error!("camera stopped with error: {e}"),
    }
}

struct Producers {
    clicks: ClickChannel,
    speech: RecognizerHandle,
    camera: Option<MotionDetectorCaptureThread>,
}

fn play(
    story: &Story,
    settings: &AppSettings,
    producers: &Producers,
    diagnostics: &broadcast::Sender<InputDiagnostic>,
    session: &Session,
) -> Result<()> {
    println!("\n== {} ==", story.title);
    let mut scene_id = story.start.clone();

    loop {
        let scene = story.scene(&scene_id)?;
        println!("\n{}", scene.text);
        if scene.is_ending() {
            println!("\n-- The End --");
            return Ok(());
        }

        let choices = scene.choices(&settings.locale)?;
        for (i, choice) in choices.iter().enumerate() {
            println!("  {}. {}", i + 1, choice.text());
        }

        let mut methods = InputMethods::default()
            .with(producers.clicks.input_method())
            .with(SpeechRecognitionInputMethod::new(
                producers.speech.clone(),
                settings.speech_config(),
            ));
        if let Some(camera) = &producers.camera {
            methods = methods.with(camera.gesture_input(settings.gesture_config()));
        }

        let prompt = Prompt::with_diagnostics(choices, methods, diagnostics.clone());
        if session.enter(prompt.interrupter()) {
            return Ok(());
        }
        let outcome = prompt.decide(settings.prompt_timeout());
        session.leave();

        match outcome {
            Ok(resolution) => {
                println!("> {} ({})", resolution.choice.text(), resolution.source);
                scene_id = scene.choices[resolution.index].next.clone();
            }
            Err(Cancelled::TimedOut) => {
                println!("(time passes...)");
                if let Some(next) = &scene.on_timeout {
                    scene_id = next.clone();
                }
            }
            Err(Cancelled::Interrupted) | Err(Cancelled::Dismissed) => return Ok(()),
        }
    }
}

async fn log_diagnostics(mut rx: broadcast::Receiver<InputDiagnostic>) {
    loop {
        match rx.recv().await {
            Ok(InputDiagnostic::AudioSignalProblem { problem, .. }) => {
                println!("(speech problem: {problem:?})");
            }
            Ok(diagnostic) => match serde_json::to_string(&diagnostic) {
                Ok(json) => debug!(target: "reverie::diagnostics", "{json}"),
                Err(e) => warn!("unserializable diagnostic: {e}"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "diagnostics log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reverie=info")),
        )
        .init();

    let args = parse_args().map_err(anyhow::Error::msg)?;
    let settings = effective_settings(&args);
    if args.write_settings {
        save_settings(&args.settings_path, &settings)
            .with_context(|| format!("writing {}", args.settings_path.display()))?;
        info!(path = %args.settings_path.display(), "settings saved");
    }

    let story = match args
        .story_path
        .clone()
        .or_else(|| settings.story_path.as_ref().map(PathBuf::from))
    {
        Some(path) => Story::load(&path)?,
        None => Story::demo()?,
    };
    info!(title = %story.title, scenes = story.scenes.len(), "Reverie starting");

    let clicks = ClickChannel::new();
    let typed = TypedSpeech::new();
    let session = Session::default();
    spawn_terminal_reader(clicks.sender(), typed.feed(), session.clone())?;

    let camera = if settings.gestures_enabled {
        Some(start_camera(&settings)?)
    } else {
        None
    };
    let producers = Producers {
        clicks,
        speech: RecognizerHandle::new(typed),
        camera,
    };

    let (diagnostics, diagnostics_rx) = broadcast::channel(DIAGNOSTICS_CAPACITY);
    let logger = tokio::spawn(log_diagnostics(diagnostics_rx));

    let outcome = tokio::task::spawn_blocking(move || {
        let result = play(&story, &settings, &producers, &diagnostics, &session);
        if let Some(camera) = producers.camera {
            stop_camera(camera);
        }
        result
    })
    .await
    .context("story loop panicked")?;

    // The sender was dropped with the story loop, so the logger drains and ends.
    let _ = logger.await;
    outcome?;
    info!("Reverie finished");
    Ok(())
}

//! `CaptureThread` — dedicated loop thread owning a camera-like device.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureThread::new(device, sink, config)           state = Created
//!     └─► start()          → loop spawned, device open  state = Started
//!         └─► start_capture() → frames flow to the sink state = Capturing
//!             └─► stop_capture() → idle, device open    state = Started
//!         └─► interrupt()  → loop told to exit          state = Interrupted
//!             └─► join()   → loop exited, released     state = Joined
//! ```
//!
//! ## Threading
//!
//! The device is moved into the loop thread and opened, read and released
//! there only. `start()` blocks on a sync oneshot until the loop reports the
//! open result, the same way the engine start handshake works. Control
//! messages travel over a crossbeam channel; reads use a bounded timeout so
//! an interrupt is observed within one `read_timeout`.

pub mod device;
pub mod motion;
pub mod sink;
pub mod synthetic;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, ReverieError},
    events::MotionEvent,
    input::gesture::{GestureConfig, GestureInputMethod},
};

use device::{CaptureDevice, FrameSize, OpenDevice};
use motion::{MotionConfig, MotionDetector};
use sink::{FrameContext, FrameSink};

/// Which way frames face when they reach the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Viewpoint {
    /// As the camera sees the scene.
    Camera,
    /// Flipped left/right so the player sees themselves as in a mirror.
    #[default]
    Mirrored,
}

/// Per-session settings, read once when capture starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    /// Motion sensitivity in [0.0, 1.0]. Default: 0.5.
    pub sensitivity: f32,
    /// Default: `Viewpoint::Mirrored`.
    pub viewpoint: Viewpoint,
}

impl CaptureSettings {
    fn normalized(mut self) -> Self {
        self.sensitivity = if self.sensitivity.is_finite() {
            self.sensitivity.clamp(0.0, 1.0)
        } else {
            0.5
        };
        self
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            viewpoint: Viewpoint::Mirrored,
        }
    }
}

/// Configuration for `CaptureThread`.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Size asked of the device at open. Default: 640x480.
    pub requested_size: FrameSize,
    /// Upper bound on one blocking read, and so on interrupt latency.
    /// Default: 50 ms.
    pub read_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            requested_size: FrameSize::new(640, 480),
            read_timeout: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Created,
    Started,
    Capturing,
    Interrupted,
    Joined,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Created => "created",
            CaptureState::Started => "started",
            CaptureState::Capturing => "capturing",
            CaptureState::Interrupted => "interrupted",
            CaptureState::Joined => "joined",
        };
        f.write_str(name)
    }
}

/// What the loop did before it exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub frames: u64,
    pub sessions: u32,
}

enum Command {
    StartCapture(CaptureSettings),
    StopCapture,
    Interrupt,
}

pub struct CaptureThread {
    config: CaptureConfig,
    settings: CaptureSettings,
    state: CaptureState,
    parts: Option<(Box<dyn CaptureDevice>, Box<dyn FrameSink>)>,
    cmd_tx: Option<Sender<Command>>,
    interrupted: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<CaptureReport>>>,
    frame_size: Option<FrameSize>,
}

impl CaptureThread {
    pub fn new(device: impl CaptureDevice, sink: impl FrameSink, config: CaptureConfig) -> Self {
        Self {
            config,
            settings: CaptureSettings::default(),
            state: CaptureState::Created,
            parts: Some((Box::new(device), Box::new(sink))),
            cmd_tx: None,
            interrupted: Arc::new(AtomicBool::new(false)),
            handle: None,
            frame_size: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn settings(&self) -> CaptureSettings {
        self.settings
    }

    /// Size the device actually opened at, once started.
    pub fn frame_size(&self) -> Option<FrameSize> {
        self.frame_size
    }

    /// Replace the settings for the next capture session.
    ///
    /// # Errors
    /// - `ReverieError::SettingsLocked` while capturing.
    /// - `ReverieError::InvalidCaptureState` after interrupt.
    pub fn set_settings(&mut self, settings: CaptureSettings) -> Result<()> {
        match self.state {
            CaptureState::Capturing => Err(ReverieError::SettingsLocked),
            CaptureState::Interrupted | CaptureState::Joined => {
                Err(self.invalid("change settings"))
            }
            CaptureState::Created | CaptureState::Started => {
                self.settings = settings.normalized();
                Ok(())
            }
        }
    }

    /// Spawn the loop thread and open the device on it.
    ///
    /// Blocks until the device is open (or failed to open).
    ///
    /// # Errors
    /// - `ReverieError::InvalidCaptureState` unless freshly created.
    /// - `ReverieError::DeviceFault` if the device cannot be opened; the
    ///   thread has already exited and the device is released.
    pub fn start(&mut self) -> Result<FrameSize> {
        if self.state != CaptureState::Created {
            return Err(self.invalid("start"));
        }
        let Some((device, sink)) = self.parts.take() else {
            return Err(self.invalid("start"));
        };

        let (cmd_tx, cmd_rx) = unbounded();
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<FrameSize>>();
        let interrupted = Arc::clone(&self.interrupted);
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || {
                // ── Open device (on THIS thread, never anywhere else) ──
                let device = match OpenDevice::open(device, config.requested_size) {
                    Ok(d) => {
                        let _ = open_tx.send(Ok(d.size()));
                        d
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        // Fault already delivered to start().
                        return Ok(CaptureReport::default());
                    }
                };

                run_loop(LoopContext {
                    device,
                    sink,
                    cmd_rx,
                    interrupted,
                    read_timeout: config.read_timeout,
                })
            })?;

        match open_rx.recv() {
            Ok(Ok(size)) => {
                info!(%size, requested = %self.config.requested_size, "capture thread started");
                self.cmd_tx = Some(cmd_tx);
                self.handle = Some(handle);
                self.frame_size = Some(size);
                self.state = CaptureState::Started;
                Ok(size)
            }
            Ok(Err(e)) => {
                error!("capture device failed to open: {e}");
                let _ = handle.join();
                self.state = CaptureState::Joined;
                Err(e)
            }
            Err(_) => {
                // Loop died before reporting, so it panicked.
                let _ = handle.join();
                self.state = CaptureState::Joined;
                Err(ReverieError::CaptureLoopPanicked)
            }
        }
    }

    /// Begin forwarding frames to the sink with the current settings.
    /// No-op while already capturing.
    pub fn start_capture(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Capturing => Ok(()),
            CaptureState::Started => {
                self.send(Command::StartCapture(self.settings))?;
                self.state = CaptureState::Capturing;
                debug!(settings = ?self.settings, "capture enabled");
                Ok(())
            }
            _ => Err(self.invalid("start capture")),
        }
    }

    /// Stop forwarding frames; the device stays open. No-op while idle.
    pub fn stop_capture(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Started => Ok(()),
            CaptureState::Capturing => {
                self.send(Command::StopCapture)?;
                self.state = CaptureState::Started;
                debug!("capture disabled");
                Ok(())
            }
            _ => Err(self.invalid("stop capture")),
        }
    }

    /// First half of shutdown: tell the loop to exit. Idempotent.
    pub fn interrupt(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Started | CaptureState::Capturing => {
                self.interrupted.store(true, Ordering::Release);
                if let Some(tx) = &self.cmd_tx {
                    // The loop may already be gone after a device fault.
                    let _ = tx.send(Command::Interrupt);
                }
                self.state = CaptureState::Interrupted;
                info!("capture thread interrupted");
                Ok(())
            }
            CaptureState::Interrupted | CaptureState::Joined => Ok(()),
            CaptureState::Created => Err(self.invalid("interrupt")),
        }
    }

    /// Second half of shutdown: wait for the loop to exit and release the
    /// device.
    ///
    /// # Errors
    /// - `ReverieError::InvalidCaptureState` unless interrupted first.
    /// - `ReverieError::DeviceFault` if the last session ended on a device
    ///   error.
    /// - `ReverieError::CaptureLoopPanicked` if the loop panicked.
    pub fn join(&mut self) -> Result<CaptureReport> {
        if self.state != CaptureState::Interrupted {
            return Err(self.invalid("join"));
        }
        self.cmd_tx = None;
        self.state = CaptureState::Joined;

        let Some(handle) = self.handle.take() else {
            return Ok(CaptureReport::default());
        };
        let report = handle
            .join()
            .map_err(|_| ReverieError::CaptureLoopPanicked)??;
        info!(frames = report.frames, sessions = report.sessions, "capture thread joined");
        Ok(report)
    }

    fn send(&self, cmd: Command) -> Result<()> {
        let tx = self
            .cmd_tx
            .as_ref()
            .ok_or_else(|| self.invalid("send capture command"))?;
        tx.send(cmd).map_err(|_| {
            ReverieError::DeviceFault("capture loop exited; join it for the cause".into())
        })
    }

    fn invalid(&self, op: &'static str) -> ReverieError {
        ReverieError::InvalidCaptureState {
            op,
            state: self.state,
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        let _ = self.interrupt();
        if let Err(e) = self.join() {
            warn!("capture thread ended with error during drop: {e}");
        }
    }
}

struct LoopContext {
    device: OpenDevice,
    sink: Box<dyn FrameSink>,
    cmd_rx: Receiver<Command>,
    interrupted: Arc<AtomicBool>,
    read_timeout: Duration,
}

/// Capture loop body. Returns when interrupted, when the control channel
/// closes, or on a device fault. The device is dropped (released) here.
fn run_loop(mut ctx: LoopContext) -> Result<CaptureReport> {
    let size = ctx.device.size();
    let mut report = CaptureReport::default();
    let mut session: Option<CaptureSettings> = None;
    let mut fault: Option<ReverieError> = None;

    loop {
        // ── 0. Check interrupt flag ───────────────────────────────────────
        if ctx.interrupted.load(Ordering::Acquire) {
            break;
        }

        // ── 1. Control messages (block only while idle) ───────────────────
        let cmd = if session.is_some() {
            match ctx.cmd_rx.try_recv() {
                Ok(cmd) => Some(cmd),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match ctx.cmd_rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };

        if let Some(cmd) = cmd {
            match cmd {
                Command::StartCapture(settings) => {
                    if session.is_none() {
                        report.sessions += 1;
                        ctx.sink.on_capture_started(size);
                        info!(
                            sensitivity = settings.sensitivity,
                            viewpoint = ?settings.viewpoint,
                            "capture session started"
                        );
                        session = Some(settings);
                    }
                }
                Command::StopCapture => {
                    if session.take().is_some() {
                        ctx.sink.on_capture_stopped();
                        info!(frames = report.frames, "capture session stopped");
                    }
                }
                Command::Interrupt => break,
            }
            continue;
        }

        let Some(settings) = session else { continue };

        // ── 2. Pull a frame (bounded) ─────────────────────────────────────
        match ctx.device.read_frame(ctx.read_timeout) {
            Ok(Some(mut frame)) => {
                if settings.viewpoint == Viewpoint::Mirrored {
                    frame.mirror_horizontal();
                }
                let frame_ctx = FrameContext {
                    seq: report.frames,
                    sensitivity: settings.sensitivity,
                    viewpoint: settings.viewpoint,
                };
                ctx.sink.on_frame(&frame, &frame_ctx);
                report.frames += 1;
            }
            Ok(None) => {}
            Err(e) => {
                error!("capture device fault: {e}");
                fault = Some(e);
                break;
            }
        }
    }

    if session.is_some() {
        ctx.sink.on_capture_stopped();
    }

    // Device released here, on the loop thread.
    drop(ctx.device);
    debug!("capture loop exited");

    match fault {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

/// A capture thread wired to a [`MotionDetector`] sink.
pub struct MotionDetectorCaptureThread {
    inner: CaptureThread,
    events: Receiver<MotionEvent>,
}

impl MotionDetectorCaptureThread {
    pub fn new(device: impl CaptureDevice, config: CaptureConfig, motion: MotionConfig) -> Self {
        let (detector, events) = MotionDetector::new(motion);
        Self {
            inner: CaptureThread::new(device, detector, config),
            events,
        }
    }

    /// Receiver for detector output. Clones share one queue.
    pub fn motion_events(&self) -> Receiver<MotionEvent> {
        self.events.clone()
    }

    /// A gesture producer reading from this thread's detector.
    pub fn gesture_input(&self, config: GestureConfig) -> GestureInputMethod {
        GestureInputMethod::new(self.motion_events(), config)
    }
}

impl Deref for MotionDetectorCaptureThread {
    type Target = CaptureThread;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for MotionDetectorCaptureThread {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reverie_core::capture::{
    device::{Frame, FrameSize, ResolutionList},
    sink::{FrameContext, FrameSink},
    synthetic::SyntheticCamera,
};
use reverie_core::{
    CaptureConfig, CaptureSettings, CaptureState, CaptureThread, ReverieError, Viewpoint,
};

/// Test double that records what reached the sink instead of rendering it.
#[derive(Clone, Default)]
struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
}

#[derive(Default)]
struct SinkLog {
    frames: Vec<(u64, FrameSize, f32, Viewpoint)>,
    first_row: Vec<Vec<u8>>,
    session_starts: Vec<usize>,
    started: u32,
    stopped: u32,
}

impl FrameSink for RecordingSink {
    fn on_frame(&mut self, frame: &Frame, ctx: &FrameContext) {
        let mut log = self.log.lock();
        log.frames
            .push((ctx.seq, frame.size, ctx.sensitivity, ctx.viewpoint));
        log.first_row
            .push(frame.luma[..frame.size.width as usize].to_vec());
    }

    fn on_capture_started(&mut self, _size: FrameSize) {
        let mut log = self.log.lock();
        log.started += 1;
        let at = log.frames.len();
        log.session_starts.push(at);
    }

    fn on_capture_stopped(&mut self) {
        self.log.lock().stopped += 1;
    }
}

fn supported() -> ResolutionList {
    ResolutionList::new([
        FrameSize::new(1920, 1080),
        FrameSize::new(1280, 960),
        FrameSize::new(64, 48),
    ])
}

fn config() -> CaptureConfig {
    CaptureConfig {
        requested_size: FrameSize::new(80, 60),
        read_timeout: Duration::from_millis(20),
    }
}

#[test]
fn full_lifecycle_releases_device_once_on_loop_thread() {
    let cam = SyntheticCamera::new(supported()).with_fps(120.0);
    let probe = cam.probe();
    let sink = RecordingSink::default();
    let log = Arc::clone(&sink.log);

    let mut capture = CaptureThread::new(cam, sink, config());
    assert_eq!(capture.state(), CaptureState::Created);

    let size = capture.start().expect("start");
    assert_eq!(size, FrameSize::new(64, 48));
    assert_eq!(capture.state(), CaptureState::Started);

    capture.start_capture().expect("start capture");
    thread::sleep(Duration::from_millis(150));
    capture.stop_capture().expect("stop capture");
    assert_eq!(capture.state(), CaptureState::Started);

    capture.interrupt().expect("interrupt");
    let started = Instant::now();
    let report = capture.join().expect("join");
    assert!(started.elapsed() < Duration::from_secs(2), "join hung");
    assert_eq!(capture.state(), CaptureState::Joined);

    let frames_at_join = probe.frames.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(60));

    assert_eq!(probe.opens.load(Ordering::SeqCst), 1);
    assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    assert!(!probe.used_after_release.load(Ordering::SeqCst));
    assert_eq!(probe.thread_count(), 1, "device touched from several threads");
    assert_eq!(probe.frames.load(Ordering::SeqCst), frames_at_join);

    let log = log.lock();
    assert!(report.frames > 0, "no frames captured");
    assert_eq!(report.frames as usize, log.frames.len());
    assert_eq!(report.sessions, 1);
    assert_eq!((log.started, log.stopped), (1, 1));
    assert!(log
        .frames
        .iter()
        .enumerate()
        .all(|(i, f)| f.0 == i as u64 && f.1 == size));
}

#[test]
fn interrupt_while_capturing_stops_promptly() {
    let cam = SyntheticCamera::new(supported()).with_fps(30.0);
    let probe = cam.probe();
    let mut capture = CaptureThread::new(cam, RecordingSink::default(), config());

    capture.start().expect("start");
    capture.start_capture().expect("start capture");
    thread::sleep(Duration::from_millis(80));

    let started = Instant::now();
    capture.interrupt().expect("interrupt");
    capture.join().expect("join");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    assert!(capture.start_capture().is_err());
}

#[test]
fn settings_apply_per_session_and_mirror_frames() {
    let cam = SyntheticCamera::new(ResolutionList::new([FrameSize::new(32, 4)]))
        .with_fps(200.0)
        .with_noise(0)
        .with_path(vec![0.1]);
    let sink = RecordingSink::default();
    let log = Arc::clone(&sink.log);
    let mut capture = CaptureThread::new(cam, sink, config());

    capture
        .set_settings(CaptureSettings {
            sensitivity: 0.9,
            viewpoint: Viewpoint::Camera,
        })
        .expect("settings");
    capture.start().expect("start");
    capture.start_capture().expect("capture as seen by camera");
    wait_for_frames(&log, 1);
    capture.stop_capture().expect("stop");

    capture
        .set_settings(CaptureSettings {
            sensitivity: 0.2,
            viewpoint: Viewpoint::Mirrored,
        })
        .expect("settings between sessions");
    capture.start_capture().expect("capture mirrored");
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        {
            let log = log.lock();
            if log.session_starts.len() == 2 && log.frames.len() > log.session_starts[1] {
                break;
            }
        }
        assert!(Instant::now() < deadline, "second session produced no frames");
        thread::sleep(Duration::from_millis(2));
    }
    capture.interrupt().expect("interrupt");
    let report = capture.join().expect("join");
    assert_eq!(report.sessions, 2);

    let log = log.lock();
    let before = log.session_starts[1];
    let (_, _, s0, v0) = log.frames[0];
    let (_, _, s1, v1) = log.frames[before];
    assert_eq!((s0, v0), (0.9, Viewpoint::Camera));
    assert_eq!((s1, v1), (0.2, Viewpoint::Mirrored));

    // Block sits near the left edge for the camera, right edge when mirrored.
    let bright = |row: &[u8]| row.iter().position(|&p| p > 128).expect("block visible");
    assert!(bright(&log.first_row[0]) < 8);
    assert!(bright(&log.first_row[before]) > 24);
}

#[test]
fn device_fault_ends_session_and_is_reported_by_join() {
    let cam = SyntheticCamera::new(supported())
        .with_fps(200.0)
        .failing_after(3);
    let probe = cam.probe();
    let sink = RecordingSink::default();
    let log = Arc::clone(&sink.log);
    let mut capture = CaptureThread::new(cam, sink, config());

    capture.start().expect("start");
    capture.start_capture().expect("start capture");

    let deadline = Instant::now() + Duration::from_secs(2);
    while probe.releases.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "device never released after fault");
        thread::sleep(Duration::from_millis(5));
    }

    capture.interrupt().expect("interrupt after fault");
    assert!(matches!(capture.join(), Err(ReverieError::DeviceFault(_))));
    assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    assert_eq!(log.lock().frames.len(), 3);
    assert_eq!(log.lock().stopped, 1);
}

#[test]
fn dropping_a_running_thread_releases_the_device() {
    let cam = SyntheticCamera::new(supported()).with_fps(120.0);
    let probe = cam.probe();
    {
        let mut capture = CaptureThread::new(cam, RecordingSink::default(), config());
        capture.start().expect("start");
        capture.start_capture().expect("start capture");
        thread::sleep(Duration::from_millis(30));
    }
    assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    assert_eq!(probe.thread_count(), 1);
}

fn wait_for_frames(log: &Arc<Mutex<SinkLog>>, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while log.lock().frames.len() < n {
        assert!(Instant::now() < deadline, "timed out waiting for {n} frames");
        thread::sleep(Duration::from_millis(2));
    }
}

use std::time::Duration;

use reverie_core::capture::{
    device::{FrameSize, ResolutionList},
    motion::MotionConfig,
    synthetic::SyntheticCamera,
};
use reverie_core::{
    CaptureConfig, CaptureSettings, Choices, GestureConfig, InputKind, InputMethods,
    MotionDetectorCaptureThread, Prompt, Viewpoint,
};

fn camera(path: Vec<f32>) -> SyntheticCamera {
    SyntheticCamera::new(ResolutionList::new([FrameSize::new(64, 48)]))
        .with_fps(120.0)
        .with_noise(4)
        .with_path(path)
}

/// Block jitters inside one region so consecutive frames show motion there.
fn jitter_around(centre: f32) -> Vec<f32> {
    vec![centre - 0.04, centre + 0.04]
}

fn run(path: Vec<f32>, viewpoint: Viewpoint) -> usize {
    let mut capture = MotionDetectorCaptureThread::new(
        camera(path),
        CaptureConfig {
            requested_size: FrameSize::new(64, 48),
            read_timeout: Duration::from_millis(20),
        },
        MotionConfig::default(),
    );
    capture
        .set_settings(CaptureSettings {
            sensitivity: 0.6,
            viewpoint,
        })
        .expect("settings");
    capture.start().expect("start");

    let choices = Choices::decide(["Left", "Middle", "Right"], "en-US").expect("valid choices");
    let prompt = Prompt::new(
        choices,
        InputMethods::default().with(capture.gesture_input(GestureConfig { dwell_events: 4 })),
    );
    prompt.show().expect("show");
    capture.start_capture().expect("start capture");

    let resolution = prompt
        .wait(Some(Duration::from_secs(3)))
        .expect("gesture should resolve");
    prompt.dismiss();

    capture.stop_capture().expect("stop capture");
    capture.interrupt().expect("interrupt");
    capture.join().expect("join");

    assert_eq!(resolution.source, InputKind::Gesture);
    resolution.index
}

#[test]
fn motion_on_the_right_selects_last_choice() {
    assert_eq!(run(jitter_around(0.85), Viewpoint::Camera), 2);
}

#[test]
fn mirrored_viewpoint_flips_selection() {
    assert_eq!(run(jitter_around(0.85), Viewpoint::Mirrored), 0);
}

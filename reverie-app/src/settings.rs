//! Persistent host settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reverie_core::{CaptureSettings, GestureConfig, SpeechConfig, Viewpoint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub locale: String,
    /// Seconds before an unanswered prompt times out. 0 waits forever.
    pub prompt_timeout_secs: u64,
    pub decide_min_confidence: f32,
    pub confirm_min_confidence: f32,
    pub fuzzy_threshold: f32,
    pub gestures_enabled: bool,
    pub motion_sensitivity: f32,
    pub viewpoint: Viewpoint,
    pub gesture_dwell_events: u32,
    pub story_path: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            locale: "en-US".into(),
            prompt_timeout_secs: 60,
            decide_min_confidence: 0.5,
            confirm_min_confidence: 0.7,
            fuzzy_threshold: 0.6,
            gestures_enabled: false,
            motion_sensitivity: 0.5,
            viewpoint: Viewpoint::Mirrored,
            gesture_dwell_events: 12,
            story_path: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.locale = normalize_locale(&self.locale);
        self.prompt_timeout_secs = self.prompt_timeout_secs.min(3600);
        self.decide_min_confidence = clamp_unit(self.decide_min_confidence, 0.5);
        self.confirm_min_confidence = clamp_unit(self.confirm_min_confidence, 0.7);
        self.fuzzy_threshold = clamp_unit(self.fuzzy_threshold, 0.6);
        self.motion_sensitivity = clamp_unit(self.motion_sensitivity, 0.5);
        self.gesture_dwell_events = self.gesture_dwell_events.clamp(1, 120);
        self.story_path = self
            .story_path
            .as_ref()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
    }

    pub fn prompt_timeout(&self) -> Option<Duration> {
        (self.prompt_timeout_secs > 0).then(|| Duration::from_secs(self.prompt_timeout_secs))
    }

    pub fn speech_config(&self) -> SpeechConfig {
        SpeechConfig {
            decide_min_confidence: self.decide_min_confidence,
            confirm_min_confidence: self.confirm_min_confidence,
            fuzzy_threshold: self.fuzzy_threshold,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            sensitivity: self.motion_sensitivity,
            viewpoint: self.viewpoint,
        }
    }

    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            dwell_events: self.gesture_dwell_events,
        }
    }
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn normalize_locale(raw: &str) -> String {
    let trimmed = raw.trim().replace('_', "-");
    if trimmed.is_empty() {
        "en-US".into()
    } else {
        trimmed
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Reverie")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("reverie")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

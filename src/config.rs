use std::{fmt, time::Duration};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// What happens when a cycle comes back distracted.
///
/// Serialized with the names the classifier backend expects.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StimulusKind {
    #[default]
    #[serde(rename = "computer_beep")]
    LocalBeep,
    #[serde(rename = "pavlok_zap")]
    DeviceZap,
    #[serde(rename = "pavlok_beep")]
    DeviceBeep,
    #[serde(rename = "pavlok_vibe")]
    DeviceVibrate,
}

impl StimulusKind {
    pub fn requires_device(self) -> bool {
        !matches!(self, StimulusKind::LocalBeep)
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            StimulusKind::LocalBeep => "computer_beep",
            StimulusKind::DeviceZap => "pavlok_zap",
            StimulusKind::DeviceBeep => "pavlok_beep",
            StimulusKind::DeviceVibrate => "pavlok_vibe",
        }
    }
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Per-session choices made by the user before monitoring starts.
/// Immutable once the session is running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    focus_description: String,
    stimulus: StimulusKind,
    device_token: Option<String>,
}

impl SessionConfig {
    pub fn new(
        focus_description: impl Into<String>,
        stimulus: StimulusKind,
        device_token: Option<String>,
    ) -> Result<Self> {
        let focus_description = focus_description.into();
        if focus_description.trim().is_empty() {
            return Err(MonitorError::InvalidConfig(
                "focus description must not be empty".into(),
            ));
        }

        let device_token = if stimulus.requires_device() {
            match device_token.map(|t| t.trim().to_string()) {
                Some(token) if !token.is_empty() => Some(token),
                _ => return Err(MonitorError::MissingDeviceToken(stimulus)),
            }
        } else {
            None
        };

        Ok(Self {
            focus_description,
            stimulus,
            device_token,
        })
    }

    pub fn focus_description(&self) -> &str {
        &self.focus_description
    }

    pub fn stimulus(&self) -> StimulusKind {
        self.stimulus
    }

    pub fn device_token(&self) -> Option<&str> {
        self.device_token.as_deref()
    }
}

/// Cadences and limits for a monitoring session.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub api_base_url: String,

    /// Sampling tick; also the upper bound on a single capture.
    pub sample_interval: Duration,
    /// Focus-duration display tick
    pub display_interval: Duration,

    pub acknowledgment_duration: Duration,
    pub tone_interval: Duration,
    pub tone_train_duration: Duration,

    /// No cycle starts this soon after a stimulus. Zero disables the cooldown.
    pub stimulus_cooldown: Duration,

    pub request_timeout: Duration,

    /// Edge of the square raster frames are downsampled into.
    pub frame_size: u32,
    pub history_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            sample_interval: Duration::from_millis(500),
            display_interval: Duration::from_secs(1),
            acknowledgment_duration: Duration::from_millis(750),
            tone_interval: Duration::from_millis(500),
            tone_train_duration: Duration::from_millis(750),
            stimulus_cooldown: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            frame_size: 512,
            history_capacity: 10,
        }
    }
}

impl MonitorSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(url) = lookup("SCREENSHOCK_API_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                settings.api_base_url = url.to_string();
            }
        }

        if let Some(ms) = parse_millis(&lookup, "SCREENSHOCK_SAMPLE_MS") {
            if ms.is_zero() {
                warn!("SCREENSHOCK_SAMPLE_MS must be positive; keeping default");
            } else {
                settings.sample_interval = ms;
            }
        }

        if let Some(ms) = parse_millis(&lookup, "SCREENSHOCK_COOLDOWN_MS") {
            settings.stimulus_cooldown = ms;
        }

        let debug_mode = lookup("SCREENSHOCK_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            settings.stimulus_cooldown = Duration::ZERO;
        }

        settings
    }
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(err) => {
            warn!("ignoring {key}={raw:?}: {err}");
            None
        }
    }
}

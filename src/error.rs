use thiserror::Error;

use crate::config::StimulusKind;

/// Failures surfaced by the monitoring pipeline.
///
/// Capture errors end the session; a failed submission only costs the
/// current cycle and is retried by the next natural tick.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("screen capture permission denied")]
    PermissionDenied,

    #[error("screen capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("decision submission failed: {0}")]
    SubmissionFailed(String),

    #[error("stimulus `{0}` requires a device token")]
    MissingDeviceToken(StimulusKind),

    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    #[error("session already started")]
    AlreadyStarted,
}

impl MonitorError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MonitorError::PermissionDenied | MonitorError::CaptureUnavailable(_)
        )
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::SubmissionFailed(err.to_string())
    }
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

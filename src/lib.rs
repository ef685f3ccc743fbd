pub mod audio;
pub mod capture;
pub mod config;
pub mod decision;
pub mod error;
pub mod history;
pub mod monitor;
pub mod scheduler;
pub mod settings;
pub mod stimulus;
pub mod utils;

use std::{future::Future, pin::Pin};

pub use audio::{ToneEngineHandle, TonePlayer};
pub use capture::{CaptureBackend, CaptureStream, Frame, FrameSource, GrabError, StreamFrameSource};
pub use config::{MonitorSettings, SessionConfig, StimulusKind};
pub use decision::{Decision, DecisionClient, HttpDecisionClient};
pub use error::{MonitorError, Result};
pub use history::{CycleResult, HistoryLog};
pub use monitor::{format_duration, LoopStatus, Monitor, MonitorDeps, MonitorSnapshot};
pub use scheduler::{Scheduler, TaskHandle, TokioScheduler};
pub use settings::SettingsStore;
pub use stimulus::{StimulusDispatcher, StimulusTiming};
pub use utils::init_logging;

/// Boxed future returned by the capability traits so they stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

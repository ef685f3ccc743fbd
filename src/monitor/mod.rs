pub mod controller;
mod cycle;
pub mod state;

pub use controller::{Monitor, MonitorDeps, MonitorSnapshot};
pub use state::{format_duration, LoopState, LoopStatus};

//! Logging setup plus per-module switchable log macros.
//!
//! Modules on the sampling hot path log every cycle. Each of them defines
//! `const ENABLE_LOGS: bool` and uses the macros below, so a noisy module can
//! be silenced without touching the global filter:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info};
//!
//! log_info!("cycle finished in {}ms", elapsed_ms);
//! ```

use log::LevelFilter;

/// Install the `env_logger` backend. `RUST_LOG` overrides the `info` default.
/// Later calls are no-ops, so tests and embedders can both call it.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .try_init();
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

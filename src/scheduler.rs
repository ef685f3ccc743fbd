//! Timer capability used by the monitor and the stimulus dispatcher.
//!
//! Everything time-driven goes through [`Scheduler`] so that a session's
//! timers can be cancelled as a unit, and so tests can run on tokio's paused
//! clock instead of wall time.

use std::time::Duration;

use tokio::{
    runtime::Handle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

pub type PeriodicTask = Box<dyn FnMut() + Send + 'static>;
pub type OneShotTask = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Run `task` every `period`, first after one full period.
    fn every(&self, period: Duration, task: PeriodicTask) -> TaskHandle;

    /// Run `task` once after `delay`.
    fn after(&self, delay: Duration, task: OneShotTask) -> TaskHandle;
}

/// Owning handle to a scheduled task. Dropping it cancels the task.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token that cancels this task from somewhere that does not own the handle.
    pub fn canceller(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// [`Scheduler`] backed by tasks on a tokio runtime.
///
/// Holds the runtime handle, so tasks can be scheduled from threads that are
/// not part of the runtime (a UI thread calling `Monitor::resume`, say).
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, mut task: PeriodicTask) -> TaskHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        self.handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if cancelled.is_cancelled() {
                            break;
                        }
                        task();
                    }
                }
            }
        });

        TaskHandle::new(token)
    }

    fn after(&self, delay: Duration, task: OneShotTask) -> TaskHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        self.handle.spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {}
                _ = time::sleep(delay) => {
                    if !cancelled.is_cancelled() {
                        task();
                    }
                }
            }
        });

        TaskHandle::new(token)
    }
}

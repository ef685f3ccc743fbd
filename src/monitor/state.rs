use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::{task::AbortHandle, time::Instant};

use crate::scheduler::TaskHandle;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoopStatus {
    #[default]
    Initializing,
    Running,
    Paused,
    Stopped,
}

/// Everything mutable about a session, behind one lock.
///
/// Transition methods cancel whatever handles they supersede. `epoch` is
/// bumped whenever in-flight work is invalidated (pause, stop), so a cycle
/// that resolves late can tell its result no longer belongs to the session.
#[derive(Debug, Default)]
pub struct LoopState {
    status: LoopStatus,
    /// Set once `start` has claimed the session; still `Initializing` until
    /// the capture stream is granted.
    starting: bool,
    busy: bool,
    epoch: u64,
    /// Reference start of the focus timer while running.
    focus_anchor: Option<Instant>,
    /// Focus time frozen at the last pause or stop.
    elapsed_baseline: Duration,
    displayed_secs: u64,
    last_stimulus_at: Option<Instant>,
    sampling: Option<TaskHandle>,
    display: Option<TaskHandle>,
    cycle: Option<AbortHandle>,
}

impl LoopState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn displayed_secs(&self) -> u64 {
        self.displayed_secs
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match (self.status, self.focus_anchor) {
            (LoopStatus::Running, Some(anchor)) => now.saturating_duration_since(anchor),
            _ => self.elapsed_baseline,
        }
    }

    /// Recompute the displayed seconds from the reference start.
    pub fn refresh_display(&mut self, now: Instant) -> u64 {
        self.displayed_secs = self.elapsed(now).as_secs();
        self.displayed_secs
    }

    /// Claim the one start a session gets. False if another caller already
    /// claimed it or the session has moved on.
    pub fn claim_start(&mut self) -> bool {
        if self.status != LoopStatus::Initializing || self.starting {
            return false;
        }
        self.starting = true;
        true
    }

    pub fn begin_running(&mut self, now: Instant, sampling: TaskHandle, display: TaskHandle) -> bool {
        if self.status != LoopStatus::Initializing {
            return false;
        }
        self.status = LoopStatus::Running;
        self.focus_anchor = Some(now);
        self.elapsed_baseline = Duration::ZERO;
        self.displayed_secs = 0;
        self.install_ticks(sampling, display);
        true
    }

    /// Claim the busy flag for a new cycle. Returns the epoch the cycle
    /// belongs to, or `None` when the tick must be skipped.
    pub fn try_begin_cycle(&mut self, now: Instant, cooldown: Duration) -> Option<u64> {
        if self.status != LoopStatus::Running || self.busy {
            return None;
        }
        if let Some(last) = self.last_stimulus_at {
            if now.saturating_duration_since(last) < cooldown {
                return None;
            }
        }
        self.busy = true;
        Some(self.epoch)
    }

    pub fn attach_cycle(&mut self, epoch: u64, handle: AbortHandle) {
        if self.busy && epoch == self.epoch {
            if let Some(stale) = self.cycle.replace(handle) {
                stale.abort();
            }
        } else {
            handle.abort();
        }
    }

    /// Release the busy flag held by `epoch`. False when the cycle was
    /// already written off by a pause or stop.
    pub fn finish_cycle(&mut self, epoch: u64) -> bool {
        if !self.busy || epoch != self.epoch {
            return false;
        }
        self.busy = false;
        self.cycle = None;
        true
    }

    /// A positive decision restarts the focus timer from zero.
    pub fn record_stimulus(&mut self, now: Instant) {
        if self.status != LoopStatus::Running {
            return;
        }
        self.focus_anchor = Some(now);
        self.displayed_secs = 0;
        self.last_stimulus_at = Some(now);
    }

    pub fn pause(&mut self, now: Instant) -> bool {
        if self.status != LoopStatus::Running {
            return false;
        }
        self.freeze_elapsed(now);
        self.cancel_work();
        self.status = LoopStatus::Paused;
        true
    }

    /// Continue from where the pause left off: the reference start moves
    /// forward by the paused time.
    pub fn resume(&mut self, now: Instant, sampling: TaskHandle, display: TaskHandle) -> bool {
        if self.status != LoopStatus::Paused {
            return false;
        }
        self.focus_anchor = Some(now.checked_sub(self.elapsed_baseline).unwrap_or(now));
        self.status = LoopStatus::Running;
        self.install_ticks(sampling, display);
        true
    }

    /// Terminal. False if the session had already stopped.
    pub fn stop(&mut self, now: Instant) -> bool {
        match self.status {
            LoopStatus::Stopped => false,
            LoopStatus::Running => {
                self.freeze_elapsed(now);
                self.cancel_work();
                self.status = LoopStatus::Stopped;
                true
            }
            LoopStatus::Initializing | LoopStatus::Paused => {
                self.cancel_work();
                self.status = LoopStatus::Stopped;
                true
            }
        }
    }

    fn freeze_elapsed(&mut self, now: Instant) {
        self.elapsed_baseline = self.elapsed(now);
        self.displayed_secs = self.elapsed_baseline.as_secs();
        self.focus_anchor = None;
    }

    fn install_ticks(&mut self, sampling: TaskHandle, display: TaskHandle) {
        if let Some(old) = self.sampling.replace(sampling) {
            old.cancel();
        }
        if let Some(old) = self.display.replace(display) {
            old.cancel();
        }
    }

    fn cancel_work(&mut self) {
        if let Some(tick) = self.sampling.take() {
            tick.cancel();
        }
        if let Some(tick) = self.display.take() {
            tick.cancel();
        }
        if let Some(cycle) = self.cycle.take() {
            cycle.abort();
        }
        self.busy = false;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

/// `m:ss`, the way the focus timer is shown.
pub fn format_duration(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn handle() -> (TaskHandle, CancellationToken) {
        let token = CancellationToken::new();
        (TaskHandle::new(token.clone()), token)
    }

    fn running(now: Instant) -> (LoopState, CancellationToken, CancellationToken) {
        let mut state = LoopState::new();
        let (sampling, s) = handle();
        let (display, d) = handle();
        assert!(state.begin_running(now, sampling, display));
        (state, s, d)
    }

    #[test]
    fn new_state_is_initializing() {
        assert_eq!(LoopState::new().status(), LoopStatus::Initializing);
        assert_eq!(LoopStatus::default(), LoopStatus::Initializing);
    }

    #[test]
    fn start_can_be_claimed_once() {
        let mut state = LoopState::new();
        assert!(state.claim_start());
        assert!(!state.claim_start());
        assert_eq!(state.status(), LoopStatus::Initializing);

        let mut stopped = LoopState::new();
        stopped.stop(Instant::now());
        assert!(!stopped.claim_start());
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3600), "60:00");
    }

    #[test]
    fn busy_flag_blocks_second_cycle() {
        let now = Instant::now();
        let (mut state, _, _) = running(now);

        let epoch = state.try_begin_cycle(now, Duration::ZERO).unwrap();
        assert!(state.try_begin_cycle(now, Duration::ZERO).is_none());
        assert!(state.finish_cycle(epoch));
        assert!(state.try_begin_cycle(now, Duration::ZERO).is_some());
    }

    #[test]
    fn cooldown_holds_off_cycles_after_stimulus() {
        let now = Instant::now();
        let (mut state, _, _) = running(now);
        let cooldown = Duration::from_secs(5);

        state.record_stimulus(now);
        assert!(state.try_begin_cycle(now + Duration::from_secs(4), cooldown).is_none());
        assert!(state.try_begin_cycle(now + Duration::from_secs(5), cooldown).is_some());
    }

    #[test]
    fn pause_resume_continues_elapsed() {
        let t0 = Instant::now();
        let (mut state, sampling, display) = running(t0);

        assert!(state.pause(t0 + Duration::from_secs(7)));
        assert!(sampling.is_cancelled() && display.is_cancelled());
        assert_eq!(state.displayed_secs(), 7);
        assert_eq!(state.elapsed(t0 + Duration::from_secs(60)), Duration::from_secs(7));

        let (s2, _) = handle();
        let (d2, _) = handle();
        let resumed_at = t0 + Duration::from_secs(60);
        assert!(state.resume(resumed_at, s2, d2));
        assert_eq!(
            state.refresh_display(resumed_at + Duration::from_secs(3)),
            10
        );
    }

    #[test]
    fn stimulus_resets_elapsed() {
        let t0 = Instant::now();
        let (mut state, _, _) = running(t0);
        state.refresh_display(t0 + Duration::from_secs(42));

        state.record_stimulus(t0 + Duration::from_secs(42));
        assert_eq!(state.displayed_secs(), 0);
        assert_eq!(state.refresh_display(t0 + Duration::from_millis(43_500)), 1);
    }

    #[test]
    fn stale_cycle_cannot_clear_new_busy_flag() {
        let t0 = Instant::now();
        let (mut state, _, _) = running(t0);

        let old = state.try_begin_cycle(t0, Duration::ZERO).unwrap();
        state.pause(t0);
        let (s, _) = handle();
        let (d, _) = handle();
        state.resume(t0, s, d);

        let new = state.try_begin_cycle(t0, Duration::ZERO).unwrap();
        assert!(!state.finish_cycle(old));
        assert!(state.is_busy());
        assert!(state.finish_cycle(new));
    }

    #[test]
    fn stop_is_terminal_and_idempotent() {
        let t0 = Instant::now();
        let (mut state, sampling, display) = running(t0);

        assert!(state.stop(t0 + Duration::from_secs(3)));
        assert!(sampling.is_cancelled() && display.is_cancelled());
        assert!(!state.stop(t0 + Duration::from_secs(4)));
        assert_eq!(state.status(), LoopStatus::Stopped);

        let (s, _) = handle();
        let (d, _) = handle();
        assert!(!state.resume(t0, s, d));
        assert!(!state.pause(t0));
        assert!(state.try_begin_cycle(t0, Duration::ZERO).is_none());
        assert_eq!(state.displayed_secs(), 3);
    }

    #[test]
    fn initializing_can_stop_directly() {
        let mut state = LoopState::new();
        assert!(state.stop(Instant::now()));
        assert_eq!(state.status(), LoopStatus::Stopped);
    }
}

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{error, info, warn};
use serde::Serialize;
use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    audio::{ToneEngineHandle, TonePlayer},
    capture::{Frame, FrameSource},
    config::{MonitorSettings, SessionConfig},
    decision::{Decision, DecisionClient, HttpDecisionClient},
    error::{MonitorError, Result},
    history::{CycleResult, HistoryLog},
    scheduler::{Scheduler, TaskHandle, TokioScheduler},
    stimulus::{StimulusDispatcher, StimulusTiming},
};

use super::{
    cycle::run_cycle,
    state::{format_duration, LoopState, LoopStatus},
};

/// Capabilities a session runs on.
pub struct MonitorDeps {
    pub frame_source: Arc<dyn FrameSource>,
    pub decision_client: Arc<dyn DecisionClient>,
    pub tone_player: Arc<dyn TonePlayer>,
    pub scheduler: Arc<dyn Scheduler>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub status: LoopStatus,
    pub elapsed_secs: u64,
    pub elapsed_display: String,
    pub busy: bool,
    pub acknowledging: bool,
    pub history: Vec<Arc<CycleResult>>,
}

/// Handle to one monitoring session. Cheap to clone; all clones drive the
/// same session.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

pub(crate) struct MonitorInner {
    pub(crate) config: SessionConfig,
    pub(crate) settings: MonitorSettings,
    pub(crate) frame_source: Arc<dyn FrameSource>,
    pub(crate) decision_client: Arc<dyn DecisionClient>,
    scheduler: Arc<dyn Scheduler>,
    dispatcher: StimulusDispatcher,
    // Lock order: state, then history.
    state: Mutex<LoopState>,
    history: Mutex<HistoryLog>,
    ended: CancellationToken,
}

impl Monitor {
    pub fn new(config: SessionConfig, settings: MonitorSettings, deps: MonitorDeps) -> Self {
        let dispatcher = StimulusDispatcher::new(
            Arc::clone(&deps.scheduler),
            deps.tone_player,
            StimulusTiming::from(&settings),
        );

        Self {
            inner: Arc::new(MonitorInner {
                history: Mutex::new(HistoryLog::new(settings.history_capacity)),
                config,
                settings,
                frame_source: deps.frame_source,
                decision_client: deps.decision_client,
                scheduler: deps.scheduler,
                dispatcher,
                state: Mutex::new(LoopState::new()),
                ended: CancellationToken::new(),
            }),
        }
    }

    /// Session against the HTTP classifier with local audio and tokio timers.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime: the timers are bound to the caller's runtime.
    /// The returned `Monitor` can then be driven from any thread.
    pub fn with_http(
        config: SessionConfig,
        settings: MonitorSettings,
        frame_source: Arc<dyn FrameSource>,
    ) -> Result<Self> {
        let client = HttpDecisionClient::new(&settings.api_base_url, settings.request_timeout)?;
        let deps = MonitorDeps {
            frame_source,
            decision_client: Arc::new(client),
            tone_player: Arc::new(ToneEngineHandle::new()),
            scheduler: Arc::new(TokioScheduler::current()),
        };
        Ok(Self::new(config, settings, deps))
    }

    /// Acquire the capture stream and start ticking. A capture failure stops
    /// the session (and fires [`Monitor::ended`]) before being returned.
    ///
    /// Only the first call on a session gets past the claim; any other call,
    /// concurrent or later, returns [`MonitorError::AlreadyStarted`] without
    /// touching the capture stream.
    pub async fn start(&self) -> Result<()> {
        if !self.inner.state().claim_start() {
            return Err(MonitorError::AlreadyStarted);
        }

        if let Err(err) = self.inner.frame_source.initialize().await {
            error!("screen capture unavailable, ending session: {err}");
            self.stop();
            return Err(err);
        }

        {
            let mut state = self.inner.state();
            if state.status() == LoopStatus::Stopped {
                // Stopped while the capture prompt was open; the stream may
                // have been granted after that release.
                drop(state);
                self.inner.frame_source.release();
                return Ok(());
            }
            let (sampling, display) = self.spawn_ticks();
            state.begin_running(Instant::now(), sampling, display);
        }

        self.watch_for_stream_end();
        info!(
            "monitoring started (stimulus: {}, every {}ms)",
            self.inner.config.stimulus(),
            self.inner.settings.sample_interval.as_millis()
        );
        Ok(())
    }

    /// Stop both ticks but keep the capture stream. No-op unless running.
    pub fn pause(&self) -> LoopStatus {
        let mut state = self.inner.state();
        if state.pause(Instant::now()) {
            self.inner.dispatcher.cancel_all();
            info!("monitoring paused at {}s", state.displayed_secs());
        }
        state.status()
    }

    /// Restart the ticks where the pause left the focus timer. The ticks go
    /// through the session's scheduler, so this is callable off the runtime.
    pub fn resume(&self) -> LoopStatus {
        let mut state = self.inner.state();
        if state.status() == LoopStatus::Paused {
            let (sampling, display) = self.spawn_ticks();
            state.resume(Instant::now(), sampling, display);
            info!("monitoring resumed at {}s", state.displayed_secs());
        }
        state.status()
    }

    /// End the session. Safe to call any number of times from any state;
    /// only the first call releases the stream and notifies the owner.
    pub fn stop(&self) -> LoopStatus {
        let stopped = {
            let mut state = self.inner.state();
            let stopped = state.stop(Instant::now());
            if stopped {
                self.inner.dispatcher.cancel_all();
            }
            stopped
        };

        if stopped {
            self.inner.frame_source.release();
            self.inner.ended.cancel();
            info!("monitoring stopped");
        }
        LoopStatus::Stopped
    }

    pub fn status(&self) -> LoopStatus {
        self.inner.state().status()
    }

    /// Seconds on the focus timer as of the last display tick.
    pub fn displayed_secs(&self) -> u64 {
        self.inner.state().displayed_secs()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.state().is_busy()
    }

    pub fn history(&self) -> Vec<Arc<CycleResult>> {
        self.inner.history().all()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Cancelled once when the session stops, whatever the cause.
    pub fn ended(&self) -> CancellationToken {
        self.inner.ended.clone()
    }

    pub fn acknowledgment(&self) -> watch::Receiver<bool> {
        self.inner.dispatcher.acknowledgment()
    }

    pub fn is_train_active(&self) -> bool {
        self.inner.dispatcher.is_train_active()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let state = self.inner.state();
        let history = self.inner.history().all();
        MonitorSnapshot {
            status: state.status(),
            elapsed_secs: state.displayed_secs(),
            elapsed_display: format_duration(state.displayed_secs()),
            busy: state.is_busy(),
            acknowledging: self.inner.dispatcher.is_acknowledging(),
            history,
        }
    }

    fn spawn_ticks(&self) -> (TaskHandle, TaskHandle) {
        let settings = &self.inner.settings;

        let weak = Arc::downgrade(&self.inner);
        let sampling = self.inner.scheduler.every(
            settings.sample_interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    MonitorInner::on_sample_tick(&inner);
                }
            }),
        );

        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let display = self.inner.scheduler.every(
            settings.display_interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.state().refresh_display(Instant::now());
                }
            }),
        );

        (sampling, display)
    }

    fn watch_for_stream_end(&self) {
        let stream_ended = self.inner.frame_source.ended();
        let session_ended = self.inner.ended.clone();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::select! {
                _ = session_ended.cancelled() => {}
                _ = stream_ended.cancelled() => {
                    if let Some(inner) = weak.upgrade() {
                        warn!("screen sharing ended outside the app, stopping session");
                        Monitor { inner }.stop();
                    }
                }
            }
        });
    }
}

impl MonitorInner {
    pub(crate) fn state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn history(&self) -> MutexGuard<'_, HistoryLog> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_sample_tick(inner: &Arc<MonitorInner>) {
        let mut state = inner.state();
        let Some(epoch) = state.try_begin_cycle(Instant::now(), inner.settings.stimulus_cooldown)
        else {
            return;
        };

        // The cycle cannot finish before it is attached: finishing needs this lock.
        let cycle = tokio::spawn(run_cycle(Arc::downgrade(inner), epoch));
        state.attach_cycle(epoch, cycle.abort_handle());
    }

    /// Clear the busy flag without recording anything.
    pub(crate) fn abandon_cycle(&self, epoch: u64) {
        self.state().finish_cycle(epoch);
    }

    /// Record a resolved cycle and fire the stimulus if warranted. `None`
    /// when the cycle was cancelled by a pause or stop in the meantime.
    pub(crate) fn complete_cycle(&self, epoch: u64, frame: Frame, decision: Decision) -> Option<bool> {
        let mut state = self.state();
        if !state.finish_cycle(epoch) {
            return None;
        }

        let triggered = decision.negative_stimulus();
        self.history().append(CycleResult::new(frame, decision));

        if triggered {
            state.record_stimulus(Instant::now());
            self.dispatcher.trigger(self.config.stimulus());
            info!("distraction detected, focus timer reset");
        }
        Some(triggered)
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        // Last handle gone without a stop: cancel the ticks and any cycle.
        self.state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stop(Instant::now());
        self.dispatcher.cancel_all();
        self.frame_source.release();
        self.ended.cancel();
    }
}

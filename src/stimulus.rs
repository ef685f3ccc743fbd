//! Side effects of a positive decision: the on-screen acknowledgment and,
//! for the local beep, a short train of tones.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::debug;
use tokio::sync::watch;

use crate::{
    audio::TonePlayer,
    config::{MonitorSettings, StimulusKind},
    scheduler::{Scheduler, TaskHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StimulusTiming {
    pub acknowledgment: Duration,
    pub tone_interval: Duration,
    pub train_duration: Duration,
}

impl From<&MonitorSettings> for StimulusTiming {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            acknowledgment: settings.acknowledgment_duration,
            tone_interval: settings.tone_interval,
            train_duration: settings.tone_train_duration,
        }
    }
}

struct ToneTrain {
    ticks: TaskHandle,
    _stopper: TaskHandle,
}

#[derive(Default)]
struct Effects {
    dismissal: Option<TaskHandle>,
    train: Option<ToneTrain>,
}

/// Runs at most one acknowledgment and at most one tone train at a time;
/// each trigger replaces whatever the previous one left running.
pub struct StimulusDispatcher {
    scheduler: Arc<dyn Scheduler>,
    player: Arc<dyn TonePlayer>,
    timing: StimulusTiming,
    effects: Mutex<Effects>,
    acknowledgment: Arc<watch::Sender<bool>>,
}

impl StimulusDispatcher {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        player: Arc<dyn TonePlayer>,
        timing: StimulusTiming,
    ) -> Self {
        let (acknowledgment, _) = watch::channel(false);
        Self {
            scheduler,
            player,
            timing,
            effects: Mutex::new(Effects::default()),
            acknowledgment: Arc::new(acknowledgment),
        }
    }

    /// Visibility of the acknowledgment flash, for the view layer.
    pub fn acknowledgment(&self) -> watch::Receiver<bool> {
        self.acknowledgment.subscribe()
    }

    pub fn is_acknowledging(&self) -> bool {
        *self.acknowledgment.borrow()
    }

    pub fn is_train_active(&self) -> bool {
        self.effects()
            .train
            .as_ref()
            .is_some_and(|train| !train.ticks.is_cancelled())
    }

    /// Fire the effects for one positive decision. Never blocks: every
    /// follow-up happens on scheduled tasks.
    pub fn trigger(&self, kind: StimulusKind) {
        let mut effects = self.effects();

        if let Some(previous) = effects.dismissal.take() {
            previous.cancel();
        }
        self.acknowledgment.send_replace(true);
        let acknowledgment = Arc::clone(&self.acknowledgment);
        effects.dismissal = Some(self.scheduler.after(
            self.timing.acknowledgment,
            Box::new(move || {
                acknowledgment.send_replace(false);
            }),
        ));

        match kind {
            StimulusKind::LocalBeep => {
                if let Some(previous) = effects.train.take() {
                    previous.ticks.cancel();
                }
                effects.train = Some(self.start_train());
            }
            device => debug!("{device} is delivered by the classifier backend"),
        }
    }

    /// Drop every pending effect and hide the acknowledgment.
    pub fn cancel_all(&self) {
        let (dismissal, train) = {
            let mut effects = self.effects();
            (effects.dismissal.take(), effects.train.take())
        };
        let had_train = train.is_some();
        drop(dismissal);
        drop(train);

        self.acknowledgment.send_replace(false);
        if had_train {
            self.player.silence();
        }
    }

    fn start_train(&self) -> ToneTrain {
        self.player.play_tone();

        let player = Arc::clone(&self.player);
        let ticks = self
            .scheduler
            .every(self.timing.tone_interval, Box::new(move || player.play_tone()));

        let stop = ticks.canceller();
        let stopper = self
            .scheduler
            .after(self.timing.train_duration, Box::new(move || stop.cancel()));

        ToneTrain {
            ticks,
            _stopper: stopper,
        }
    }

    fn effects(&self) -> MutexGuard<'_, Effects> {
        self.effects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub mod beep;

use beep::Beep;

use log::{error, warn};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Mutex,
};
use std::thread;

/// Plays one alert tone without blocking the caller.
pub trait TonePlayer: Send + Sync {
    fn play_tone(&self);

    /// Cut off anything still sounding.
    fn silence(&self) {}
}

enum AudioCommand {
    Beep,
    Silence,
}

/// [`TonePlayer`] backed by rodio.
///
/// rodio's output stream is not `Send`, so it lives on a dedicated thread
/// that is spawned on first use and fed through a channel. Each beep gets
/// its own sink so overlapping tones mix instead of queueing.
pub struct ToneEngineHandle {
    tx: Mutex<Option<Sender<AudioCommand>>>,
}

impl ToneEngineHandle {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        let mut guard = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("tone-engine".to_string())
            .spawn(move || {
                let mut output: Option<(OutputStream, OutputStreamHandle)> = None;
                let mut sinks: Vec<Sink> = Vec::new();

                fn ensure_output(
                    output: &mut Option<(OutputStream, OutputStreamHandle)>,
                ) -> Result<&OutputStreamHandle, String> {
                    if output.is_none() {
                        let opened = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        *output = Some(opened);
                    }
                    output
                        .as_ref()
                        .map(|(_, handle)| handle)
                        .ok_or_else(|| "audio output missing".to_string())
                }

                while let Ok(cmd) = rx.recv() {
                    sinks.retain(|sink| !sink.empty());

                    match cmd {
                        AudioCommand::Beep => {
                            let handle = match ensure_output(&mut output) {
                                Ok(handle) => handle,
                                Err(err) => {
                                    warn!("{err}");
                                    continue;
                                }
                            };
                            match Sink::try_new(handle) {
                                Ok(sink) => {
                                    sink.append(Beep::new());
                                    sinks.push(sink);
                                }
                                Err(e) => warn!("Failed to create audio sink: {}", e),
                            }
                        }
                        AudioCommand::Silence => {
                            for sink in sinks.drain(..) {
                                sink.stop();
                            }
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    fn send(&self, cmd: AudioCommand) {
        match self.ensure_thread() {
            Ok(tx) => {
                if tx.send(cmd).is_err() {
                    // Audio thread died; let the next call spawn a fresh one.
                    error!("tone engine thread is gone");
                    *self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
                }
            }
            Err(err) => error!("failed to start tone engine: {err}"),
        }
    }
}

impl Default for ToneEngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TonePlayer for ToneEngineHandle {
    fn play_tone(&self) {
        self.send(AudioCommand::Beep);
    }

    fn silence(&self) {
        let running = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(tx) = running {
            let _ = tx.send(AudioCommand::Silence);
        }
    }
}

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use image::{DynamicImage, RgbaImage};
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use screenshock::{
    BoxFuture, CaptureBackend, CaptureStream, Decision, DecisionClient, Frame, FrameSource,
    GrabError, Monitor, MonitorDeps, MonitorError, MonitorSettings, SessionConfig, StimulusKind,
    StreamFrameSource, TokioScheduler, TonePlayer,
};

/// Scripted outcome of one `capture_frame` call.
pub enum Capture {
    Nothing,
    Stall(Duration),
}

/// Frame source that never touches a screen.
#[derive(Default)]
pub struct FakeFrameSource {
    pub deny: bool,
    pub init_delay: Duration,
    captures_script: Mutex<VecDeque<Capture>>,
    pub initialized: AtomicUsize,
    pub captures: AtomicUsize,
    pub release_calls: AtomicUsize,
    /// Times the underlying stream was actually stopped.
    pub stream_stops: AtomicUsize,
    released: AtomicBool,
    ended: CancellationToken,
}

impl FakeFrameSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying() -> Arc<Self> {
        Arc::new(Self {
            deny: true,
            ..Self::default()
        })
    }

    pub fn slow_to_initialize(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            init_delay: delay,
            ..Self::default()
        })
    }

    /// Plays back `script` for the first captures, then yields frames.
    pub fn scripted(script: impl IntoIterator<Item = Capture>) -> Arc<Self> {
        let source = Self::default();
        source.captures_script.lock().unwrap().extend(script);
        Arc::new(source)
    }

    /// Simulate the user revoking screen sharing.
    pub fn end_stream(&self) {
        self.ended.cancel();
    }
}

impl FrameSource for FakeFrameSource {
    fn initialize(&self) -> BoxFuture<'_, screenshock::Result<()>> {
        Box::pin(async move {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            if !self.init_delay.is_zero() {
                tokio::time::sleep(self.init_delay).await;
            }
            if self.deny {
                Err(MonitorError::PermissionDenied)
            } else {
                Ok(())
            }
        })
    }

    fn capture_frame(&self) -> BoxFuture<'_, Option<Frame>> {
        Box::pin(async move {
            if self.released.load(Ordering::SeqCst) {
                return None;
            }
            let next = self.captures_script.lock().unwrap().pop_front();
            match next {
                Some(Capture::Nothing) => return None,
                Some(Capture::Stall(delay)) => tokio::time::sleep(delay).await,
                None => {}
            }
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            Some(Frame::from_png(vec![n as u8], 16))
        })
    }

    fn release(&self) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if !self.released.swap(true, Ordering::SeqCst) {
            self.stream_stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ended(&self) -> CancellationToken {
        self.ended.clone()
    }
}

pub enum Reply {
    Decide(Value),
    Fail,
    Hang,
    Slow(Duration, Value),
}

/// Decision client that plays back a script, then falls back to the
/// `distracted` flag.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Reply>>,
    pub distracted: AtomicBool,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        let client = Self::default();
        client.script.lock().unwrap().extend(replies);
        Arc::new(client)
    }

    pub fn set_distracted(&self, distracted: bool) {
        self.distracted.store(distracted, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl DecisionClient for ScriptedClient {
    fn submit<'a>(
        &'a self,
        _frame: &'a Frame,
        _config: &'a SessionConfig,
    ) -> BoxFuture<'a, screenshock::Result<Decision>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            let reply = self.script.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Decide(payload)) => Ok(Decision::from_payload(payload)),
                Some(Reply::Fail) => Err(MonitorError::SubmissionFailed("connection reset".into())),
                Some(Reply::Hang) => std::future::pending().await,
                Some(Reply::Slow(delay, payload)) => {
                    tokio::time::sleep(delay).await;
                    Ok(Decision::from_payload(payload))
                }
                None => Ok(Decision::from_payload(json!({
                    "negative_stimulus": self.distracted.load(Ordering::SeqCst),
                    "analysis": "scripted",
                }))),
            }
        })
    }
}

/// Records when each tone was played, in ms since creation.
pub struct RecordingPlayer {
    start: Instant,
    tones: Mutex<Vec<u128>>,
    pub silenced: AtomicUsize,
}

impl RecordingPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            tones: Mutex::new(Vec::new()),
            silenced: AtomicUsize::new(0),
        })
    }

    pub fn tones(&self) -> Vec<u128> {
        self.tones.lock().unwrap().clone()
    }
}

impl TonePlayer for RecordingPlayer {
    fn play_tone(&self) {
        let at = self.start.elapsed().as_millis();
        self.tones.lock().unwrap().push(at);
    }

    fn silence(&self) {
        self.silenced.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn assert_times(actual: &[u128], expected: &[u128]) {
    assert_eq!(actual.len(), expected.len(), "got {actual:?}, wanted {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!(a.abs_diff(*e) <= 3, "got {actual:?}, wanted {expected:?}");
    }
}

pub fn settings() -> MonitorSettings {
    MonitorSettings {
        frame_size: 16,
        ..MonitorSettings::default()
    }
}

pub fn beep_config() -> SessionConfig {
    SessionConfig::new("finish the essay", StimulusKind::LocalBeep, None).unwrap()
}

/// Session over a real [`StreamFrameSource`] driving `backend`.
pub fn stream_monitor(backend: CountingBackend) -> Monitor {
    let source = Arc::new(StreamFrameSource::new(Arc::new(backend), 16));
    Monitor::new(
        beep_config(),
        settings(),
        MonitorDeps {
            frame_source: source,
            decision_client: ScriptedClient::new(),
            tone_player: RecordingPlayer::new(),
            scheduler: Arc::new(TokioScheduler::current()),
        },
    )
}

pub fn monitor(
    source: Arc<FakeFrameSource>,
    client: Arc<ScriptedClient>,
    player: Arc<RecordingPlayer>,
    settings: MonitorSettings,
) -> Monitor {
    Monitor::new(
        beep_config(),
        settings,
        MonitorDeps {
            frame_source: source,
            decision_client: client,
            tone_player: player,
            scheduler: Arc::new(TokioScheduler::current()),
        },
    )
}

/// Capture backend whose stream counts how often it is stopped. Cancelling
/// `revoked` ends sharing the way the platform would.
#[derive(Default)]
pub struct CountingBackend {
    pub stops: Arc<AtomicUsize>,
    pub revoked: CancellationToken,
}

struct CountingStream {
    stops: Arc<AtomicUsize>,
    revoked: CancellationToken,
}

impl CaptureStream for CountingStream {
    fn grab(&mut self) -> Result<DynamicImage, GrabError> {
        Ok(DynamicImage::ImageRgba8(RgbaImage::new(64, 36)))
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn ended(&self) -> Option<CancellationToken> {
        Some(self.revoked.clone())
    }
}

impl CaptureBackend for CountingBackend {
    fn open(&self) -> screenshock::Result<Box<dyn CaptureStream>> {
        Ok(Box::new(CountingStream {
            stops: Arc::clone(&self.stops),
            revoked: self.revoked.clone(),
        }))
    }
}

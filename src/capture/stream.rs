use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use image::DynamicImage;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{Frame, FrameSource};
use crate::{
    error::{MonitorError, Result},
    BoxFuture,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Platform capture primitive: opens a screen-sharing stream.
pub trait CaptureBackend: Send + Sync {
    /// Blocking; runs on the blocking pool. Must map a user refusal to
    /// `PermissionDenied` and missing support to `CaptureUnavailable`.
    fn open(&self) -> Result<Box<dyn CaptureStream>>;
}

/// An open stream. Only ever touched by one thread at a time.
pub trait CaptureStream: Send {
    /// Blocking grab of the current frame at source resolution.
    fn grab(&mut self) -> Result<DynamicImage, GrabError>;

    /// Stop all tracks. Called exactly once per stream.
    fn stop(&mut self);

    /// Cancelled by the platform when sharing ends outside the app, whether
    /// or not a grab is running. Streams that can only tell from a failed
    /// grab return `None`.
    fn ended(&self) -> Option<CancellationToken> {
        None
    }
}

#[derive(Debug, Error)]
pub enum GrabError {
    /// The user or the platform ended sharing.
    #[error("capture stream ended")]
    Ended,

    #[error("frame not available: {0}")]
    NotReady(String),
}

/// [`FrameSource`] over a [`CaptureBackend`].
///
/// The open stream is parked in `slot` between captures. A capture takes it
/// out for the duration of the grab, so `release` never waits on a slow
/// grab; whichever side observes `released` last stops the stream.
pub struct StreamFrameSource {
    backend: Arc<dyn CaptureBackend>,
    frame_size: u32,
    shared: Arc<StreamShared>,
}

struct StreamShared {
    slot: Mutex<Option<Box<dyn CaptureStream>>>,
    released: AtomicBool,
    ended: CancellationToken,
    /// Cancelled on release; stops the end-of-stream watcher.
    shutdown: CancellationToken,
}

impl StreamFrameSource {
    pub fn new(backend: Arc<dyn CaptureBackend>, frame_size: u32) -> Self {
        Self {
            backend,
            frame_size,
            shared: Arc::new(StreamShared {
                slot: Mutex::new(None),
                released: AtomicBool::new(false),
                ended: CancellationToken::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::SeqCst)
    }
}

impl StreamShared {
    fn slot(&self) -> MutexGuard<'_, Option<Box<dyn CaptureStream>>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Park `stream` back in the slot, or stop it if a release slipped in
    /// while it was out. A stream already in the slot (two racing
    /// initializations) is displaced and stopped.
    fn park(&self, mut stream: Box<dyn CaptureStream>) -> bool {
        let mut slot = self.slot();
        if self.released.load(Ordering::SeqCst) {
            drop(slot);
            stream.stop();
            return false;
        }

        let displaced = slot.replace(stream);
        drop(slot);
        if let Some(mut displaced) = displaced {
            displaced.stop();
        }
        true
    }

    /// Forward a platform end-of-stream signal to `ended` until release.
    fn watch_platform_end(self: &Arc<Self>, platform_ended: CancellationToken) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shared.shutdown.cancelled() => {}
                _ = platform_ended.cancelled() => {
                    log_warn!("capture stream ended externally");
                    shared.ended.cancel();
                }
            }
        });
    }

    fn grab_once(&self, frame_size: u32) -> Option<Frame> {
        // Empty slot: released, not yet initialized, or another grab in progress.
        let mut stream = self.slot().take()?;
        let grabbed = stream.grab();
        self.park(stream);

        match grabbed {
            Ok(image) => match Frame::from_image(&image, frame_size) {
                Ok(frame) => Some(frame),
                Err(err) => {
                    log_warn!("frame encode failed: {err}");
                    None
                }
            },
            Err(GrabError::Ended) => {
                log_warn!("capture stream ended externally");
                self.ended.cancel();
                None
            }
            Err(GrabError::NotReady(reason)) => {
                log_debug!("no frame this cycle: {reason}");
                None
            }
        }
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();

        let stream = self.slot().take();
        if let Some(mut stream) = stream {
            stream.stop();
        }
        log_info!("capture stream released");
    }
}

impl FrameSource for StreamFrameSource {
    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.is_released() {
                return Err(MonitorError::CaptureUnavailable(
                    "capture source already released".into(),
                ));
            }
            if self.shared.slot().is_some() {
                return Ok(());
            }

            let backend = Arc::clone(&self.backend);
            let stream = tokio::task::spawn_blocking(move || backend.open())
                .await
                .map_err(|err| {
                    MonitorError::CaptureUnavailable(format!("capture worker failed: {err}"))
                })??;

            let platform_ended = stream.ended();
            if !self.shared.park(stream) {
                return Err(MonitorError::CaptureUnavailable(
                    "capture source released during initialization".into(),
                ));
            }
            if let Some(platform_ended) = platform_ended {
                self.shared.watch_platform_end(platform_ended);
            }
            log_info!("capture stream opened ({}px frames)", self.frame_size);
            Ok(())
        })
    }

    fn capture_frame(&self) -> BoxFuture<'_, Option<Frame>> {
        Box::pin(async move {
            if self.is_released() {
                return None;
            }

            let shared = Arc::clone(&self.shared);
            let frame_size = self.frame_size;
            match tokio::task::spawn_blocking(move || shared.grab_once(frame_size)).await {
                Ok(frame) => frame,
                Err(err) => {
                    log_error!("capture worker join failed: {err}");
                    None
                }
            }
        })
    }

    fn release(&self) {
        self.shared.release();
    }

    fn ended(&self) -> CancellationToken {
        self.shared.ended.clone()
    }
}

impl Drop for StreamFrameSource {
    fn drop(&mut self) {
        self.shared.release();
    }
}

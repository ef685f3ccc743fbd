pub mod frame;
pub mod stream;

pub use frame::Frame;
pub use stream::{CaptureBackend, CaptureStream, GrabError, StreamFrameSource};

use tokio_util::sync::CancellationToken;

use crate::{error::Result, BoxFuture};

/// A live screen-sharing stream that yields downsampled stills on demand.
pub trait FrameSource: Send + Sync {
    /// Ask for the stream. Fails with `PermissionDenied` or
    /// `CaptureUnavailable`; both end the session.
    fn initialize(&self) -> BoxFuture<'_, Result<()>>;

    /// Grab the current frame. `None` when nothing usable was available;
    /// the caller skips that cycle.
    fn capture_frame(&self) -> BoxFuture<'_, Option<Frame>>;

    /// Stop the underlying stream. Idempotent, and safe while a capture is
    /// running.
    fn release(&self);

    /// Cancelled when the stream is ended from outside (sharing revoked).
    fn ended(&self) -> CancellationToken;
}

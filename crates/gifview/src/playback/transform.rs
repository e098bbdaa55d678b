use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{panic_message, FrameError};
use crate::media::types::DecodedFrame;

/// Per-frame pixel transform supplied by the host (blur, tint, ...).
///
/// Runs synchronously on the playback worker, after decode and before publish. Its cost
/// counts against the frame's delay. The returned buffer replaces the input.
pub trait FrameTransform: Send + Sync {
    fn transform(&self, frame: DecodedFrame) -> anyhow::Result<DecodedFrame>;
}

impl<F> FrameTransform for F
where
    F: Fn(DecodedFrame) -> anyhow::Result<DecodedFrame> + Send + Sync,
{
    fn transform(&self, frame: DecodedFrame) -> anyhow::Result<DecodedFrame> {
        self(frame)
    }
}

/// Run `transform` on frame `index`. Errors and panics both become a [`FrameError`].
pub(crate) fn apply(
    transform: &dyn FrameTransform,
    frame: DecodedFrame,
    index: usize,
) -> Result<DecodedFrame, FrameError> {
    match catch_unwind(AssertUnwindSafe(|| transform.transform(frame))) {
        Ok(Ok(out)) => Ok(out),
        Ok(Err(e)) => Err(FrameError::Transform {
            index,
            reason: format!("{e:#}"),
        }),
        Err(payload) => Err(FrameError::Panicked {
            index,
            reason: panic_message(payload.as_ref()),
        }),
    }
}

//! Frame source contract consumed by the playback engine.
//!
//! A [`FrameSource`] is a stateful cursor over an ordered, cyclic sequence of frames.
//! The engine moves it to the worker thread and never touches it from anywhere else.

use super::types::DecodedFrame;
use crate::error::{DecodeError, FrameError};

pub trait FrameSource: Send {
    /// Number of frames. Fixed for the lifetime of the source.
    fn frame_count(&self) -> usize;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Index of the frame under the cursor.
    fn current_index(&self) -> usize;

    /// Decode the frame under the cursor. A failure only affects this frame.
    fn next_frame(&mut self) -> Result<DecodedFrame, FrameError>;

    /// Display time in milliseconds of the frame under the cursor.
    fn next_delay_ms(&self) -> u64;

    /// Move the cursor to the next frame, wrapping after the last one.
    /// Returns false once the source's loop count has been fulfilled.
    fn advance(&mut self) -> bool;

    /// Place the cursor on `index`. Returns false if out of range.
    fn set_frame_index(&mut self, index: usize) -> bool;

    /// Restart loop counting from the first loop.
    fn reset_loop_index(&mut self) {}
}

/// Builds fresh [`FrameSource`]s from encoded bytes.
pub trait FrameDecoder: Send + Sync {
    fn read(&self, bytes: &[u8]) -> Result<Box<dyn FrameSource>, DecodeError>;
}

impl<F> FrameDecoder for F
where
    F: Fn(&[u8]) -> Result<Box<dyn FrameSource>, DecodeError> + Send + Sync,
{
    fn read(&self, bytes: &[u8]) -> Result<Box<dyn FrameSource>, DecodeError> {
        self(bytes)
    }
}

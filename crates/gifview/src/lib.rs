//! Animated GIF playback with cancellable, paced frame delivery.
//!
//! [`PlaybackEngine`] owns a worker thread that decodes frames from a [`FrameSource`],
//! runs an optional [`FrameTransform`] and posts the result to a [`Presenter`], which the
//! host drains on its presentation thread into a [`DisplaySink`].

pub mod error;
pub mod media;
pub mod playback;
pub mod settings;

pub use error::{DecodeError, FrameError, PlaybackError};
pub use media::{DecodedFrame, FrameDecoder, FrameSource, GifDecoder, PlaybackFrame};
pub use playback::{
    DisplaySink, EngineState, FrameTransform, PlaybackEngine, PresentEvent, Presenter,
};
pub use settings::PlaybackConfig;

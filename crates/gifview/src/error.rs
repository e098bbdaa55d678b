use thiserror::Error;

/// Whole-animation failure raised while reading an encoded buffer.
/// The load attempt is abandoned; the engine keeps running.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed animation: {0}")]
    Format(String),
    #[error("failed to read animation: {0}")]
    Io(#[from] std::io::Error),
    /// Decoding would exceed the configured memory budget.
    #[error("decoding needs {needed} bytes, budget is {limit}")]
    ResourceExhausted { needed: u64, limit: u64 },
    #[error("animation has no frames")]
    NoFrames,
}

impl From<gif::DecodingError> for DecodeError {
    fn from(e: gif::DecodingError) -> Self {
        match e {
            gif::DecodingError::Io(io) => DecodeError::Io(io),
            other => DecodeError::Format(other.to_string()),
        }
    }
}

/// Single-frame failure inside the playback loop. Logged, frame skipped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame {index}: {reason}")]
    Decode { index: usize, reason: String },
    #[error("frame {index}: out of memory while compositing")]
    ResourceExhausted { index: usize },
    #[error("frame {index}: transform failed: {reason}")]
    Transform { index: usize, reason: String },
    #[error("frame {index}: panicked: {reason}")]
    Panicked { index: usize, reason: String },
}

/// Errors surfaced by the engine control surface.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no animation loaded")]
    NotLoaded,
    #[error("frame {index} out of range (animation has {count} frames)")]
    FrameOutOfRange { index: usize, count: usize },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to spawn playback worker: {0}")]
    WorkerSpawn(std::io::Error),
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_messages() {
        let e = DecodeError::ResourceExhausted {
            needed: 2048,
            limit: 1024,
        };
        assert_eq!(e.to_string(), "decoding needs 2048 bytes, budget is 1024");
        assert_eq!(DecodeError::NoFrames.to_string(), "animation has no frames");
    }

    #[test]
    fn playback_error_wraps_decode_error() {
        let e: PlaybackError = DecodeError::Format("bad header".into()).into();
        assert!(matches!(e, PlaybackError::Decode(DecodeError::Format(_))));
        assert_eq!(e.to_string(), "malformed animation: bad header");
    }

    #[test]
    fn panic_message_downcasts() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}

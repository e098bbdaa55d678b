pub mod decoder;
pub mod source;
pub mod types;

pub use decoder::{GifDecoder, GifFrameSource};
pub use source::{FrameDecoder, FrameSource};
pub use types::{DecodedFrame, PlaybackFrame};

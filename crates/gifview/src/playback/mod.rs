pub mod engine;
pub mod present;
pub mod state;
pub mod transform;

pub use engine::{PlaybackEngine, PRESENT_QUEUE_DEPTH};
pub use present::{DisplaySink, PresentEvent, Presenter};
pub use state::{EngineState, Handler, SourceInfo};
pub use transform::FrameTransform;

use std::sync::Arc;

use super::transform::FrameTransform;
use crate::media::source::FrameSource;

/// Host callback invoked on the playback worker thread.
pub type Handler = Arc<dyn Fn() + Send + Sync>;

/// Engine state as seen by the host.
///
/// ```text
/// Idle --load--> Loaded --start--> Running --stop--> Loaded (StopRequested while the loop winds down)
/// Running|Loaded --clear--> ClearRequested --worker releases--> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Loaded,
    Running,
    /// Animation stopped, worker still inside its loop.
    StopRequested,
    /// Release requested, worker has not dropped the source yet.
    ClearRequested,
}

/// Dimensions of the loaded source, cached for host queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
}

impl SourceInfo {
    pub fn of(source: &dyn FrameSource) -> Self {
        Self {
            width: source.width(),
            height: source.height(),
            frame_count: source.frame_count(),
        }
    }
}

/// Everything shared between the control surface and the worker. Lives behind one mutex.
#[derive(Default)]
pub(crate) struct Control {
    /// Host wants frames to advance.
    pub animating: bool,
    /// Worker must drop its source and post `Cleared`.
    pub clear_pending: bool,
    /// Worker is inside a play run. Single-frame renders do not count.
    pub worker_active: bool,
    pub shutdown: bool,
    /// Info for the newest source (installed or incoming). `None` when nothing is loaded.
    pub info: Option<SourceInfo>,
    /// Freshly loaded source waiting for the worker to take ownership.
    pub incoming: Option<Box<dyn FrameSource>>,
    /// Bumped by every load and clear; a worker holding an older value must stop.
    pub generation: u64,
    pub seek: Option<usize>,
    pub reset_loop: bool,
    /// Host override in ms; `<= 0` means use the source delays.
    pub frame_duration_ms: i64,
    pub transform: Option<Arc<dyn FrameTransform>>,
    pub on_start: Option<Handler>,
    pub on_stop: Option<Handler>,
}

impl Control {
    pub fn state(&self) -> EngineState {
        if self.clear_pending {
            EngineState::ClearRequested
        } else if self.info.is_none() {
            EngineState::Idle
        } else if self.animating {
            EngineState::Running
        } else if self.worker_active {
            EngineState::StopRequested
        } else {
            EngineState::Loaded
        }
    }

    /// Whether a worker holding `generation` still owns the current animation.
    pub fn is_current(&self, generation: u64) -> bool {
        !self.shutdown && !self.clear_pending && self.generation == generation
    }

    pub fn keeps_playing(&self, generation: u64) -> bool {
        self.animating && self.is_current(generation)
    }

    /// A pacing sleep should end early.
    pub fn interrupts_sleep(&self, generation: u64) -> bool {
        !self.keeps_playing(generation) || self.seek.is_some() || self.reset_loop
    }

    pub fn frame_duration_override(&self) -> Option<u64> {
        u64::try_from(self.frame_duration_ms).ok().filter(|&ms| ms > 0)
    }

    /// Forget the loaded animation. The worker drops its source on its next pass.
    pub fn discard_source(&mut self) {
        self.clear_pending = true;
        self.incoming = None;
        self.info = None;
        self.seek = None;
        self.reset_loop = false;
        self.generation += 1;
    }
}

//! Presentation-thread side of the engine.
//!
//! The worker posts [`PresentEvent`]s into a short bounded channel and never waits for them;
//! if the host stops draining it, older frames are dropped in favor of newer ones.
//! The host owns the [`Presenter`] on its presentation thread and drives a [`DisplaySink`]
//! from it; nothing else may touch the sink.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::media::types::PlaybackFrame;

/// UI-confined surface that shows one frame at a time.
pub trait DisplaySink {
    /// Show `frame`. Called only from the presentation thread, possibly in quick succession.
    fn present(&mut self, frame: &PlaybackFrame);

    /// Drop whatever is on screen. Called after the engine released its source.
    fn clear(&mut self) {}
}

/// Event posted by the worker for the presentation thread.
#[derive(Debug)]
pub enum PresentEvent {
    Frame(PlaybackFrame),
    /// Source and cached frame were released; the surface should go blank.
    Cleared,
}

pub struct Presenter {
    events: Receiver<PresentEvent>,
    current: Option<PlaybackFrame>,
}

impl Presenter {
    pub(crate) fn new(events: Receiver<PresentEvent>) -> Self {
        Self {
            events,
            current: None,
        }
    }

    /// Drain every pending event and bring `sink` up to date.
    /// Intermediate frames are coalesced: only the newest one is presented.
    /// Returns the number of frames received.
    pub fn pump(&mut self, sink: &mut dyn DisplaySink) -> usize {
        let mut received = 0;
        let mut latest = None;
        while let Ok(event) = self.events.try_recv() {
            match event {
                PresentEvent::Frame(frame) => {
                    received += 1;
                    latest = Some(frame);
                }
                PresentEvent::Cleared => {
                    latest = None;
                    self.release(sink);
                }
            }
        }
        if let Some(frame) = latest {
            sink.present(&frame);
            self.current = Some(frame);
        }
        received
    }

    /// Block for the next event, up to `timeout`. `None` on timeout or once the engine is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PresentEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Apply one event to `sink`, in order, without coalescing.
    pub fn apply(&mut self, event: PresentEvent, sink: &mut dyn DisplaySink) {
        match event {
            PresentEvent::Frame(frame) => {
                sink.present(&frame);
                self.current = Some(frame);
            }
            PresentEvent::Cleared => self.release(sink),
        }
    }

    /// Re-present the cached frame (e.g. after the surface was recreated). No-op without one.
    pub fn refresh(&self, sink: &mut dyn DisplaySink) {
        if let Some(frame) = &self.current {
            sink.present(frame);
        }
    }

    /// Frame most recently handed to the sink.
    pub fn current(&self) -> Option<&PlaybackFrame> {
        self.current.as_ref()
    }

    fn release(&mut self, sink: &mut dyn DisplaySink) {
        self.current = None;
        sink.clear();
    }
}

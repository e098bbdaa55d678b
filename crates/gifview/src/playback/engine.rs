//! Animated-frame playback engine.
//!
//! One long-lived worker thread per engine owns the [`FrameSource`] and runs the
//! decode / transform / publish / pace loop. Control calls only edit the shared
//! [`Control`] record (one mutex) and post a wake-up on a one-slot channel; the worker
//! re-reads the record at every checkpoint. Frames leave through a short bounded channel
//! to the [`Presenter`]. When the presentation thread falls behind, the oldest queued frame
//! is dropped, so decoding never waits on it and the backlog never grows.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use super::present::{PresentEvent, Presenter};
use super::state::{Control, EngineState, Handler, SourceInfo};
use super::transform::{self, FrameTransform};
use crate::error::{panic_message, FrameError, PlaybackError};
use crate::media::source::{FrameDecoder, FrameSource};
use crate::media::types::{DecodedFrame, PlaybackFrame};
use crate::settings::PlaybackConfig;

/// Events the presentation thread may lag behind before the oldest frame is dropped.
pub const PRESENT_QUEUE_DEPTH: usize = 2;

struct Shared {
    control: Mutex<Control>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        // Control stays consistent across a panic: every write is a single field store.
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Host-facing control surface. Every method is safe to call from any thread.
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    wake_tx: Sender<()>,
    decoder: Box<dyn FrameDecoder>,
    show_first_frame_on_load: bool,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Spawn the engine's worker. The returned [`Presenter`] belongs on the presentation thread.
    pub fn new(
        decoder: impl FrameDecoder + 'static,
        config: &PlaybackConfig,
    ) -> Result<(Self, Presenter), PlaybackError> {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                frame_duration_ms: config.frame_duration_ms,
                ..Control::default()
            }),
        });
        // One slot: a pending wake-up already covers any later change.
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(PRESENT_QUEUE_DEPTH);
        let backlog = frame_rx.clone();

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("gif-playback".into())
            .spawn(move || {
                let mut worker = Worker {
                    link: Link {
                        shared: worker_shared,
                        wake_rx,
                        frame_tx,
                        backlog,
                    },
                    source: None,
                    generation: 0,
                };
                worker.run();
            })
            .map_err(PlaybackError::WorkerSpawn)?;

        let engine = Self {
            shared,
            wake_tx,
            decoder: Box::new(decoder),
            show_first_frame_on_load: config.show_first_frame_on_load,
            worker: Some(handle),
        };
        Ok((engine, Presenter::new(frame_rx)))
    }

    /// Engine backed by the GIF decoder, with limits taken from `config`.
    pub fn with_gif(config: &PlaybackConfig) -> Result<(Self, Presenter), PlaybackError> {
        Self::new(config.gif_decoder(), config)
    }

    /// Decode `bytes` into a fresh source and hand it to the worker.
    ///
    /// The decode runs on the calling thread. On failure the previous source is discarded
    /// and the engine ends up `Idle`. If the engine is animating, playback continues on the
    /// new source once the worker has let go of the old one.
    pub fn load(&self, bytes: &[u8]) -> Result<(), PlaybackError> {
        let source = match self.decoder.read(bytes) {
            Ok(source) => source,
            Err(e) => {
                log::error!("Failed to load animation: {e}");
                self.lock().discard_source();
                self.wake();
                return Err(e.into());
            }
        };

        let info = SourceInfo::of(source.as_ref());
        {
            let mut c = self.lock();
            c.incoming = Some(source);
            c.info = Some(info);
            c.generation += 1;
            c.reset_loop = false;
            c.seek = (!c.animating && self.show_first_frame_on_load).then_some(0);
        }
        self.wake();
        log::debug!(
            "Animation loaded: {}x{}, {} frames",
            info.width,
            info.height,
            info.frame_count
        );
        Ok(())
    }

    /// Start (or keep) animating. Idempotent.
    pub fn start(&self) {
        {
            let mut c = self.lock();
            if c.animating {
                return;
            }
            c.animating = true;
        }
        self.wake();
    }

    /// Ask the worker to stop at its next checkpoint. Does not wait for it.
    /// A pending `goto_frame` is still rendered.
    pub fn stop(&self) {
        self.lock().animating = false;
        self.wake();
    }

    /// Stop and release the source and the presenter's cached frame.
    /// The engine reports `ClearRequested` until the worker has dropped the source, then `Idle`.
    pub fn clear(&self) {
        {
            let mut c = self.lock();
            c.animating = false;
            c.discard_source();
        }
        self.wake();
    }

    /// Fixed display time for every frame; `ms <= 0` restores the source delays.
    /// Picked up at the next pacing computation.
    pub fn set_frame_duration(&self, ms: i64) {
        self.lock().frame_duration_ms = ms;
    }

    /// Install or remove the per-frame transform. Read by the worker once per frame.
    pub fn set_frame_transform(&self, transform: Option<Arc<dyn FrameTransform>>) {
        self.lock().transform = transform;
    }

    /// Called on the worker thread when a playback run begins.
    pub fn set_on_animation_start(&self, handler: Option<Handler>) {
        self.lock().on_start = handler;
    }

    /// Called on the worker thread when a playback run ends, for any reason.
    pub fn set_on_animation_stop(&self, handler: Option<Handler>) {
        self.lock().on_stop = handler;
    }

    /// Show frame `index`. When stopped, the worker renders exactly that frame once;
    /// while animating, playback continues from it.
    pub fn goto_frame(&self, index: usize) -> Result<(), PlaybackError> {
        {
            let mut c = self.lock();
            let count = c.info.ok_or(PlaybackError::NotLoaded)?.frame_count;
            if index >= count {
                return Err(PlaybackError::FrameOutOfRange { index, count });
            }
            c.seek = Some(index);
        }
        self.wake();
        Ok(())
    }

    /// Restart loop counting and go back to the first frame.
    pub fn reset_animation(&self) -> Result<(), PlaybackError> {
        {
            let mut c = self.lock();
            if c.info.is_none() {
                return Err(PlaybackError::NotLoaded);
            }
            c.reset_loop = true;
            c.seek = Some(0);
        }
        self.wake();
        Ok(())
    }

    pub fn is_animating(&self) -> bool {
        self.lock().animating
    }

    pub fn state(&self) -> EngineState {
        self.lock().state()
    }

    pub fn width(&self) -> Result<u32, PlaybackError> {
        Ok(self.info()?.width)
    }

    pub fn height(&self) -> Result<u32, PlaybackError> {
        Ok(self.info()?.height)
    }

    pub fn frame_count(&self) -> Result<usize, PlaybackError> {
        Ok(self.info()?.frame_count)
    }

    fn info(&self) -> Result<SourceInfo, PlaybackError> {
        self.lock().info.ok_or(PlaybackError::NotLoaded)
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.shared.lock()
    }

    fn wake(&self) {
        // Full means a wake-up is already pending.
        let _ = self.wake_tx.try_send(());
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        {
            let mut c = self.lock();
            c.shutdown = true;
            c.animating = false;
            c.incoming = None;
            c.info = None;
        }
        self.wake();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Playback worker panicked during shutdown");
            }
        }
    }
}

/// What the worker does next.
enum Job {
    Wait,
    Play,
    Render(usize),
    Shutdown,
}

/// Worker's view of the engine: control record, wake-ups, outgoing frames.
struct Link {
    shared: Arc<Shared>,
    wake_rx: Receiver<()>,
    frame_tx: Sender<PresentEvent>,
    /// Worker-side handle on the presentation queue, used to evict stale frames.
    backlog: Receiver<PresentEvent>,
}

/// Per-frame snapshot of the control record.
struct Tick {
    seek: Option<usize>,
    reset_loop: bool,
    frame_duration: Option<u64>,
    transform: Option<Arc<dyn FrameTransform>>,
}

impl Link {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.shared.lock()
    }

    /// Top-of-loop checkpoint. `None` means the run is over.
    fn checkpoint(&self, generation: u64) -> Option<Tick> {
        let mut c = self.lock();
        if !c.keeps_playing(generation) {
            return None;
        }
        Some(Tick {
            seek: c.seek.take(),
            reset_loop: std::mem::take(&mut c.reset_loop),
            frame_duration: c.frame_duration_override(),
            transform: c.transform.clone(),
        })
    }

    fn keeps_playing(&self, generation: u64) -> bool {
        self.lock().keeps_playing(generation)
    }

    fn publish(&self, frame: PlaybackFrame) {
        self.post(PresentEvent::Frame(frame));
    }

    /// Queue `event` without blocking. A full queue loses its oldest frame; a queued
    /// `Cleared` stays ahead of anything posted after it.
    fn post(&self, mut event: PresentEvent) {
        loop {
            match self.frame_tx.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(back)) => {
                    event = back;
                    if let Ok(PresentEvent::Cleared) = self.backlog.try_recv() {
                        // Frames behind a release are superseded by `event`
                        while self.backlog.try_recv().is_ok() {}
                        let _ = self.frame_tx.try_send(PresentEvent::Cleared);
                    }
                }
            }
        }
    }

    /// Sleep until `deadline` unless the control record says otherwise first.
    fn pace(&self, deadline: Instant, generation: u64) {
        loop {
            match self.wake_rx.recv_deadline(deadline) {
                Ok(()) => {
                    if self.lock().interrupts_sleep(generation) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

/// Clears `worker_active` when a run ends, however it ends.
struct ActiveGuard {
    shared: Arc<Shared>,
}

impl ActiveGuard {
    fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.shared.lock().worker_active = false;
    }
}

struct Worker {
    link: Link,
    source: Option<Box<dyn FrameSource>>,
    /// Generation of `source`.
    generation: u64,
}

impl Worker {
    fn run(&mut self) {
        log::debug!("Playback worker started");
        loop {
            match self.next_job() {
                Job::Shutdown => break,
                Job::Wait => {
                    if self.link.wake_rx.recv().is_err() {
                        break;
                    }
                }
                Job::Play => self.play_activation(),
                Job::Render(index) => self.render_activation(index),
            }
        }
        self.source = None;
        log::debug!("Playback worker exiting");
    }

    /// Resolve pending clear/load requests and decide what to do. Marks the worker
    /// active (under the same lock) before returning `Play`. A single-frame `Render` is
    /// not a run and leaves the flag alone.
    fn next_job(&mut self) -> Job {
        let mut c = self.link.lock();
        if c.shutdown {
            return Job::Shutdown;
        }
        if c.clear_pending {
            c.clear_pending = false;
            if self.source.take().is_some() {
                log::debug!("Animation source released");
            }
            self.link.post(PresentEvent::Cleared);
        }
        if let Some(source) = c.incoming.take() {
            // The old source is dropped here, after its run has ended.
            self.source = Some(source);
            self.generation = c.generation;
        }
        let Some(source) = self.source.as_mut() else {
            return Job::Wait;
        };
        if c.animating {
            c.worker_active = true;
            return Job::Play;
        }
        if c.reset_loop {
            c.reset_loop = false;
            source.reset_loop_index();
        }
        if let Some(index) = c.seek.take() {
            return Job::Render(index);
        }
        Job::Wait
    }

    fn play_activation(&mut self) {
        let (on_start, on_stop) = {
            let c = self.link.lock();
            (c.on_start.clone(), c.on_stop.clone())
        };
        let generation = self.generation;

        {
            let _active = ActiveGuard::new(&self.link.shared);
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                if let Some(handler) = &on_start {
                    handler();
                }
                if let Some(source) = self.source.as_deref_mut() {
                    play(&self.link, source, generation);
                }
            }));
            if let Err(payload) = outcome {
                log::error!(
                    "Playback run panicked: {}",
                    panic_message(payload.as_ref())
                );
                finish(&self.link, generation);
            }
        }

        if let Some(handler) = &on_stop {
            if catch_unwind(AssertUnwindSafe(|| handler())).is_err() {
                log::error!("Animation stop handler panicked");
            }
        }
    }

    fn render_activation(&mut self, index: usize) {
        let generation = self.generation;
        let Some(source) = self.source.as_deref_mut() else {
            return;
        };
        let transform = self.link.lock().transform.clone();
        if !source.set_frame_index(index) {
            log::warn!("Seek to frame {index} refused by source");
            return;
        }
        let delay_ms = source.next_delay_ms();
        match decode(source, transform.as_deref(), index) {
            Ok(frame) => {
                if self.link.lock().is_current(generation) {
                    self.link.publish(PlaybackFrame {
                        index,
                        delay_ms,
                        frame,
                    });
                }
            }
            Err(e) => log::warn!("Skipping {e}"),
        }
    }
}

/// Decode the frame under the cursor and run the transform on it.
fn decode(
    source: &mut dyn FrameSource,
    transform: Option<&dyn FrameTransform>,
    index: usize,
) -> Result<DecodedFrame, FrameError> {
    let frame = match catch_unwind(AssertUnwindSafe(|| source.next_frame())) {
        Ok(result) => result?,
        Err(payload) => {
            return Err(FrameError::Panicked {
                index,
                reason: panic_message(payload.as_ref()),
            });
        }
    };
    match transform {
        Some(t) => transform::apply(t, frame, index),
        None => Ok(frame),
    }
}

/// The decode / pace loop for one run. Returns when the host stops or replaces the
/// animation, or when the source's loop count is fulfilled.
fn play(link: &Link, source: &mut dyn FrameSource, generation: u64) {
    let frame_count = source.frame_count();
    if frame_count == 0 {
        log::debug!("Nothing to animate");
        finish(link, generation);
        return;
    }

    while let Some(tick) = link.checkpoint(generation) {
        if tick.reset_loop {
            source.reset_loop_index();
        }
        if let Some(index) = tick.seek {
            if !source.set_frame_index(index) {
                log::warn!("Seek to frame {index} refused by source");
            }
        }

        let started = Instant::now();
        let index = source.current_index();
        // Delay of the frame being shown, read before the cursor moves
        let delay_ms = tick
            .frame_duration
            .unwrap_or_else(|| source.next_delay_ms());

        match decode(source, tick.transform.as_deref(), index) {
            Ok(frame) => {
                if !link.keeps_playing(generation) {
                    break;
                }
                link.publish(PlaybackFrame {
                    index,
                    delay_ms,
                    frame,
                });
            }
            Err(e) => log::warn!("Skipping {e}"),
        }

        // The cursor only moves past frames that were shown or failed
        if !source.advance() {
            log::debug!("Loop count fulfilled");
            finish(link, generation);
            break;
        }

        // Decode and transform time is part of the frame's budget. Behind schedule: no sleep.
        let deadline = started + Duration::from_millis(delay_ms);
        if Instant::now() < deadline {
            link.pace(deadline, generation);
        }
    }
}

/// The run ended on its own: stop animating unless the host has moved on already.
fn finish(link: &Link, generation: u64) {
    let mut c = link.lock();
    if c.is_current(generation) {
        c.animating = false;
    }
}

//! Timeline playback through an [`InputSink`]

use crate::config::{secs_saturating, PlaybackConfig};
use crate::events::Event;
use crate::timeline::Timeline;
use loopkey_core::{ButtonAction, Error, InputSink, Result};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep; bounds cancellation latency
pub const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleep for `duration` in slices of at most [`CANCEL_POLL`].
/// Returns false if cancelled before the full duration elapsed.
///
/// A duration too long to represent as a deadline sleeps until cancelled.
pub fn sleep_cancellable(duration: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                (deadline - now).min(CANCEL_POLL)
            }
            None => CANCEL_POLL,
        };
        thread::sleep(slice);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackReport {
    pub status: PlaybackStatus,
    /// Passes that ran to the end
    pub passes: u32,
    pub keys: usize,
    pub moves: usize,
    pub clicks: usize,
    pub scrolls: usize,
    /// Button down/up transitions, which are not synthesized
    pub skipped: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl PlaybackReport {
    fn new() -> Self {
        Self {
            status: PlaybackStatus::Completed,
            passes: 0,
            keys: 0,
            moves: 0,
            clicks: 0,
            scrolls: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == PlaybackStatus::Cancelled
    }
}

/// Replays timelines
#[derive(Clone)]
pub struct Player {
    sink: Arc<dyn InputSink>,
}

impl Player {
    pub fn new(sink: Arc<dyn InputSink>) -> Self {
        Self { sink }
    }

    /// Play `timeline` on the calling thread.
    ///
    /// Cancellation is reported through [`PlaybackStatus::Cancelled`], not as
    /// an error. A synthesis failure aborts playback.
    pub fn play(
        &self,
        timeline: &Timeline,
        config: &PlaybackConfig,
        cancel: &CancelToken,
    ) -> Result<PlaybackReport> {
        check(timeline, config)?;

        let started = Instant::now();
        let mut report = PlaybackReport::new();
        let passes = config.effective_repeat_count();
        tracing::info!(
            events = timeline.len(),
            speed = config.speed_multiplier,
            passes = ?(!config.loop_indefinitely).then_some(passes),
            "playback started"
        );

        let finished = self.run(timeline, config, cancel, &mut report, passes)?;
        if !finished {
            report.status = PlaybackStatus::Cancelled;
        }
        report.elapsed = started.elapsed();

        tracing::info!(
            status = ?report.status,
            passes = report.passes,
            elapsed = ?report.elapsed,
            "playback finished"
        );
        Ok(report)
    }

    /// Returns false if cancelled
    fn run(
        &self,
        timeline: &Timeline,
        config: &PlaybackConfig,
        cancel: &CancelToken,
        report: &mut PlaybackReport,
        passes: u32,
    ) -> Result<bool> {
        if !config.start_delay().is_zero() {
            tracing::debug!(delay = ?config.start_delay(), "waiting before first pass");
            if !sleep_cancellable(config.start_delay(), cancel) {
                return Ok(false);
            }
        }

        let mut pass = 0u32;
        loop {
            if !self.pass(timeline, config.speed_multiplier, cancel, report)? {
                return Ok(false);
            }
            pass += 1;
            report.passes = pass;

            if !config.loop_indefinitely && pass >= passes {
                return Ok(true);
            }
            if !sleep_cancellable(config.repeat_delay(), cancel) {
                return Ok(false);
            }
        }
    }

    /// One pass over the timeline. Returns false if cancelled.
    fn pass(
        &self,
        timeline: &Timeline,
        speed: f64,
        cancel: &CancelToken,
        report: &mut PlaybackReport,
    ) -> Result<bool> {
        let mut last_offset = 0.0;

        for event in timeline {
            let offset = event.time_offset();
            let wait = (offset - last_offset) / speed;
            if wait > 0.0 && !sleep_cancellable(secs_saturating(wait), cancel) {
                return Ok(false);
            }
            if cancel.is_cancelled() {
                return Ok(false);
            }
            self.synthesize(event, report)?;
            last_offset = offset;
        }
        Ok(true)
    }

    fn synthesize(&self, event: &Event, report: &mut PlaybackReport) -> Result<()> {
        tracing::trace!(?event, "synthesize");
        match event {
            Event::Key { key, .. } => {
                self.sink.key_down(key)?;
                self.sink.key_up(key)?;
                report.keys += 1;
            }
            Event::PointerMove { x, y, .. } => {
                self.sink.set_pointer_position(*x, *y)?;
                report.moves += 1;
            }
            Event::PointerButton {
                button,
                action,
                x,
                y,
                ..
            } => match action {
                ButtonAction::Click => {
                    self.sink.set_pointer_position(*x, *y)?;
                    self.sink.click(*button)?;
                    report.clicks += 1;
                }
                ButtonAction::DoubleClick => {
                    self.sink.set_pointer_position(*x, *y)?;
                    self.sink.double_click(*button)?;
                    report.clicks += 1;
                }
                ButtonAction::Down | ButtonAction::Up => report.skipped += 1,
            },
            Event::Scroll { delta, .. } => {
                self.sink.scroll(*delta)?;
                report.scrolls += 1;
            }
        }
        Ok(())
    }
}

fn check(timeline: &Timeline, config: &PlaybackConfig) -> Result<()> {
    if timeline.is_empty() {
        return Err(Error::EmptyTimeline);
    }
    config.validate()
}

/// Playback running on its own thread
pub struct PlaybackHandle {
    token: CancelToken,
    thread: Option<thread::JoinHandle<Result<PlaybackReport>>>,
}

/// Start playback on a background thread. Validation errors are returned
/// here, before anything is spawned.
pub fn spawn_playback(
    player: Player,
    timeline: Timeline,
    config: PlaybackConfig,
) -> Result<PlaybackHandle> {
    check(&timeline, &config)?;

    let token = CancelToken::new();
    let worker_token = token.clone();
    let thread = thread::Builder::new()
        .name("loopkey-playback".to_string())
        .spawn(move || player.play(&timeline, &config, &worker_token))?;

    Ok(PlaybackHandle {
        token,
        thread: Some(thread),
    })
}

impl PlaybackHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for playback to end
    pub fn join(mut self) -> Result<PlaybackReport> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<PlaybackReport> {
        let Some(thread) = self.thread.take() else {
            return Err(Error::Synthesis("playback already joined".to_string()));
        };
        thread
            .join()
            .map_err(|_| Error::Synthesis("playback worker panicked".to_string()))?
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.token.cancel();
            let _ = self.join_inner();
        }
    }
}

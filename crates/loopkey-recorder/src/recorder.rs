//! Capture engine
//!
//! Raw notifications arrive from an [`InputSource`] over a bounded channel and
//! are normalized on a dedicated worker thread, so a slow consumer never
//! stalls the OS hook. The worker owns the [`InputSubscription`]; however the
//! session ends (stop request, stop key, source hang-up, panic) the hooks
//! are removed exactly once.

use crate::config::RecordingFilterConfig;
use crate::events::Event;
use crate::timeline::Timeline;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use loopkey_core::{
    Error, InputSource, InputSubscription, Interest, KeyId, RawEvent, RawInput, Result,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often the worker re-checks the stop flag while the channel is quiet
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const DEFAULT_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// The designated stop key was pressed
    StopKey,
    /// The input source dropped its end of the channel
    SourceClosed,
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub timeline: Timeline,
    pub reason: StopReason,
    pub elapsed: Duration,
}

/// Builds capture sessions
pub struct MacroRecorder {
    source: Arc<dyn InputSource>,
    filter: RecordingFilterConfig,
    stop_key: Option<KeyId>,
    buffer: usize,
}

impl MacroRecorder {
    pub fn new(source: Arc<dyn InputSource>) -> Self {
        Self {
            source,
            filter: RecordingFilterConfig::default(),
            stop_key: Some(KeyId::new("esc")),
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn filter(mut self, filter: RecordingFilterConfig) -> Self {
        self.filter = filter;
        self
    }

    /// Key that ends the session; `None` means only `stop()` ends it
    pub fn stop_key(mut self, key: Option<KeyId>) -> Self {
        self.stop_key = key;
        self
    }

    /// Channel capacity between the hook and the worker
    pub fn buffer(mut self, capacity: usize) -> Self {
        self.buffer = capacity.max(1);
        self
    }

    /// Start a session. On error nothing is left subscribed.
    pub fn start(&self) -> Result<RecordingHandle> {
        self.filter.validate()?;

        // the keyboard hook is also needed to see the stop key
        let interest = Interest {
            keyboard: self.filter.capture_keyboard || self.stop_key.is_some(),
            pointer: self.filter.capture_pointer,
        };

        let (tx, rx) = bounded::<RawEvent>(self.buffer);
        let started = Instant::now();
        let subscription = InputSubscription::acquire(self.source.clone(), interest, tx)?;

        let stop = Arc::new(AtomicBool::new(false));
        let events = Arc::new(AtomicUsize::new(0));
        let normalizer = Normalizer::new(self.filter.clone(), self.stop_key.clone(), started);

        let worker = CaptureWorker {
            rx,
            normalizer,
            stop: stop.clone(),
            events: events.clone(),
            started,
        };
        let thread = thread::Builder::new()
            .name("loopkey-capture".to_string())
            .spawn(move || {
                // outlives `run`, so the subscription is gone first, also on unwind
                let _ended = EndedOnExit(worker.stop.clone());
                worker.run(subscription)
            })?;

        tracing::info!(?interest, stop_key = ?self.stop_key, "recording started");
        Ok(RecordingHandle {
            stop,
            events,
            started,
            thread: Some(thread),
        })
    }
}

/// A running capture session
pub struct RecordingHandle {
    stop: Arc<AtomicBool>,
    events: Arc<AtomicUsize>,
    started: Instant,
    thread: Option<thread::JoinHandle<CaptureOutcome>>,
}

impl RecordingHandle {
    /// False once the session ended, including by stop key
    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }

    /// Events appended so far
    pub fn event_count(&self) -> usize {
        self.events.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Block until the session ends on its own or `timeout` passes.
    /// Returns true if it ended.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
        true
    }

    /// End the session and collect the timeline
    pub fn stop(mut self) -> Result<CaptureOutcome> {
        self.stop.store(true, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the session to end by itself (stop key or source hang-up)
    pub fn wait(mut self) -> Result<CaptureOutcome> {
        self.join()
    }

    fn join(&mut self) -> Result<CaptureOutcome> {
        let Some(thread) = self.thread.take() else {
            return Err(Error::Subscription("capture session already collected".to_string()));
        };
        thread
            .join()
            .map_err(|_| Error::Subscription("capture worker panicked".to_string()))
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop.store(true, Ordering::SeqCst);
            let _ = thread.join();
        }
    }
}

struct CaptureWorker {
    rx: Receiver<RawEvent>,
    normalizer: Normalizer,
    stop: Arc<AtomicBool>,
    events: Arc<AtomicUsize>,
    started: Instant,
}

/// Marks the session ended however the worker exits
struct EndedOnExit(Arc<AtomicBool>);

impl Drop for EndedOnExit {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl CaptureWorker {
    fn run(mut self, subscription: InputSubscription) -> CaptureOutcome {
        let mut timeline = Timeline::new();

        let mut reason = loop {
            if self.stop.load(Ordering::SeqCst) {
                break StopReason::Requested;
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(raw) => {
                    if self.apply(&raw, &mut timeline) {
                        break StopReason::StopKey;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break StopReason::SourceClosed,
            }
        };

        subscription.release();

        // notifications that were already queued when stop was requested
        if reason == StopReason::Requested {
            while let Ok(raw) = self.rx.try_recv() {
                if self.apply(&raw, &mut timeline) {
                    reason = StopReason::StopKey;
                    break;
                }
            }
        }

        let elapsed = self.started.elapsed();
        tracing::info!(events = timeline.len(), ?reason, ?elapsed, "recording stopped");
        CaptureOutcome {
            timeline,
            reason,
            elapsed,
        }
    }

    /// Returns true if the stop key was hit
    fn apply(&mut self, raw: &RawEvent, timeline: &mut Timeline) -> bool {
        match self.normalizer.step(raw) {
            Step::Append(event) => {
                tracing::trace!(?event, "captured");
                timeline.push(event);
                self.events.fetch_add(1, Ordering::Relaxed);
                false
            }
            Step::Stop => true,
            Step::Ignore => false,
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum Step {
    Append(Event),
    Stop,
    Ignore,
}

/// Turns raw notifications into timeline events per the filter config
pub(crate) struct Normalizer {
    filter: RecordingFilterConfig,
    stop_key: Option<KeyId>,
    started: Instant,
    last_move: Option<(i32, i32)>,
}

impl Normalizer {
    pub(crate) fn new(
        filter: RecordingFilterConfig,
        stop_key: Option<KeyId>,
        started: Instant,
    ) -> Self {
        Self {
            filter,
            stop_key,
            started,
            last_move: None,
        }
    }

    pub(crate) fn step(&mut self, raw: &RawEvent) -> Step {
        let time_offset = raw.at.saturating_duration_since(self.started).as_secs_f64();

        match &raw.input {
            RawInput::KeyDown(key) => {
                if self.stop_key.as_ref() == Some(key) {
                    return Step::Stop;
                }
                if !self.filter.capture_keyboard {
                    return Step::Ignore;
                }
                Step::Append(Event::Key {
                    key: key.clone(),
                    time_offset,
                })
            }

            // playback synthesizes the release
            RawInput::KeyUp(_) => Step::Ignore,

            RawInput::Button {
                button,
                action,
                x,
                y,
            } => {
                if !(self.filter.capture_pointer && self.filter.capture_pointer_clicks) {
                    return Step::Ignore;
                }
                Step::Append(Event::PointerButton {
                    button: *button,
                    action: *action,
                    x: *x,
                    y: *y,
                    time_offset,
                })
            }

            RawInput::Move { x, y } => {
                if !(self.filter.capture_pointer && self.filter.capture_pointer_movement) {
                    return Step::Ignore;
                }
                if let Some((lx, ly)) = self.last_move {
                    let dx = f64::from(*x) - f64::from(lx);
                    let dy = f64::from(*y) - f64::from(ly);
                    if (dx * dx + dy * dy).sqrt() < self.filter.movement_threshold_px {
                        return Step::Ignore;
                    }
                }
                self.last_move = Some((*x, *y));
                Step::Append(Event::PointerMove {
                    x: *x,
                    y: *y,
                    time_offset,
                })
            }

            RawInput::Wheel { delta } => {
                if !(self.filter.capture_pointer && self.filter.capture_pointer_scroll) {
                    return Step::Ignore;
                }
                Step::Append(Event::Scroll {
                    delta: *delta,
                    time_offset,
                })
            }
        }
    }
}

/// Idle/Recording state machine around [`MacroRecorder`]
pub struct CaptureEngine {
    recorder: MacroRecorder,
    session: Option<RecordingHandle>,
}

impl CaptureEngine {
    pub fn new(recorder: MacroRecorder) -> Self {
        Self {
            recorder,
            session: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.as_ref().is_some_and(RecordingHandle::is_running)
    }

    pub fn event_count(&self) -> usize {
        self.session.as_ref().map_or(0, RecordingHandle::event_count)
    }

    /// Idle → Recording. Fails with `Busy` if a session is running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_recording() {
            return Err(Error::Busy("already recording".to_string()));
        }
        if let Some(old) = self.session.take() {
            // ended by stop key but never collected
            if let Ok(outcome) = old.wait() {
                tracing::warn!(events = outcome.timeline.len(), "discarding uncollected recording");
            }
        }
        self.session = Some(self.recorder.start()?);
        Ok(())
    }

    /// Recording → Idle. While Idle this returns an empty timeline.
    pub fn stop(&mut self) -> Result<Timeline> {
        match self.session.take() {
            Some(session) => session.stop().map(|o| o.timeline),
            None => Ok(Timeline::new()),
        }
    }

    /// Collect a session that ended by itself, if any
    pub fn take_finished(&mut self) -> Option<Result<CaptureOutcome>> {
        if self.session.as_ref().is_some_and(|s| !s.is_running()) {
            self.session.take().map(RecordingHandle::wait)
        } else {
            None
        }
    }

    pub fn set_recorder(&mut self, recorder: MacroRecorder) -> Result<()> {
        if self.is_recording() {
            return Err(Error::Busy("cannot reconfigure while recording".to_string()));
        }
        self.recorder = recorder;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopkey_core::{ButtonAction, MouseButton};

    fn raw(started: Instant, ms: u64, input: RawInput) -> RawEvent {
        RawEvent {
            at: started + Duration::from_millis(ms),
            input,
        }
    }

    fn normalizer(filter: RecordingFilterConfig) -> (Normalizer, Instant) {
        let started = Instant::now();
        (Normalizer::new(filter, Some(KeyId::new("esc")), started), started)
    }

    #[test]
    fn test_key_down_recorded_with_offset() {
        let (mut n, t0) = normalizer(RecordingFilterConfig::default());
        let step = n.step(&raw(t0, 1500, RawInput::KeyDown("a".into())));
        assert_eq!(
            step,
            Step::Append(Event::Key {
                key: "a".into(),
                time_offset: 1.5
            })
        );
        assert_eq!(n.step(&raw(t0, 1600, RawInput::KeyUp("a".into()))), Step::Ignore);
    }

    #[test]
    fn test_stop_key_never_recorded() {
        let (mut n, t0) = normalizer(RecordingFilterConfig::default());
        assert_eq!(n.step(&raw(t0, 10, RawInput::KeyDown("esc".into()))), Step::Stop);
    }

    #[test]
    fn test_stop_key_works_without_keyboard_capture() {
        let filter = RecordingFilterConfig {
            capture_keyboard: false,
            ..Default::default()
        };
        let (mut n, t0) = normalizer(filter);
        assert_eq!(n.step(&raw(t0, 1, RawInput::KeyDown("a".into()))), Step::Ignore);
        assert_eq!(n.step(&raw(t0, 2, RawInput::KeyDown("esc".into()))), Step::Stop);
    }

    #[test]
    fn test_movement_threshold() {
        let (mut n, t0) = normalizer(RecordingFilterConfig::default());
        let mut recorded = Vec::new();
        for (i, (x, y)) in [(0, 0), (3, 0), (3, 4), (6, 8), (20, 8)].into_iter().enumerate() {
            if let Step::Append(Event::PointerMove { x, y, .. }) =
                n.step(&raw(t0, i as u64, RawInput::Move { x, y }))
            {
                recorded.push((x, y));
            }
        }
        // (3,0) is 3px from the origin; (3,4) is exactly 5px; (6,8) is 5px from (3,4)
        assert_eq!(recorded, vec![(0, 0), (3, 4), (6, 8), (20, 8)]);
    }

    #[test]
    fn test_pointer_filters() {
        let filter = RecordingFilterConfig {
            capture_pointer_clicks: false,
            capture_pointer_scroll: false,
            ..Default::default()
        };
        let (mut n, t0) = normalizer(filter);
        let click = RawInput::Button {
            button: MouseButton::Left,
            action: ButtonAction::Click,
            x: 1,
            y: 2,
        };
        assert_eq!(n.step(&raw(t0, 1, click)), Step::Ignore);
        assert_eq!(n.step(&raw(t0, 2, RawInput::Wheel { delta: 1 })), Step::Ignore);
        assert!(matches!(
            n.step(&raw(t0, 3, RawInput::Move { x: 1, y: 1 })),
            Step::Append(_)
        ));
    }

    #[test]
    fn test_events_before_start_clamp_to_zero() {
        let started = Instant::now() + Duration::from_secs(1);
        let mut n = Normalizer::new(RecordingFilterConfig::default(), None, started);
        let step = n.step(&RawEvent {
            at: Instant::now(),
            input: RawInput::Wheel { delta: 3 },
        });
        assert_eq!(
            step,
            Step::Append(Event::Scroll {
                delta: 3,
                time_offset: 0.0
            })
        );
    }
}

//! Frame scheduler.
//!
//! Drives periodic frame submission for one session without overlapping
//! requests:
//!
//! - Fixed tick interval (default 2000 ms). A tick that fires while a
//!   request is still in flight is skipped, never queued, so the pipeline
//!   cannot fall behind real time under a slow network.
//! - Capture failures are silent, non-fatal misses.
//! - Rate-limit and unavailability hints pause submission until the
//!   advertised window passes; the next eligible tick is the retry.
//! - Teardown via [`SchedulerHandle::stop`] cancels future ticks
//!   immediately; an in-flight request is abandoned, not awaited, and its
//!   eventual result never mutates the session.
//!
//! Results are applied to the session in arrival order, which under the
//! at-most-one-in-flight rule is also submission order.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::classify::{ClassificationResult, Classifier};
use crate::error::ClassifyError;
use crate::session::{Session, SessionSummary, TickOutcome};
use crate::source::FrameSource;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(2_000);

/// How often the loop polls for completed results and due ticks.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cap on remote backoff hints. An arbitrary `Retry-After` value must not
/// be able to push the deadline past what `Instant` arithmetic can hold.
const MAX_BACKOFF: Duration = Duration::from_secs(3_600);

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub session_id: String,
    pub tick_interval: Duration,
}

impl SchedulerConfig {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// Counters for health logging. `skipped_busy` + `skipped_backoff` +
/// `capture_misses` + `submitted` account for every elapsed tick.
#[derive(Clone, Debug, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub submitted: u64,
    pub skipped_busy: u64,
    pub skipped_backoff: u64,
    pub capture_misses: u64,
}

struct SharedState {
    session: Session,
    stats: SchedulerStats,
}

/// Owns the tick loop for one session.
pub struct FrameScheduler {
    config: SchedulerConfig,
    source: Box<dyn FrameSource>,
    classifier: Arc<dyn Classifier>,
}

impl FrameScheduler {
    pub fn new(
        config: SchedulerConfig,
        source: Box<dyn FrameSource>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            config,
            source,
            classifier,
        }
    }

    /// Start the scheduler on its own thread.
    pub fn spawn(self) -> Result<SchedulerHandle> {
        let start_ms = crate::now_ms()?;
        let shared = Arc::new(Mutex::new(SharedState {
            session: Session::new(&self.config.session_id, start_ms),
            stats: SchedulerStats::default(),
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let loop_shared = shared.clone();
        let loop_shutdown = shutdown.clone();
        let join = std::thread::spawn(move || {
            run_loop(self, loop_shared, loop_shutdown);
        });

        Ok(SchedulerHandle {
            shared,
            shutdown,
            join: Some(join),
        })
    }
}

/// Handle to a running scheduler. Dropping without `stop` leaves the loop
/// running detached; call `stop` for deterministic teardown.
pub struct SchedulerHandle {
    shared: Arc<Mutex<SharedState>>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Snapshot of the session as of the last applied result.
    pub fn session(&self) -> Session {
        self.shared.lock().expect("scheduler state poisoned").session.clone()
    }

    /// Derived summary, recomputed from current state on every call.
    pub fn summary(&self) -> Result<SessionSummary> {
        let now_ms = crate::now_ms()?;
        Ok(self.session().summary(now_ms))
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.lock().expect("scheduler state poisoned").stats.clone()
    }

    /// Stop ticking and return the final session. Any in-flight request is
    /// abandoned; its result is discarded, never applied.
    pub fn stop(mut self) -> Result<Session> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("scheduler thread panicked"))?;
        }
        Ok(self.session())
    }
}

fn run_loop(mut scheduler: FrameScheduler, shared: Arc<Mutex<SharedState>>, shutdown: Arc<AtomicBool>) {
    let (tx, rx): (
        Sender<Result<ClassificationResult, ClassifyError>>,
        Receiver<Result<ClassificationResult, ClassifyError>>,
    ) = mpsc::channel();

    let mut in_flight = false;
    let mut backoff_until: Option<Instant> = None;
    let mut next_tick = Instant::now();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            // Future ticks cancelled; the worker's eventual send lands in a
            // channel nobody drains and the result is discarded with it.
            break;
        }

        // Apply completed results in arrival order before considering the
        // next tick.
        while let Ok(outcome) = rx.try_recv() {
            in_flight = false;
            backoff_until = apply_outcome(&shared, outcome);
        }

        let now = Instant::now();
        if now >= next_tick {
            next_tick = next_deadline(next_tick, now, scheduler.config.tick_interval);
            tick(&mut scheduler, &shared, &tx, &mut in_flight, &backoff_until);
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Next tick deadline after the one that just fired. Keeps the fixed
/// cadence while the loop runs on time; when the loop fell more than one
/// interval behind (descheduled process), it resynchronizes from `now`
/// instead of firing the accumulated overdue ticks back-to-back.
fn next_deadline(fired: Instant, now: Instant, interval: Duration) -> Instant {
    let scheduled = fired + interval;
    if scheduled > now {
        scheduled
    } else {
        now + interval
    }
}

fn tick(
    scheduler: &mut FrameScheduler,
    shared: &Arc<Mutex<SharedState>>,
    tx: &Sender<Result<ClassificationResult, ClassifyError>>,
    in_flight: &mut bool,
    backoff_until: &Option<Instant>,
) {
    let mut guard = shared.lock().expect("scheduler state poisoned");
    guard.stats.ticks += 1;

    if *in_flight {
        guard.stats.skipped_busy += 1;
        log::debug!("tick skipped: request in flight");
        return;
    }
    if let Some(until) = backoff_until {
        if Instant::now() < *until {
            guard.stats.skipped_backoff += 1;
            log::debug!("tick skipped: backing off");
            return;
        }
    }

    let frame = match scheduler.source.capture() {
        Ok(frame) => frame,
        Err(e) => {
            guard.stats.capture_misses += 1;
            log::debug!("capture miss: {}", e);
            return;
        }
    };
    guard.stats.submitted += 1;
    drop(guard);

    *in_flight = true;
    let classifier = scheduler.classifier.clone();
    let session_id = scheduler.config.session_id.clone();
    let tx = tx.clone();
    std::thread::spawn(move || {
        let outcome = classifier.classify(&frame, &session_id);
        // Frame drops with this thread; nothing is retained.
        let _ = tx.send(outcome);
    });
}

/// Fold one completed request into the session; returns the new backoff
/// deadline when the remote asked for one.
fn apply_outcome(
    shared: &Arc<Mutex<SharedState>>,
    outcome: Result<ClassificationResult, ClassifyError>,
) -> Option<Instant> {
    let (tick_outcome, backoff) = match outcome {
        Ok(result) => (TickOutcome::Classified(result), None),
        Err(err) => {
            let backoff = err
                .retry_after_secs()
                .map(|secs| Instant::now() + Duration::from_secs(secs).min(MAX_BACKOFF));
            if let Some(secs) = err.retry_after_secs() {
                log::info!("classification backoff for {}s: {}", secs, err);
            } else {
                log::debug!("classification attempt failed: {}", err);
            }
            let timestamp_ms = crate::now_ms().unwrap_or_default();
            (
                TickOutcome::Failed {
                    reason: err.kind().to_string(),
                    timestamp_ms,
                },
                backoff,
            )
        }
    };

    let mut guard = shared.lock().expect("scheduler state poisoned");
    guard.session = guard.session.clone().apply(tick_outcome);
    backoff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{BoundingBox, Detection};
    use crate::source::StubSource;
    use crate::WasteCategory;
    use std::sync::atomic::AtomicU64;

    /// Classifier fake with a configurable response delay.
    struct FakeClassifier {
        calls: AtomicU64,
        delay: Duration,
        response: fn() -> Result<ClassificationResult, ClassifyError>,
    }

    impl FakeClassifier {
        fn new(
            delay: Duration,
            response: fn() -> Result<ClassificationResult, ClassifyError>,
        ) -> Self {
            Self {
                calls: AtomicU64::new(0),
                delay,
                response,
            }
        }
    }

    impl Classifier for FakeClassifier {
        fn classify(
            &self,
            _frame: &crate::source::EncodedFrame,
            _session_id: &str,
        ) -> Result<ClassificationResult, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            (self.response)()
        }
    }

    fn organik_result() -> Result<ClassificationResult, ClassifyError> {
        Ok(ClassificationResult {
            detections: vec![Detection {
                id: 0,
                category: WasteCategory::Organik,
                confidence: 0.92,
                bounding_box: BoundingBox {
                    x: 0,
                    y: 0,
                    w: 100,
                    h: 100,
                },
                alternatives: Vec::new(),
            }],
            processing_time_ms: 1,
            session_id: "sess".to_string(),
            timestamp_ms: 0,
        })
    }

    fn spawn_scheduler(
        interval_ms: u64,
        classifier: Arc<FakeClassifier>,
    ) -> SchedulerHandle {
        let config =
            SchedulerConfig::new("sess").with_tick_interval(Duration::from_millis(interval_ms));
        FrameScheduler::new(config, Box::new(StubSource::new()), classifier)
            .spawn()
            .expect("spawn scheduler")
    }

    #[test]
    fn fast_classifier_accumulates_successes() {
        let classifier = Arc::new(FakeClassifier::new(Duration::ZERO, organik_result));
        let handle = spawn_scheduler(30, classifier.clone());
        std::thread::sleep(Duration::from_millis(250));
        let session = handle.stop().unwrap();

        assert!(session.success_count >= 2);
        assert_eq!(session.failure_count, 0);
        assert_eq!(
            session.success_count + session.failure_count,
            session.total_attempts
        );
        assert!(session.category_counts[&WasteCategory::Organik] >= 2);
    }

    #[test]
    fn slow_request_causes_skipped_ticks_not_queueing() {
        // Response takes much longer than the tick interval: ticks must be
        // skipped while the single request is in flight.
        let classifier = Arc::new(FakeClassifier::new(
            Duration::from_millis(400),
            organik_result,
        ));
        let handle = spawn_scheduler(40, classifier.clone());
        std::thread::sleep(Duration::from_millis(300));
        let stats = handle.stats();
        let _ = handle.stop();

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert!(stats.skipped_busy >= 3, "stats: {:?}", stats);
        assert_eq!(stats.submitted, 1);
    }

    #[test]
    fn stop_discards_in_flight_result() {
        let classifier = Arc::new(FakeClassifier::new(
            Duration::from_millis(300),
            organik_result,
        ));
        let handle = spawn_scheduler(20, classifier);
        std::thread::sleep(Duration::from_millis(60));
        // The one submitted request has not resolved yet; stopping now must
        // leave the session untouched by it.
        let session = handle.stop().unwrap();
        assert_eq!(session.total_attempts, 0);
    }

    #[test]
    fn rate_limit_pauses_submission() {
        fn rate_limited() -> Result<ClassificationResult, ClassifyError> {
            Err(ClassifyError::RateLimited {
                retry_after_secs: 60,
            })
        }
        let classifier = Arc::new(FakeClassifier::new(Duration::ZERO, rate_limited));
        let handle = spawn_scheduler(30, classifier.clone());
        std::thread::sleep(Duration::from_millis(300));
        let stats = handle.stats();
        let session = handle.stop().unwrap();

        // One failed attempt recorded, then backoff holds further ticks.
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.failure_count, 1);
        assert!(stats.skipped_backoff >= 1, "stats: {:?}", stats);
    }

    #[test]
    fn absurd_retry_after_hint_does_not_kill_the_loop() {
        // A remote can send any u64 in Retry-After; the deadline math must
        // clamp it rather than overflow the scheduler thread.
        fn worst_case() -> Result<ClassificationResult, ClassifyError> {
            Err(ClassifyError::RateLimited {
                retry_after_secs: u64::MAX,
            })
        }
        let classifier = Arc::new(FakeClassifier::new(Duration::ZERO, worst_case));
        let handle = spawn_scheduler(30, classifier.clone());
        std::thread::sleep(Duration::from_millis(200));

        let session = handle.stop().expect("scheduler thread survived");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.failure_count, 1);
    }

    #[test]
    fn deadline_keeps_cadence_when_on_time() {
        let interval = Duration::from_millis(100);
        let fired = Instant::now();
        let now = fired + Duration::from_millis(5);
        assert_eq!(next_deadline(fired, now, interval), fired + interval);
    }

    #[test]
    fn deadline_resyncs_after_a_lag() {
        // More than one interval behind: the next deadline comes from `now`,
        // so overdue ticks are dropped instead of fired back-to-back.
        let interval = Duration::from_millis(100);
        let fired = Instant::now();
        let now = fired + Duration::from_millis(450);
        assert_eq!(next_deadline(fired, now, interval), now + interval);
    }

    #[test]
    fn failed_attempts_are_recorded_as_session_failures() {
        fn unavailable() -> Result<ClassificationResult, ClassifyError> {
            Err(ClassifyError::Failed("boom".to_string()))
        }
        let classifier = Arc::new(FakeClassifier::new(Duration::ZERO, unavailable));
        let handle = spawn_scheduler(30, classifier);
        std::thread::sleep(Duration::from_millis(200));
        let session = handle.stop().unwrap();

        assert!(session.failure_count >= 1);
        assert_eq!(session.success_count, 0);
        assert_eq!(
            session.success_count + session.failure_count,
            session.total_attempts
        );
    }
}

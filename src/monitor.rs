//! Monitor loop state machine
//!
//! Drives the whole tool: polls the memory probe on a cadence, compares
//! against the threshold, triggers the platform cleaner, applies the
//! settle delay and cooldown, and reports every outcome through the
//! injected [`Reporter`].
//!
//! The loop is a single logical task. Its only suspension points are the
//! check-interval wait, the post-clean cooldown wait and the short settle
//! pause; every wait races against a shutdown channel so an interrupt
//! mid-wait terminates promptly as a normal shutdown.

use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::{MonitorConfig, RunMode};
use crate::platform::{self, CleanResult, MemoryCleaner};
use crate::probe::{MemoryProbe, MemorySample};
use crate::report::Reporter;

/// Loop phase. Transitions are strictly sequential; the loop never
/// re-enters `Cleaning` while a clean is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    BelowThreshold,
    AtOrAboveThreshold,
    Cleaning,
    Cooldown,
    Terminated,
}

/// The single piece of mutable loop state: current phase and the
/// monotonic start instant used for uptime reporting.
#[derive(Debug, Clone, Copy)]
struct MonitorState {
    phase: Phase,
    started: Instant,
}

/// Before/after record of one clean attempt.
#[derive(Debug, Clone)]
pub struct CleanRecord {
    pub before_bytes: u64,
    pub after_bytes: u64,
    /// Clamped at zero: a rise in usage during the settle window must
    /// never be reported as negative freed memory.
    pub freed_bytes: u64,
    pub before_percent: f64,
    pub after_percent: f64,
    pub result: CleanResult,
}

impl CleanRecord {
    fn new(before: &MemorySample, after: &MemorySample, result: CleanResult) -> Self {
        Self {
            before_bytes: before.used_bytes,
            after_bytes: after.used_bytes,
            freed_bytes: before.used_bytes.saturating_sub(after.used_bytes),
            before_percent: before.percent,
            after_percent: after.percent,
            result,
        }
    }
}

/// Unexpected in-iteration faults. These terminate the loop after being
/// logged; an unknown fault retried forever would mask a real problem.
#[derive(Debug, Clone)]
pub enum MonitorError {
    /// Probe returned a sample that cannot be interpreted
    InvalidSample(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::InvalidSample(msg) => write!(f, "invalid memory sample: {}", msg),
        }
    }
}

impl std::error::Error for MonitorError {}

/// The monitor/trigger state machine.
pub struct MonitorLoop<P, R> {
    config: MonitorConfig,
    probe: P,
    cleaner: Box<dyn MemoryCleaner>,
    reporter: R,
    state: MonitorState,
}

impl<P: MemoryProbe, R: Reporter> MonitorLoop<P, R> {
    pub fn new(config: MonitorConfig, probe: P, cleaner: Box<dyn MemoryCleaner>, reporter: R) -> Self {
        Self {
            config,
            probe,
            cleaner,
            reporter,
            state: MonitorState {
                phase: Phase::Idle,
                started: Instant::now(),
            },
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Run until interrupted (continuous) or to completion (single-shot).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), MonitorError> {
        self.state.started = Instant::now();
        self.reporter
            .startup(platform::host_os(), self.cleaner.name(), self.config.threshold);

        let outcome = match self.config.mode {
            RunMode::SingleShot => self.run_once(&mut shutdown).await,
            RunMode::Continuous => self.run_continuous(&mut shutdown).await,
        };
        self.state.phase = Phase::Terminated;
        outcome
    }

    /// Single-shot mode: always attempt exactly one clean, regardless of
    /// the current percentage. Used for operator-driven verification.
    async fn run_once(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), MonitorError> {
        self.state.phase = Phase::Sampling;
        let before = self.take_sample()?;
        self.reporter
            .sample(self.uptime_secs(), &before, self.config.threshold);

        let record = self.clean_and_measure(&before, shutdown).await?;
        self.reporter.clean_outcome(&record);

        self.reporter.shutdown("single-shot complete");
        Ok(())
    }

    async fn run_continuous(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), MonitorError> {
        loop {
            if *shutdown.borrow() {
                self.reporter.shutdown("interrupt");
                return Ok(());
            }

            self.state.phase = Phase::Sampling;
            let sample = self.take_sample()?;
            self.reporter
                .sample(self.uptime_secs(), &sample, self.config.threshold);

            // Inclusive comparison: a sample exactly at threshold triggers
            if sample.percent >= f64::from(self.config.threshold) {
                self.state.phase = Phase::AtOrAboveThreshold;
                self.reporter.threshold_crossed(&sample);

                let record = self.clean_and_measure(&sample, shutdown).await?;
                self.reporter.clean_outcome(&record);

                // Cooldown applies whether or not the attempt succeeded,
                // so a permanently over-threshold system does not trigger
                // rapid repeated privileged calls.
                self.state.phase = Phase::Cooldown;
                if wait_or_shutdown(self.config.cooldown(), shutdown).await {
                    self.reporter.shutdown("interrupt");
                    return Ok(());
                }
            } else {
                self.state.phase = Phase::BelowThreshold;
                if wait_or_shutdown(self.config.check_interval(), shutdown).await {
                    self.reporter.shutdown("interrupt");
                    return Ok(());
                }
            }
        }
    }

    /// Invoke the cleaner, let the system settle, then re-measure.
    ///
    /// An interrupt cuts the settle pause short but never skips the
    /// re-measure: the attempt already happened and must be recorded.
    /// The caller's next wait observes the shutdown flag and exits.
    async fn clean_and_measure(
        &mut self,
        before: &MemorySample,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CleanRecord, MonitorError> {
        self.state.phase = Phase::Cleaning;
        let result = self.cleaner.clean();

        let _ = wait_or_shutdown(self.config.settle(), shutdown).await;

        let after = self.take_sample()?;
        Ok(CleanRecord::new(before, &after, result))
    }

    fn take_sample(&mut self) -> Result<MemorySample, MonitorError> {
        let sample = self.probe.sample();
        if sample.total_bytes == 0 {
            return Err(MonitorError::InvalidSample(
                "probe reported zero total memory".to_string(),
            ));
        }
        Ok(sample)
    }

    fn uptime_secs(&self) -> u64 {
        self.state.started.elapsed().as_secs()
    }
}

/// Sleep for `duration` unless shutdown is requested first.
/// Returns true if the loop should exit.
async fn wait_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => match changed {
            Ok(()) => *shutdown.borrow(),
            // Sender dropped: treat as shutdown
            Err(_) => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const MB: u64 = 1024 * 1024;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Startup,
        Sample(f64),
        ThresholdCrossed,
        Clean {
            before: u64,
            after: u64,
            freed: u64,
            succeeded: bool,
        },
        Shutdown(String),
    }

    #[derive(Clone)]
    struct RecordingReporter {
        events: Arc<Mutex<Vec<(Event, Instant)>>>,
    }

    impl RecordingReporter {
        fn new() -> Self {
            Self {
                events: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn push(&self, event: Event) {
            self.events.lock().unwrap().push((event, Instant::now()));
        }

        fn events(&self) -> Vec<Event> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(e, _)| e.clone())
                .collect()
        }

        fn timed(&self) -> Vec<(Event, Instant)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Reporter for RecordingReporter {
        fn startup(&mut self, _platform: &str, _cleaner: &str, _threshold: u8) {
            self.push(Event::Startup);
        }

        fn sample(&mut self, _uptime_secs: u64, sample: &MemorySample, _threshold: u8) {
            self.push(Event::Sample(sample.percent));
        }

        fn threshold_crossed(&mut self, _sample: &MemorySample) {
            self.push(Event::ThresholdCrossed);
        }

        fn clean_outcome(&mut self, record: &CleanRecord) {
            self.push(Event::Clean {
                before: record.before_bytes,
                after: record.after_bytes,
                freed: record.freed_bytes,
                succeeded: record.result.succeeded,
            });
        }

        fn shutdown(&mut self, reason: &str) {
            self.push(Event::Shutdown(reason.to_string()));
        }
    }

    /// Serves a fixed script of samples; once exhausted it requests
    /// shutdown and repeats the last sample.
    struct FakeProbe {
        samples: Vec<MemorySample>,
        idx: usize,
        shutdown_tx: Option<watch::Sender<bool>>,
    }

    impl FakeProbe {
        fn new(samples: Vec<MemorySample>, shutdown_tx: Option<watch::Sender<bool>>) -> Self {
            assert!(!samples.is_empty());
            Self {
                samples,
                idx: 0,
                shutdown_tx,
            }
        }
    }

    impl MemoryProbe for FakeProbe {
        fn sample(&mut self) -> MemorySample {
            if self.idx < self.samples.len() {
                let sample = self.samples[self.idx];
                self.idx += 1;
                sample
            } else {
                if let Some(tx) = &self.shutdown_tx {
                    let _ = tx.send(true);
                }
                *self.samples.last().unwrap()
            }
        }
    }

    struct FakeCleaner {
        succeed: bool,
        calls: Arc<AtomicUsize>,
        shutdown_tx: Option<watch::Sender<bool>>,
    }

    impl MemoryCleaner for FakeCleaner {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn clean(&self) -> CleanResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = &self.shutdown_tx {
                let _ = tx.send(true);
            }
            if self.succeed {
                CleanResult::success("fake clean")
            } else {
                CleanResult::failure("permission denied")
            }
        }
    }

    fn pct(percent: u64) -> MemorySample {
        MemorySample::from_bytes(percent * MB, 100 * MB)
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            threshold: 60,
            check_interval_secs: 10,
            cooldown_secs: 60,
            settle_ms: 1000,
            mode: RunMode::Continuous,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_exactly_at_threshold_triggers_clean() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        // 60% with threshold 60: inclusive comparison must trigger
        let probe = FakeProbe::new(vec![pct(60), pct(50), pct(30)], Some(tx));
        let cleaner = FakeCleaner {
            succeed: true,
            calls: calls.clone(),
            shutdown_tx: None,
        };
        let reporter = RecordingReporter::new();

        let mut monitor = MonitorLoop::new(
            test_config(),
            probe,
            Box::new(cleaner),
            reporter.clone(),
        );
        monitor.run(rx).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(reporter.events().contains(&Event::ThresholdCrossed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_threshold_never_cleans() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = FakeProbe::new(vec![pct(10), pct(30), pct(59)], Some(tx));
        let cleaner = FakeCleaner {
            succeed: true,
            calls: calls.clone(),
            shutdown_tx: None,
        };
        let reporter = RecordingReporter::new();

        let mut monitor = MonitorLoop::new(
            test_config(),
            probe,
            Box::new(cleaner),
            reporter.clone(),
        );
        monitor.run(rx).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!reporter.events().contains(&Event::ThresholdCrossed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_freed_is_clamped_when_usage_rises_during_settle() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        // before=8000 MB-units, after=8500: freed must be 0, never negative
        let before = MemorySample::from_bytes(8000, 10000);
        let after = MemorySample::from_bytes(8500, 10000);
        let probe = FakeProbe::new(vec![before, after, pct(30)], Some(tx));
        let cleaner = FakeCleaner {
            succeed: true,
            calls: calls.clone(),
            shutdown_tx: None,
        };
        let reporter = RecordingReporter::new();

        let mut monitor = MonitorLoop::new(
            test_config(),
            probe,
            Box::new(cleaner),
            reporter.clone(),
        );
        monitor.run(rx).await.unwrap();

        let clean = reporter
            .events()
            .into_iter()
            .find(|e| matches!(e, Event::Clean { .. }))
            .expect("clean record");
        assert_eq!(
            clean,
            Event::Clean {
                before: 8000,
                after: 8500,
                freed: 0,
                succeeded: true,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_shot_always_cleans_regardless_of_percent() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        // threshold 50, actual 10%: the attempt must still happen
        let config = MonitorConfig {
            threshold: 50,
            mode: RunMode::SingleShot,
            ..test_config()
        };
        let probe = FakeProbe::new(vec![pct(10), pct(9)], None);
        let cleaner = FakeCleaner {
            succeed: true,
            calls: calls.clone(),
            shutdown_tx: None,
        };
        let reporter = RecordingReporter::new();

        let mut monitor = MonitorLoop::new(config, probe, Box::new(cleaner), reporter.clone());
        monitor.run(rx).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.phase(), Phase::Terminated);

        let events = reporter.events();
        assert!(matches!(events.last(), Some(Event::Shutdown(r)) if r == "single-shot complete"));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Clean { succeeded: true, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_always_follows_clean_attempt() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        // Failing cleaner: cooldown must still apply, and the loop must
        // survive into the next iteration.
        let probe = FakeProbe::new(vec![pct(80), pct(70), pct(30)], Some(tx));
        let cleaner = FakeCleaner {
            succeed: false,
            calls: calls.clone(),
            shutdown_tx: None,
        };
        let reporter = RecordingReporter::new();
        let config = test_config();
        let cooldown = config.cooldown();
        let settle = config.settle();

        let mut monitor = MonitorLoop::new(config, probe, Box::new(cleaner), reporter.clone());
        monitor.run(rx).await.unwrap();

        let timed = reporter.timed();
        let sample_at = |i: usize| {
            timed
                .iter()
                .filter(|(e, _)| matches!(e, Event::Sample(_)))
                .nth(i)
                .map(|(_, t)| *t)
                .unwrap()
        };
        let clean_at = timed
            .iter()
            .find(|(e, _)| matches!(e, Event::Clean { .. }))
            .map(|(_, t)| *t)
            .unwrap();

        // Clean record lands after the settle pause
        assert!(clean_at - sample_at(0) >= settle);

        // The failure is recorded, not raised
        assert!(timed
            .iter()
            .any(|(e, _)| matches!(e, Event::Clean { succeeded: false, .. })));

        // Next sample happens only after the full cooldown, never immediately
        let next_sample = sample_at(1);
        assert!(next_sample - clean_at >= cooldown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_mid_cooldown_is_a_normal_shutdown() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = FakeProbe::new(vec![pct(90), pct(85)], None);
        // Cleaner requests shutdown, so the signal lands before the
        // cooldown wait begins
        let cleaner = FakeCleaner {
            succeed: true,
            calls: calls.clone(),
            shutdown_tx: Some(tx),
        };
        let reporter = RecordingReporter::new();
        let config = test_config();
        let cooldown = config.cooldown();

        let mut monitor = MonitorLoop::new(config, probe, Box::new(cleaner), reporter.clone());
        monitor.run(rx).await.unwrap();

        let timed = reporter.timed();
        let (last_event, shutdown_at) = timed.last().unwrap().clone();
        assert_eq!(last_event, Event::Shutdown("interrupt".to_string()));

        // Exited well before the cooldown elapsed
        let clean_at = timed
            .iter()
            .find(|(e, _)| matches!(e, Event::Clean { .. }))
            .map(|(_, t)| *t)
            .unwrap();
        assert!(shutdown_at - clean_at < cooldown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_settle_cuts_the_pause_short() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = FakeProbe::new(vec![pct(90), pct(85)], None);
        // Cleaner requests shutdown before the settle pause begins; the
        // attempt must still be re-measured and recorded, without
        // sleeping out the full settle.
        let cleaner = FakeCleaner {
            succeed: true,
            calls: calls.clone(),
            shutdown_tx: Some(tx),
        };
        let reporter = RecordingReporter::new();
        let config = test_config();
        let settle = config.settle();

        let mut monitor = MonitorLoop::new(config, probe, Box::new(cleaner), reporter.clone());
        monitor.run(rx).await.unwrap();

        let timed = reporter.timed();
        let crossed_at = timed
            .iter()
            .find(|(e, _)| matches!(e, Event::ThresholdCrossed))
            .map(|(_, t)| *t)
            .unwrap();
        let (clean_event, clean_at) = timed
            .iter()
            .find(|(e, _)| matches!(e, Event::Clean { .. }))
            .cloned()
            .unwrap();

        assert!(matches!(clean_event, Event::Clean { succeeded: true, .. }));
        assert!(clean_at - crossed_at < settle);
        assert!(matches!(timed.last(), Some((Event::Shutdown(r), _)) if r == "interrupt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_sample_terminates_with_error() {
        let (_tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = FakeProbe::new(vec![MemorySample::from_bytes(0, 0)], None);
        let cleaner = FakeCleaner {
            succeed: true,
            calls: calls.clone(),
            shutdown_tx: None,
        };
        let reporter = RecordingReporter::new();

        let mut monitor = MonitorLoop::new(
            test_config(),
            probe,
            Box::new(cleaner),
            reporter.clone(),
        );
        let err = monitor.run(rx).await.unwrap_err();
        assert!(matches!(err, MonitorError::InvalidSample(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_starts_idle() {
        let (_tx, _rx) = watch::channel(false);
        let probe = FakeProbe::new(vec![pct(10)], None);
        let cleaner = FakeCleaner {
            succeed: true,
            calls: Arc::new(AtomicUsize::new(0)),
            shutdown_tx: None,
        };
        let monitor = MonitorLoop::new(
            test_config(),
            probe,
            Box::new(cleaner),
            RecordingReporter::new(),
        );
        assert_eq!(monitor.phase(), Phase::Idle);
    }
}

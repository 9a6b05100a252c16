//! Structured event sink for the monitor loop
//!
//! The loop never logs directly; it reports through this trait so the
//! state machine can be tested without real log I/O.

use tracing::{info, warn};

use crate::monitor::CleanRecord;
use crate::platform::format_bytes;
use crate::probe::MemorySample;

/// Event sink injected into [`crate::monitor::MonitorLoop`].
pub trait Reporter: Send {
    /// Startup banner with detected platform, selected cleaner and threshold.
    fn startup(&mut self, platform: &str, cleaner: &str, threshold: u8);

    /// Per-iteration observability line; not a decision input.
    fn sample(&mut self, uptime_secs: u64, sample: &MemorySample, threshold: u8);

    /// Threshold crossed; a clean attempt follows.
    fn threshold_crossed(&mut self, sample: &MemorySample);

    /// Full before/after record of a clean attempt, success or failure.
    fn clean_outcome(&mut self, record: &CleanRecord);

    /// Normal shutdown notice (interrupt or single-shot completion).
    fn shutdown(&mut self, reason: &str);
}

/// Production reporter emitting tracing events.
pub struct TracingReporter;

impl TracingReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for TracingReporter {
    fn startup(&mut self, platform: &str, cleaner: &str, threshold: u8) {
        info!(
            "Starting memsweep on {} (cleaner: {}). Threshold={}%",
            platform, cleaner, threshold
        );
    }

    fn sample(&mut self, uptime_secs: u64, sample: &MemorySample, threshold: u8) {
        info!(
            "Uptime: {}s - RAM usage: {:.1}% (threshold {}%)",
            uptime_secs, sample.percent, threshold
        );
    }

    fn threshold_crossed(&mut self, sample: &MemorySample) {
        info!(
            "Threshold reached at {:.1}% -> attempting clean",
            sample.percent
        );
    }

    fn clean_outcome(&mut self, record: &CleanRecord) {
        info!(
            "RAM bytes before: {} | after: {} | freed: {} ({}) | success: {}",
            record.before_bytes,
            record.after_bytes,
            record.freed_bytes,
            format_bytes(record.freed_bytes),
            record.result.succeeded
        );
        info!(
            "RAM percent before: {:.1}% (after: {:.1}%)",
            record.before_percent, record.after_percent
        );
        if !record.result.succeeded {
            warn!("Clean attempt failed: {}", record.result.detail);
        }
    }

    fn shutdown(&mut self, reason: &str) {
        info!("memsweep shutting down ({})", reason);
    }
}

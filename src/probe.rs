//! System memory probe backed by sysinfo.

use sysinfo::System;

/// An immutable snapshot of system memory utilization.
///
/// `percent` is always derived from the byte counts of the same snapshot;
/// it is never cached across probe calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    /// Physical memory in use, in bytes
    pub used_bytes: u64,
    /// Total physical memory, in bytes
    pub total_bytes: u64,
    /// Utilization as a percentage of total (0.0 - 100.0)
    pub percent: f64,
}

impl MemorySample {
    /// Build a sample from raw byte counts, deriving the percentage.
    pub fn from_bytes(used_bytes: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes > 0 {
            (used_bytes as f64 / total_bytes as f64) * 100.0
        } else {
            0.0
        };
        Self {
            used_bytes,
            total_bytes,
            percent,
        }
    }
}

/// Source of memory samples.
///
/// Implementations must take a fresh reading on every call and must not
/// block beyond the underlying OS query.
pub trait MemoryProbe: Send {
    fn sample(&mut self) -> MemorySample;
}

/// Production probe reading from the OS via the sysinfo crate.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn sample(&mut self) -> MemorySample {
        self.system.refresh_memory();
        MemorySample::from_bytes(self.system.used_memory(), self.system.total_memory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_derivation() {
        let sample = MemorySample::from_bytes(4 * 1024 * 1024 * 1024, 16 * 1024 * 1024 * 1024);
        assert!((sample.percent - 25.0).abs() < f64::EPSILON);

        let sample = MemorySample::from_bytes(3, 8);
        assert!((sample.percent - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_percent_bounds() {
        let empty = MemorySample::from_bytes(0, 8192);
        assert_eq!(empty.percent, 0.0);

        let full = MemorySample::from_bytes(8192, 8192);
        assert!((full.percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_total_does_not_divide() {
        let sample = MemorySample::from_bytes(1024, 0);
        assert_eq!(sample.percent, 0.0);
    }

    #[test]
    fn test_sysinfo_probe_returns_plausible_sample() {
        let mut probe = SysinfoProbe::new();
        let sample = probe.sample();
        assert!(sample.total_bytes > 0);
        assert!(sample.used_bytes <= sample.total_bytes);
        assert!(sample.percent >= 0.0 && sample.percent <= 100.0);
    }
}

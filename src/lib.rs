//! memsweep
//!
//! A cross-platform memory-pressure monitor. The loop samples system
//! memory on a cadence and, at or above a configured threshold, runs the
//! host platform's reclamation action, then cools down before resuming:
//!
//! - **Windows**: trims the current process working set via Win32 APIs
//! - **Linux**: drops pagecache/dentries/inodes via /proc/sys/vm/drop_caches (requires root)
//! - **macOS**: runs the `purge` utility (requires admin)
//!
//! The state machine lives in [`monitor::MonitorLoop`]; platform
//! reclamation variants live under [`platform`].

pub mod config;
pub mod monitor;
pub mod platform;
pub mod probe;
pub mod report;

// Re-exports
pub use config::{ConfigError, MonitorConfig, RunMode};
pub use monitor::{CleanRecord, MonitorError, MonitorLoop, Phase};
pub use platform::{cleaner_for_host, is_elevated, CleanResult, MemoryCleaner, PlatformError};
pub use probe::{MemoryProbe, MemorySample, SysinfoProbe};
pub use report::{Reporter, TracingReporter};

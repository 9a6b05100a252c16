//! macOS cleaner: shell-out to the system purge utility
//!
//! `purge` forces the disk cache to be flushed and emptied, the same as a
//! cold boot. It needs elevated privileges on modern macOS. The
//! invocation is treated as an opaque external call: only the exit status
//! is interpreted, stderr is captured as diagnostic text.

use std::process::Command;
use tracing::debug;

use super::{CleanResult, MemoryCleaner};

const PURGE_BIN: &str = "purge";

pub struct PurgeCleaner;

impl PurgeCleaner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PurgeCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCleaner for PurgeCleaner {
    fn name(&self) -> &'static str {
        "purge"
    }

    fn clean(&self) -> CleanResult {
        match Command::new(PURGE_BIN).output() {
            Ok(output) if output.status.success() => {
                debug!("'{}' completed", PURGE_BIN);
                CleanResult::success(format!("'{}' completed", PURGE_BIN))
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                CleanResult::failure(format!(
                    "'{}' exited with {} (may require sudo): {}",
                    PURGE_BIN,
                    output.status,
                    stderr.trim()
                ))
            }
            Err(e) => CleanResult::failure(format!("failed to run '{}': {}", PURGE_BIN, e)),
        }
    }
}

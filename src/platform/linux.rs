//! Linux cleaner: system-wide cache drop via /proc/sys/vm/drop_caches
//!
//! Flushes dirty pages to disk first, then asks the kernel to release
//! reclaimable pagecache, dentries and inodes. Writing the control file
//! requires root (CAP_SYS_ADMIN); a permission failure is an expected
//! outcome and is reported, not raised.

use std::fs::OpenOptions;
use std::io::{self, Write};
use tracing::debug;

use super::{CleanResult, MemoryCleaner};

const DROP_CACHES_PATH: &str = "/proc/sys/vm/drop_caches";

pub struct CacheDropper;

impl CacheDropper {
    pub fn new() -> Self {
        Self
    }

    /// Write the drop level to the reclaim control file.
    ///
    /// Level 3 releases pagecache plus dentries and inodes.
    fn drop_caches(&self) -> io::Result<()> {
        // Flush dirty pages first so the cache drop reclaims as much as possible
        unsafe {
            libc::sync();
        }

        let mut file = OpenOptions::new().write(true).open(DROP_CACHES_PATH)?;
        file.write_all(b"3")?;
        Ok(())
    }
}

impl Default for CacheDropper {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCleaner for CacheDropper {
    fn name(&self) -> &'static str {
        "cache-drop"
    }

    fn clean(&self) -> CleanResult {
        match self.drop_caches() {
            Ok(()) => {
                debug!("wrote '3' to {}", DROP_CACHES_PATH);
                CleanResult::success(format!("wrote '3' to {}", DROP_CACHES_PATH))
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => CleanResult::failure(
                format!("cannot write {} (requires root): {}", DROP_CACHES_PATH, e),
            ),
            Err(e) => CleanResult::failure(format!("{}: {}", DROP_CACHES_PATH, e)),
        }
    }
}

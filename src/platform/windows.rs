//! Windows cleaner: working-set trim via Win32 APIs
//!
//! Trims the resident memory of *this* process only; it does not touch
//! system-wide caches. Two reclamation calls are made and either one
//! succeeding counts as success, since each can free memory on its own.

use tracing::debug;

use super::{CleanResult, MemoryCleaner};

pub struct WorkingSetTrimmer;

impl WorkingSetTrimmer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WorkingSetTrimmer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCleaner for WorkingSetTrimmer {
    fn name(&self) -> &'static str {
        "working-set-trim"
    }

    fn clean(&self) -> CleanResult {
        use windows::Win32::System::ProcessStatus::EmptyWorkingSet;
        use windows::Win32::System::Threading::{GetCurrentProcess, SetProcessWorkingSetSize};

        let (empty_ok, resize_ok) = unsafe {
            let process = GetCurrentProcess();

            let empty_ok = EmptyWorkingSet(process).is_ok();
            // usize::MAX for both bounds tells the kernel to trim as much as possible
            let resize_ok = SetProcessWorkingSetSize(process, usize::MAX, usize::MAX).is_ok();

            (empty_ok, resize_ok)
        };

        debug!(
            "working-set trim: EmptyWorkingSet={} SetProcessWorkingSetSize={}",
            empty_ok, resize_ok
        );

        let detail = format!(
            "EmptyWorkingSet={} SetProcessWorkingSetSize={}",
            empty_ok, resize_ok
        );

        // Partial success still counts: either call alone can free memory
        if empty_ok || resize_ok {
            CleanResult::success(detail)
        } else {
            CleanResult::failure(detail)
        }
    }
}

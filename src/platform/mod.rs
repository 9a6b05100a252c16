//! Platform abstraction for the memory cleaning action
//!
//! Each supported host OS contributes one [`MemoryCleaner`] variant:
//!
//! ```text
//! src/platform/
//! +-- mod.rs        <- trait, result type, startup lookup, privilege check
//! +-- windows.rs    <- working-set trim of the current process
//! +-- linux.rs      <- sync + /proc/sys/vm/drop_caches
//! +-- macos.rs      <- shell-out to the purge utility
//! ```
//!
//! The variant is selected exactly once at startup by [`cleaner_for_host`];
//! a host without a variant is a startup error, never a silent no-op.

use std::fmt;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "windows")]
pub mod windows;

/// Outcome of a single clean attempt.
///
/// A failed attempt is an expected outcome, not an error: it is reported
/// with `succeeded = false` and the underlying cause in `detail`, and the
/// monitor loop continues.
#[derive(Debug, Clone)]
pub struct CleanResult {
    /// Whether the platform primitive was actually invoked
    pub attempted: bool,
    /// Whether the attempt reclaimed (or plausibly reclaimed) memory
    pub succeeded: bool,
    /// Platform-specific diagnostic text
    pub detail: String,
}

impl CleanResult {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            attempted: true,
            succeeded: true,
            detail: detail.into(),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            attempted: true,
            succeeded: false,
            detail: detail.into(),
        }
    }
}

/// A platform-specific memory reclamation action.
pub trait MemoryCleaner: Send {
    /// Short identifier for log lines (e.g. "working-set-trim")
    fn name(&self) -> &'static str;

    /// Attempt to reclaim memory. Never panics; failure is encoded in
    /// the returned [`CleanResult`].
    fn clean(&self) -> CleanResult;
}

/// Platform-level startup errors.
#[derive(Debug, Clone)]
pub enum PlatformError {
    /// No cleaner variant is registered for this host OS
    Unsupported(String),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Unsupported(os) => {
                write!(f, "no memory cleaner is available for platform '{}'", os)
            }
        }
    }
}

impl std::error::Error for PlatformError {}

/// The host OS identifier used for dispatch and log banners.
pub fn host_os() -> &'static str {
    std::env::consts::OS
}

/// Select the cleaner variant for the host platform.
///
/// Called once at startup; an unsupported host fails fast so the operator
/// sees the configuration error immediately.
pub fn cleaner_for_host() -> Result<Box<dyn MemoryCleaner>, PlatformError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::WorkingSetTrimmer::new()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::CacheDropper::new()))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::PurgeCleaner::new()))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        Err(PlatformError::Unsupported(host_os().to_string()))
    }
}

/// Check whether the current process holds elevated privileges.
///
/// Returns `false` rather than erroring if the check itself cannot be
/// performed; a missing privilege is advisory, not fatal.
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(windows)]
    {
        use std::mem::{size_of, MaybeUninit};
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::Security::{
            GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
        };
        use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

        unsafe {
            let mut token = MaybeUninit::uninit();
            if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, token.as_mut_ptr()).is_err() {
                return false;
            }
            let token = token.assume_init();

            let mut elevation = TOKEN_ELEVATION::default();
            let mut size = 0u32;
            let result = GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut elevation as *mut _ as *mut _),
                size_of::<TOKEN_ELEVATION>() as u32,
                &mut size,
            );
            let _ = CloseHandle(token);
            result.is_ok() && elevation.TokenIsElevated != 0
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

/// Format bytes into a human-readable string for log records.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

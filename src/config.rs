//! Runtime configuration: storage location and client tuning.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding where settings and credentials live.
///
/// Useful when tvctl is embedded in a host application that owns a
/// profile directory.
pub const BASE_DIR_ENV: &str = "TVCTL_BASE_DIR";

/// Default JointSpace v6 API port.
pub const DEFAULT_API_PORT: u16 = 1926;

/// Default ADB debug port on Android TVs.
pub const DEFAULT_ADB_PORT: u16 = 5555;

/// Retry policy for the device client.
///
/// Applies to connection-level failures only; HTTP status errors are never
/// retried because the TV answered and will keep answering the same way.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Resolve the base directory for persisted state.
///
/// Order: `TVCTL_BASE_DIR`, then the running executable's own directory,
/// then the current working directory.
pub fn base_dir() -> PathBuf {
    if let Ok(dir) = env::var(BASE_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(exe) = env::current_exe() {
        if let Some(parent) = exe.parent() {
            return parent.to_path_buf();
        }
    }
    PathBuf::from(".")
}

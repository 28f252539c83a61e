//! spectra-quota - container CPU quota detection (read-only).
//!
//! Docker's stats API reports CPU usage but not the limit placed on a
//! container, so the containers collector (§4.3.7) reads it straight out
//! of the container's cgroup to fill in `cpu_limit_cores`. This crate
//! only reads the quota; it never applies or modifies one.

use thiserror::Error;

#[cfg(target_os = "linux")]
mod linux;

/// Error types for quota operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Quota detection not supported on this platform.
    #[error("quota detection not supported")]
    NotSupported,

    /// The process has no cgroup entry (already exited, or no cgroupfs).
    #[error("process not found: {0}")]
    NotFound(i32),

    /// I/O error reading a cgroup file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for quota operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Read the CPU core limit of the cgroup a process belongs to.
///
/// Returns `None` if the cgroup has no CPU quota set (unlimited cpu.max),
/// or `Ok(None)` on platforms this crate doesn't cover. `cores` is
/// `cpu_quota_us / cpu_period_us`, the same ratio Docker reports when a
/// container is started with `--cpus`.
pub fn cpu_limit_cores(pid: i32) -> Result<Option<f64>> {
    #[cfg(target_os = "linux")]
    {
        linux::cpu_limit_cores(pid)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        Ok(None)
    }
}

#[cfg(test)]
#[cfg(not(target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn non_linux_returns_none_not_an_error() {
        assert_eq!(cpu_limit_cores(1).unwrap(), None);
    }
}

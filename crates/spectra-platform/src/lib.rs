//! Per-OS probe implementations behind the `spectra_types` traits.
//!
//! - Linux: `/proc` and `/sys`.
//! - FreeBSD: `sysctl(3)` and the BSD libc syscalls.
//! - Windows: `windows-sys` and WMI.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "freebsd")]
pub mod bsd;

#[cfg(target_os = "windows")]
pub mod windows;

use spectra_types::PlatformProbes;

/// Builds the probe set for the platform this binary was compiled for.
#[cfg(target_os = "linux")]
pub fn new_platform_probes() -> Box<dyn PlatformProbes> {
    Box::new(linux::LinuxProbes::new())
}

#[cfg(target_os = "freebsd")]
pub fn new_platform_probes() -> Box<dyn PlatformProbes> {
    Box::new(bsd::FreeBsdProbes::new())
}

#[cfg(target_os = "windows")]
pub fn new_platform_probes() -> Box<dyn PlatformProbes> {
    Box::new(windows::WindowsProbes::new())
}

/// Ticks-per-second for the process CPU% formula (§4.2): `sysconf(_SC_CLK_TCK)`
/// on Linux, falling back to the near-universal 100 Hz when the call fails.
/// FreeBSD and Windows use fixed denominators instead
/// (`spectra_delta::TicksPerSecond::Microseconds`/`Filetime100ns`), so this
/// helper only exists on Linux.
#[cfg(target_os = "linux")]
pub fn linux_clk_tck() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 { ticks as u64 } else { 100 }
}

/// Accepts a reported sensor maximum only if it brackets the current
/// reading sanely: `current <= max < 200.0`°C. Sensors on consumer
/// hardware occasionally report a bogus max (0, or the current reading
/// itself); rather than propagate that, the field is dropped (§4.3.9).
pub fn normalize_max_temperature(current_celsius: f64, raw_max_celsius: Option<f64>) -> Option<f64> {
    raw_max_celsius.filter(|&max| current_celsius <= max && max < 200.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_temperature_rejects_max_below_current() {
        assert_eq!(normalize_max_temperature(80.0, Some(70.0)), None);
    }

    #[test]
    fn max_temperature_rejects_implausible_ceiling() {
        assert_eq!(normalize_max_temperature(50.0, Some(250.0)), None);
    }

    #[test]
    fn max_temperature_accepts_sane_bracket() {
        assert_eq!(normalize_max_temperature(50.0, Some(90.0)), Some(90.0));
    }

    #[test]
    fn max_temperature_passes_through_missing() {
        assert_eq!(normalize_max_temperature(50.0, None), None);
    }
}

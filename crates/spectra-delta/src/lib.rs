//! spectra-delta - Counter-delta and rate-derivation engine
//!
//! Pure transformations from `(previous_raw, current_raw, elapsed_seconds)`
//! into normalized metrics. This is the one place monotonicity and
//! rollover policy are enforced (§4.2 of the design). Nothing here performs
//! I/O; every function takes its inputs as plain data and returns either a
//! derived value or a signal to retain the current sample as baseline.

mod cpu;
mod disk_io;
mod network;
mod process;

pub use cpu::{CpuDeltaState, WindowsLoadEma, build_cpu_metric, step_cpu};
pub use disk_io::{DiskIoDeltaState, step_disk_io};
pub use network::{NetworkDeltaState, step_network};
pub use process::{ProcessDeltaState, TicksPerSecond, step_process};

/// `elapsed <= 0` is never an error, just "no sample this tick" (§4.2
/// Numeric policy). Shared by every stepper below.
pub(crate) fn elapsed_is_usable(elapsed_seconds: f64) -> bool {
    elapsed_seconds > 0.0
}

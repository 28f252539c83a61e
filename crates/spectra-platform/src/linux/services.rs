//! systemd service enumeration via `systemctl list-units`.

use spectra_types::{Metric, Result, ServiceMetric};
use std::process::Command;

/// Runs `systemctl list-units --type=service --all --no-legend --no-pager`
/// and parses one record per line: `unit load active sub description...`.
/// Snap-mount and loop-device noise units are filtered out.
pub fn list_services() -> Result<Vec<Metric>> {
    let output = Command::new("systemctl")
        .args(["list-units", "--type=service", "--all", "--no-legend", "--no-pager"])
        .output()
        .map_err(spectra_types::Error::Io)?;

    if !output.status.success() {
        return Ok(Vec::new());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut services = Vec::new();

    for line in stdout.lines() {
        let parts: Vec<&str> = line.splitn(5, char::is_whitespace).filter(|s| !s.is_empty()).collect();
        if parts.len() < 4 {
            continue;
        }
        let name = parts[0].trim_end_matches(".service");
        if name.contains("snap-") || name.contains("-dev-loop") {
            continue;
        }

        services.push(Metric::Service(ServiceMetric {
            name: name.to_string(),
            load_state: parts[1].to_string(),
            status: parts[2].to_string(),
            substatus: parts[3].to_string(),
            description: parts.get(4).unwrap_or(&"").trim().to_string(),
        }));
    }

    Ok(services)
}

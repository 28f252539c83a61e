//! Wi-Fi signal/SSID collection for Linux.
//!
//! Signal and link quality come from `/proc/net/wireless`; SSID, frequency,
//! and bitrate require shelling out to `iw dev {iface} link` since the
//! kernel doesn't expose them through a stable procfs path.

use spectra_types::{Metric, Result, WifiMetric};
use std::fs;
use std::process::Command;

pub fn read_wifi() -> Result<Vec<Metric>> {
    let content = match fs::read_to_string("/proc/net/wireless") {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(spectra_types::Error::Io(e)),
    };

    let mut metrics = Vec::new();

    for line in content.lines().skip(2) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }
        let interface = parts[0].trim_end_matches(':').to_string();
        let link_quality_percent: f64 = parts[2].trim_end_matches('.').parse().unwrap_or(0.0);
        let signal_dbm: i32 = parts[3].trim_end_matches('.').parse().unwrap_or(0);

        let (ssid, frequency_ghz, bitrate_mbps) = read_iw_link(&interface);

        metrics.push(Metric::Wifi(WifiMetric {
            interface,
            ssid,
            signal_dbm,
            link_quality_percent,
            frequency_ghz,
            bitrate_mbps,
        }));
    }

    Ok(metrics)
}

/// Best-effort `iw dev {iface} link` scrape; absence of `iw` or a
/// disconnected interface just yields empty/zero fields, not an error.
fn read_iw_link(interface: &str) -> (String, f64, f64) {
    let Ok(output) = Command::new("iw").args(["dev", interface, "link"]).output() else {
        return (String::new(), 0.0, 0.0);
    };
    let text = String::from_utf8_lossy(&output.stdout);

    let ssid = text
        .lines()
        .find_map(|l| l.trim().strip_prefix("SSID: "))
        .unwrap_or("")
        .to_string();

    let frequency_ghz = text
        .lines()
        .find_map(|l| l.trim().strip_prefix("freq: "))
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|mhz| mhz / 1000.0)
        .unwrap_or(0.0);

    let bitrate_mbps = text
        .lines()
        .find_map(|l| l.trim().strip_prefix("tx bitrate: "))
        .and_then(|s| s.split_whitespace().next())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    (ssid, frequency_ghz, bitrate_mbps)
}

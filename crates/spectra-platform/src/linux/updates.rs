//! Pending-update detection across the major Linux package managers (§4.3.11, §6).

use spectra_types::{Result, UpdatePackage, UpdatesMetric};
use std::path::Path;
use std::process::Command;

/// Checked in order: yum, apt, apk, pacman; first one present wins.
pub fn read_updates() -> Result<UpdatesMetric> {
    if which("yum") {
        return Ok(read_yum());
    }
    if which("apt") {
        return Ok(read_apt());
    }
    if which("apk") {
        return Ok(read_apk());
    }
    if which("pacman") || which("checkupdates") {
        return Ok(read_pacman());
    }

    Ok(UpdatesMetric {
        total_pending: 0,
        security_pending: 0,
        reboot_required: false,
        package_manager: "none".into(),
        packages: Vec::new(),
    })
}

fn which(bin: &str) -> bool {
    Command::new("which").arg(bin).output().map(|o| o.status.success()).unwrap_or(false)
}

/// `"{pkg}/{suite} {version} {arch} [upgradable from: ...]"`; security iff
/// `-security` appears in the suite component.
fn read_apt() -> UpdatesMetric {
    let output = Command::new("apt").args(["list", "--upgradable"]).output();
    let mut packages = Vec::new();
    let mut security_pending = 0;

    if let Ok(output) = output {
        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines().skip(1) {
            let Some((head, _)) = line.split_once(' ') else { continue };
            let Some((name, suite)) = head.split_once('/') else { continue };
            let version = line.split_whitespace().nth(1).unwrap_or("").to_string();
            let security = suite.contains("-security");
            if security {
                security_pending += 1;
            }
            packages.push(UpdatePackage { name: name.to_string(), version, security });
        }
    }

    UpdatesMetric {
        total_pending: packages.len() as u32,
        security_pending,
        reboot_required: Path::new("/var/run/reboot-required").exists(),
        package_manager: "apt".into(),
        packages,
    }
}

/// `"(i/n) Upgrading {pkg} ({old} -> {new})"`; apk never flags security.
fn read_apk() -> UpdatesMetric {
    let output = Command::new("apk").args(["version", "-l", "<"]).output();
    let mut packages = Vec::new();

    if let Ok(output) = output {
        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            if let Some(name) = line.split_whitespace().next() {
                packages.push(UpdatePackage { name: name.to_string(), version: String::new(), security: false });
            }
        }
    }

    UpdatesMetric {
        total_pending: packages.len() as u32,
        security_pending: 0,
        reboot_required: false,
        package_manager: "apk".into(),
        packages,
    }
}

/// `"{pkg} {old} -> {new}"`; pacman never flags security.
fn read_pacman() -> UpdatesMetric {
    let output = Command::new("checkupdates").output();
    let mut packages = Vec::new();

    if let Ok(output) = output {
        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            if let (Some(name), Some(_old), Some(_arrow), Some(new)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            {
                packages.push(UpdatePackage { name: name.to_string(), version: new.to_string(), security: false });
            }
        }
    }

    UpdatesMetric {
        total_pending: packages.len() as u32,
        security_pending: 0,
        reboot_required: false,
        package_manager: "pacman".into(),
        packages,
    }
}

/// Two passes: `updateinfo list security --quiet` seeds the security set,
/// then `check-update --quiet` lists pending `{name.arch} {version} {repo}`.
/// yum's exit code 100 means "updates available" and is treated as success.
fn read_yum() -> UpdatesMetric {
    let security_names: std::collections::HashSet<String> =
        Command::new("yum")
            .args(["updateinfo", "list", "security", "--quiet"])
            .output()
            .map(|o| {
                String::from_utf8_lossy(&o.stdout)
                    .lines()
                    .filter_map(|l| l.split_whitespace().nth(2))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

    let output = Command::new("yum").args(["check-update", "--quiet"]).output();
    let mut packages = Vec::new();

    if let Ok(output) = output {
        let success = output.status.success() || output.status.code() == Some(100);
        if success {
            let text = String::from_utf8_lossy(&output.stdout);
            for line in text.lines() {
                let mut parts = line.split_whitespace();
                let (Some(name_arch), Some(version), Some(_repo)) = (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                let name = name_arch.rsplit_once('.').map(|(n, _)| n).unwrap_or(name_arch);
                let security = security_names.contains(name);
                packages.push(UpdatePackage { name: name.to_string(), version: version.to_string(), security });
            }
        }
    }

    let security_pending = packages.iter().filter(|p| p.security).count() as u32;
    let reboot_required = Command::new("needs-restarting").arg("-r").status().map(|s| s.code() == Some(1)).unwrap_or(false);

    UpdatesMetric {
        total_pending: packages.len() as u32,
        security_pending,
        reboot_required,
        package_manager: "yum".into(),
        packages,
    }
}

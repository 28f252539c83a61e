//! Linux cgroups v1/v2 CPU quota reader.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CgroupVersion {
    V1,
    V2,
    Unknown,
}

fn detect_cgroup_version() -> CgroupVersion {
    if Path::new("/sys/fs/cgroup/cgroup.controllers").exists() {
        return CgroupVersion::V2;
    }
    if Path::new("/sys/fs/cgroup/cpu").exists() {
        return CgroupVersion::V1;
    }
    CgroupVersion::Unknown
}

fn cgroup_path(pid: i32, version: CgroupVersion) -> Result<PathBuf> {
    let content = fs::read_to_string(format!("/proc/{pid}/cgroup")).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound { Error::NotFound(pid) } else { Error::Io(e) }
    })?;

    match version {
        CgroupVersion::V2 => Ok(parse_v2_path(&content)),
        CgroupVersion::V1 => Ok(parse_v1_cpu_path(&content)),
        CgroupVersion::Unknown => Err(Error::NotSupported),
    }
}

/// Format: "0::/path/to/cgroup".
fn parse_v2_path(content: &str) -> PathBuf {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("0::") {
            return PathBuf::from("/sys/fs/cgroup").join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from("/sys/fs/cgroup")
}

/// Format: "hierarchy-id:controller-list:path"; only the line naming the
/// `cpu` controller matters here.
fn parse_v1_cpu_path(content: &str) -> PathBuf {
    for line in content.lines() {
        let parts: Vec<&str> = line.splitn(3, ':').collect();
        if parts.len() == 3 && parts[1].split(',').any(|c| c == "cpu" || c == "cpu,cpuacct") {
            return PathBuf::from("/sys/fs/cgroup/cpu").join(parts[2].trim_start_matches('/'));
        }
    }
    PathBuf::from("/sys/fs/cgroup/cpu")
}

/// cpu.max format: "quota period" or "max period".
fn parse_cpu_max(content: &str) -> Option<(u64, u64)> {
    let mut parts = content.split_whitespace();
    let quota_field = parts.next()?;
    let period: u64 = parts.next()?.parse().ok()?;
    if quota_field == "max" {
        return None;
    }
    Some((quota_field.parse().ok()?, period))
}

fn read_v2_quota(path: &Path) -> Option<(u64, u64)> {
    parse_cpu_max(&fs::read_to_string(path.join("cpu.max")).ok()?)
}

fn read_v1_quota(path: &Path) -> Option<(u64, u64)> {
    let quota: i64 = fs::read_to_string(path.join("cpu.cfs_quota_us")).ok()?.trim().parse().ok()?;
    if quota <= 0 {
        return None;
    }
    let period: u64 = fs::read_to_string(path.join("cpu.cfs_period_us")).ok()?.trim().parse().ok()?;
    Some((quota as u64, period))
}

pub fn cpu_limit_cores(pid: i32) -> Result<Option<f64>> {
    let version = detect_cgroup_version();
    let path = cgroup_path(pid, version)?;

    let quota = match version {
        CgroupVersion::V2 => read_v2_quota(&path),
        CgroupVersion::V1 => read_v1_quota(&path),
        CgroupVersion::Unknown => None,
    };

    Ok(quota.map(|(quota_us, period_us)| quota_us as f64 / period_us as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_finite_cpu_max() {
        assert_eq!(parse_cpu_max("200000 100000\n"), Some((200000, 100000)));
    }

    #[test]
    fn unlimited_cpu_max_is_none() {
        assert_eq!(parse_cpu_max("max 100000\n"), None);
    }

    #[test]
    fn v2_path_strips_leading_slash() {
        assert_eq!(parse_v2_path("0::/user.slice/docker-abc.scope\n"), PathBuf::from("/sys/fs/cgroup/user.slice/docker-abc.scope"));
    }

    #[test]
    fn v1_path_picks_cpu_controller_line() {
        let content = "11:memory:/docker/abc\n5:cpu,cpuacct:/docker/abc\n";
        assert_eq!(parse_v1_cpu_path(content), PathBuf::from("/sys/fs/cgroup/cpu/docker/abc"));
    }
}

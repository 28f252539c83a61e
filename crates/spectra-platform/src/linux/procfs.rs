//! /proc filesystem parsing for Linux.
//!
//! Every function here returns a raw counter record from `spectra_types`.
//! No derivation, no deltas — that is `spectra_delta`'s job.

use spectra_types::{CpuSnapshotRaw, CpuTimesRaw, Error, LoadAvgRaw, MemoryRaw, MountRaw, ProcRaw, RawProcessState, Result};
use std::collections::BTreeMap;
use std::fs;

/// Read `/proc/stat`: aggregate `cpu` line plus each `cpu{N}` line.
pub fn read_cpu_snapshot() -> Result<CpuSnapshotRaw> {
    let content = fs::read_to_string("/proc/stat")?;
    let mut aggregate = None;
    let mut cores = BTreeMap::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 9 {
            continue;
        }
        let Some(label) = parts.first() else { continue };
        if *label == "cpu" {
            aggregate = Some(parse_cpu_times(&parts[1..]));
        } else if let Some(idx) = label.strip_prefix("cpu") {
            if idx.is_empty() {
                continue;
            }
            cores.insert(label.to_string(), parse_cpu_times(&parts[1..]));
        }
    }

    Ok(CpuSnapshotRaw {
        aggregate: aggregate.ok_or_else(|| Error::Platform("missing cpu line in /proc/stat".into()))?,
        cores,
    })
}

fn parse_cpu_times(fields: &[&str]) -> CpuTimesRaw {
    let get = |i: usize| fields.get(i).and_then(|s| s.parse().ok()).unwrap_or(0u64);
    CpuTimesRaw {
        user: get(0),
        nice: get(1),
        system: get(2),
        idle: get(3),
        iowait: get(4),
        irq: get(5),
        softirq: get(6),
        steal: get(7),
        guest: get(8),
        guest_nice: get(9),
    }
}

/// Read `/proc/loadavg`.
pub fn read_load_average() -> Result<LoadAvgRaw> {
    let content = fs::read_to_string("/proc/loadavg")?;
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(Error::Platform("invalid /proc/loadavg format".into()));
    }
    Ok(LoadAvgRaw {
        load_1min: parts[0].parse().unwrap_or(0.0),
        load_5min: parts[1].parse().unwrap_or(0.0),
        load_15min: parts[2].parse().unwrap_or(0.0),
    })
}

/// Read `/proc/meminfo`. Fails if any of the four required keys is absent;
/// first occurrence of a duplicate key wins (the file is not supposed to
/// repeat keys, but this matches the common Go/`procfs` parsing contract).
pub fn read_memory() -> Result<MemoryRaw> {
    let content = fs::read_to_string("/proc/meminfo")?;
    let mut total = None;
    let mut available = None;
    let mut swap_total = None;
    let mut swap_free = None;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let value_kib: u64 = parts[1].parse().unwrap_or(0);
        let value_bytes = value_kib * 1024;
        match parts[0] {
            "MemTotal:" if total.is_none() => total = Some(value_bytes),
            "MemAvailable:" if available.is_none() => available = Some(value_bytes),
            "SwapTotal:" if swap_total.is_none() => swap_total = Some(value_bytes),
            "SwapFree:" if swap_free.is_none() => swap_free = Some(value_bytes),
            _ => {}
        }
    }

    Ok(MemoryRaw {
        total_bytes: total.ok_or_else(|| Error::Platform("MemTotal missing from /proc/meminfo".into()))?,
        available_bytes: available
            .ok_or_else(|| Error::Platform("MemAvailable missing from /proc/meminfo".into()))?,
        swap_total_bytes: swap_total
            .ok_or_else(|| Error::Platform("SwapTotal missing from /proc/meminfo".into()))?,
        swap_free_bytes: swap_free
            .ok_or_else(|| Error::Platform("SwapFree missing from /proc/meminfo".into()))?,
    })
}

/// List numeric entries under `/proc` (the set of live PIDs).
pub fn list_pids() -> Result<Vec<i32>> {
    let mut pids = Vec::new();
    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str()
            && let Ok(pid) = name.parse::<i32>()
        {
            pids.push(pid);
        }
    }
    Ok(pids)
}

/// Read one process's raw counters from `/proc/{pid}/stat` and
/// `/proc/{pid}/status`. Uses the last-`)` split since `comm` may contain
/// spaces or parens.
pub fn read_process(pid: i32) -> Result<ProcRaw> {
    let stat_path = format!("/proc/{pid}/stat");
    let stat = fs::read_to_string(&stat_path).map_err(|e| map_proc_io_err(e, pid))?;

    let open = stat.find('(').ok_or_else(|| Error::Platform(format!("invalid stat for pid {pid}")))?;
    let close = stat.rfind(')').ok_or_else(|| Error::Platform(format!("invalid stat for pid {pid}")))?;
    let name = stat[open + 1..close].to_string();
    let after = &stat[close + 2..];
    let fields: Vec<&str> = after.split_whitespace().collect();

    let state_char = fields.first().and_then(|s| s.chars().next()).unwrap_or('?');
    let utime: u64 = fields.get(11).and_then(|s| s.parse().ok()).unwrap_or(0);
    let stime: u64 = fields.get(12).and_then(|s| s.parse().ok()).unwrap_or(0);
    let num_threads: u32 = fields.get(17).and_then(|s| s.parse().ok()).unwrap_or(0);

    let status = read_process_status(pid)?;

    let raw_state = classify_state(state_char, utime + stime);

    Ok(ProcRaw {
        pid,
        name,
        raw_state,
        cpu_ticks: utime + stime,
        rss_bytes: status.vm_rss,
        num_threads,
        threads_running: u32::from(matches!(raw_state, RawProcessState::LinuxRunning)),
        threads_runnable: u32::from(matches!(raw_state, RawProcessState::LinuxRunnableNoCpu)),
        threads_waiting: u32::from(matches!(raw_state, RawProcessState::LinuxSleeping)),
    })
}

/// §GLOSSARY ProcStatus rule: `R` with cpu ticks > 0 at this sample is
/// Running, `R` with none accrued yet is Runnable.
fn classify_state(state_char: char, cpu_ticks: u64) -> RawProcessState {
    match state_char {
        'R' if cpu_ticks > 0 => RawProcessState::LinuxRunning,
        'R' => RawProcessState::LinuxRunnableNoCpu,
        'S' | 'D' | 'I' | 'W' => RawProcessState::LinuxSleeping,
        'T' | 't' | 'Z' | 'X' => RawProcessState::LinuxStopped,
        _ => RawProcessState::Unknown,
    }
}

struct ProcessStatus {
    vm_rss: u64,
}

fn read_process_status(pid: i32) -> Result<ProcessStatus> {
    let path = format!("/proc/{pid}/status");
    let content = fs::read_to_string(&path).map_err(|e| map_proc_io_err(e, pid))?;
    let mut vm_rss = 0u64;
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        if parts[0] == "VmRSS:" {
            vm_rss = parts[1].parse::<u64>().unwrap_or(0) * 1024;
        }
    }
    Ok(ProcessStatus { vm_rss })
}

fn map_proc_io_err(e: std::io::Error, pid: i32) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(format!("process {pid} not found"))
    } else {
        Error::Io(e)
    }
}

/// Filesystem types that never carry meaningful disk-usage data.
const PSEUDO_FS: &[&str] = &[
    "proc", "sysfs", "devtmpfs", "devpts", "cgroup", "cgroup2", "securityfs", "debugfs",
    "tracefs", "configfs", "fusectl", "mqueue", "hugetlbfs", "pstore", "bpf", "autofs",
    "tmpfs", "overlay", "squashfs",
];

/// Read `/proc/mounts`, decode octal escapes, and drop pseudo filesystems.
/// `shouldIgnore` (device under `/dev/loop`, mountpoint under `/mnt/wsl/`
/// or `/Docker/`) is the DriveCache's job, not this probe's — this
/// function returns every real mount, filtered only on fs type.
pub fn read_mounts() -> Result<Vec<MountRaw>> {
    let content = fs::read_to_string("/proc/mounts")?;
    Ok(parse_mounts(&content))
}

fn parse_mounts(content: &str) -> Vec<MountRaw> {
    let mut mounts = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        let fs_type = parts[2];
        if PSEUDO_FS.contains(&fs_type) {
            continue;
        }
        mounts.push(MountRaw {
            device: parts[0].to_string(),
            mount_point: decode_octal_escapes(parts[1]),
            fs_type: fs_type.to_string(),
        });
    }

    mounts
}

/// `/proc/mounts` escapes space as `\040` and backslash as `\134`.
fn decode_octal_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            if let Ok(code) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or(""), 8) {
                out.push(code as char);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// `statvfs`-based disk usage for one mountpoint.
pub fn read_disk_usage(mount_point: &str) -> Result<(u64, u64, u64, u64)> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let c_path = CString::new(mount_point).map_err(|_| Error::Platform("invalid path".into()))?;
    let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if ret != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    let stat = unsafe { stat.assume_init() };

    let block_size = stat.f_frsize;
    let total_bytes = stat.f_blocks * block_size;
    let free_bytes = stat.f_bfree * block_size;
    let available_bytes = stat.f_bavail * block_size;
    let used_bytes = total_bytes.saturating_sub(free_bytes);

    Ok((total_bytes, used_bytes, available_bytes, stat.f_files))
}

/// Read `/proc/diskstats`, skipping partitions, loop and ram devices.
pub fn read_diskstats() -> Result<Vec<spectra_types::DiskIoRaw>> {
    let content = fs::read_to_string("/proc/diskstats")?;
    let mut stats = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }
        let device = parts[2];
        if is_partition_or_virtual(device) {
            continue;
        }

        let sectors_read: u64 = parts[5].parse().unwrap_or(0);
        let sectors_written: u64 = parts[9].parse().unwrap_or(0);

        stats.push(spectra_types::DiskIoRaw {
            device: device.to_string(),
            read_bytes: sectors_read * 512,
            write_bytes: sectors_written * 512,
            read_ops: parts[3].parse().unwrap_or(0),
            write_ops: parts[7].parse().unwrap_or(0),
            read_time_ms: parts[6].parse().unwrap_or(0),
            write_time_ms: parts[10].parse().unwrap_or(0),
            io_in_progress: parts[11].parse().unwrap_or(0),
        });
    }

    Ok(stats)
}

fn is_partition_or_virtual(device: &str) -> bool {
    device.starts_with("loop")
        || device.starts_with("ram")
        || device.starts_with("dm-")
        || (device.len() > 3
            && device.chars().last().is_some_and(|c| c.is_ascii_digit())
            && device.chars().nth(device.len() - 2).is_some_and(|c| c.is_ascii_alphabetic()))
}

/// Read `/proc/net/dev` and supplement with `/sys/class/net/{iface}/*`.
pub fn read_net_interfaces() -> Result<Vec<spectra_types::NetIfRaw>> {
    let content = fs::read_to_string("/proc/net/dev")?;
    let mut interfaces = Vec::new();

    for line in content.lines().skip(2) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 17 {
            continue;
        }
        let name = parts[0].trim_end_matches(':').to_string();
        let sys_path = format!("/sys/class/net/{name}");

        let mac_address = fs::read_to_string(format!("{sys_path}/address"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let mtu: u32 = fs::read_to_string(format!("{sys_path}/mtu"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let ifindex: u32 = fs::read_to_string(format!("{sys_path}/ifindex"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let link_speed_mbps: i64 = fs::read_to_string(format!("{sys_path}/speed"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(-1);
        let link_speed_bps = if link_speed_mbps > 0 { link_speed_mbps as u64 * 1_000_000 } else { 0 };

        interfaces.push(spectra_types::NetIfRaw {
            ifindex,
            name,
            mac_address,
            mtu,
            link_speed_bps,
            rx_bytes: parts[1].parse().unwrap_or(0),
            rx_packets: parts[2].parse().unwrap_or(0),
            rx_errors: parts[3].parse().unwrap_or(0),
            rx_drops: parts[4].parse().unwrap_or(0),
            tx_bytes: parts[9].parse().unwrap_or(0),
            tx_packets: parts[10].parse().unwrap_or(0),
            tx_errors: parts[11].parse().unwrap_or(0),
            tx_drops: parts[12].parse().unwrap_or(0),
        });
    }

    Ok(interfaces)
}

/// Process count (numeric `/proc` entries) and boot time from
/// `/proc/uptime` + `/proc/stat btime`.
pub fn read_uptime_and_boot_time() -> Result<(u64, i64)> {
    let uptime_content = fs::read_to_string("/proc/uptime")?;
    let uptime_seconds: f64 = uptime_content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);

    let stat_content = fs::read_to_string("/proc/stat")?;
    let boot_time = stat_content
        .lines()
        .find(|l| l.starts_with("btime "))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Ok((uptime_seconds as u64, boot_time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_space_and_backslash_escapes() {
        assert_eq!(decode_octal_escapes("/mnt/My\\040Drive"), "/mnt/My Drive");
        assert_eq!(decode_octal_escapes("C\\134temp"), "C\\temp");
    }

    #[test]
    fn partition_detection_skips_numbered_suffixes() {
        assert!(is_partition_or_virtual("sda1"));
        assert!(is_partition_or_virtual("loop0"));
        assert!(is_partition_or_virtual("dm-0"));
        assert!(!is_partition_or_virtual("sda"));
    }

    #[test]
    fn classify_state_running_requires_cpu_ticks() {
        assert_eq!(classify_state('R', 10), RawProcessState::LinuxRunning);
        assert_eq!(classify_state('R', 0), RawProcessState::LinuxRunnableNoCpu);
        assert_eq!(classify_state('S', 0), RawProcessState::LinuxSleeping);
        assert_eq!(classify_state('Z', 0), RawProcessState::LinuxStopped);
    }

    #[test]
    fn reads_live_loadavg() {
        let result = read_load_average();
        assert!(result.is_ok());
    }

    #[test]
    fn reads_live_meminfo() {
        let result = read_memory();
        assert!(result.is_ok());
        assert!(result.unwrap().total_bytes > 0);
    }

    #[test]
    fn mount_filter_scenario_6() {
        let content = "\
/dev/sda1 / ext4 rw 0 0
tmpfs /run tmpfs rw 0 0
/dev/loop0 /snap/core squashfs ro 0 0
proc /proc proc rw 0 0
/dev/sdb1 /mnt/data xfs rw 0 0
";
        let devices: Vec<_> = parse_mounts(content).into_iter().map(|m| m.device).collect();
        assert_eq!(devices, vec!["/dev/sda1", "/dev/sdb1"]);
    }
}

//! FreeBSD sysctl wrappers. Every function returns a raw counter record;
//! no derivation happens here (§4.3).

use spectra_types::{
    CpuSnapshotRaw, CpuTimesRaw, DiskIoRaw, Error, LoadAvgRaw, MemoryRaw, MountRaw, NetIfRaw,
    ProcRaw, RawProcessState, Result,
};
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::mem;
use std::ptr;

fn sysctl_by_name_raw(name: &str) -> Result<Vec<u8>> {
    let c_name = CString::new(name).map_err(|e| Error::Platform(format!("invalid sysctl name: {e}")))?;
    let mut len: usize = 0;
    unsafe {
        if libc::sysctlbyname(c_name.as_ptr(), ptr::null_mut(), &mut len, ptr::null_mut(), 0) != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        let mut buf = vec![0u8; len];
        if libc::sysctlbyname(
            c_name.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        ) != 0
        {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        buf.truncate(len);
        Ok(buf)
    }
}

/// `kern.cp_time` (aggregate) and `kern.cp_times` (per-core): each entry is
/// 5 little-endian u64 longs, `[user, nice, sys, intr, idle]` (§6).
fn decode_cp_times(buf: &[u8]) -> Vec<CpuTimesRaw> {
    const ENTRY_BYTES: usize = 5 * 8;
    buf.chunks_exact(ENTRY_BYTES)
        .map(|chunk| {
            let get = |i: usize| u64::from_ne_bytes(chunk[i * 8..i * 8 + 8].try_into().unwrap());
            CpuTimesRaw {
                user: get(0),
                nice: get(1),
                system: get(2),
                irq: get(3),
                idle: get(4),
                iowait: 0,
                softirq: 0,
                steal: 0,
                guest: 0,
                guest_nice: 0,
            }
        })
        .collect()
}

pub fn read_cpu_snapshot() -> Result<CpuSnapshotRaw> {
    let aggregate_buf = sysctl_by_name_raw("kern.cp_time")?;
    let aggregate = decode_cp_times(&aggregate_buf)
        .into_iter()
        .next()
        .ok_or_else(|| Error::Platform("kern.cp_time returned no data".into()))?;

    let mut cores = BTreeMap::new();
    if let Ok(per_core_buf) = sysctl_by_name_raw("kern.cp_times") {
        for (i, times) in decode_cp_times(&per_core_buf).into_iter().enumerate() {
            cores.insert(format!("cpu{i}"), times);
        }
    }

    Ok(CpuSnapshotRaw { aggregate, cores })
}

/// `vm.loadavg`: three u32 fixed-point loads, 4 bytes padding, one u64
/// scale divisor (§6).
pub fn read_load_average() -> Result<LoadAvgRaw> {
    let buf = sysctl_by_name_raw("vm.loadavg")?;
    decode_loadavg(&buf)
}

fn decode_loadavg(buf: &[u8]) -> Result<LoadAvgRaw> {
    if buf.len() < 24 {
        return Err(Error::Platform("vm.loadavg returned unexpected size".into()));
    }
    let load = |i: usize| u32::from_ne_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap()) as f64;
    let scale = u64::from_ne_bytes(buf[16..24].try_into().unwrap()) as f64;
    let scale = if scale == 0.0 { 1.0 } else { scale };

    Ok(LoadAvgRaw { load_1min: load(0) / scale, load_5min: load(1) / scale, load_15min: load(2) / scale })
}

/// `hw.physmem`, `vm.stats.vm.v_page_size`, free+inactive page counts.
/// Swap via `swapinfo -k`; absence is zero, not an error (§4.3.2).
pub fn read_memory() -> Result<MemoryRaw> {
    let total_bytes = sysctl_u64("hw.physmem")?;
    let page_size = sysctl_u32("vm.stats.vm.v_page_size").unwrap_or(4096) as u64;
    let free_count = sysctl_u32("vm.stats.vm.v_free_count").unwrap_or(0) as u64;
    let inactive_count = sysctl_u32("vm.stats.vm.v_inactive_count").unwrap_or(0) as u64;
    let available_bytes = (free_count + inactive_count) * page_size;

    let (swap_total_bytes, swap_free_bytes) = read_swapinfo();

    Ok(MemoryRaw { total_bytes, available_bytes, swap_total_bytes, swap_free_bytes })
}

fn sysctl_u64(name: &str) -> Result<u64> {
    let buf = sysctl_by_name_raw(name)?;
    buf.get(..8)
        .map(|b| u64::from_ne_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::Platform(format!("{name} returned unexpected size")))
}

fn sysctl_u32(name: &str) -> Result<u32> {
    let buf = sysctl_by_name_raw(name)?;
    buf.get(..4)
        .map(|b| u32::from_ne_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::Platform(format!("{name} returned unexpected size")))
}

fn read_swapinfo() -> (u64, u64) {
    let Ok(output) = std::process::Command::new("swapinfo").arg("-k").output() else {
        return (0, 0);
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let mut total_kib = 0u64;
    let mut used_kib = 0u64;
    for line in text.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 3 {
            total_kib += parts[1].parse().unwrap_or(0);
            used_kib += parts[2].parse().unwrap_or(0);
        }
    }
    let total = total_kib * 1024;
    let used = used_kib * 1024;
    (total, total.saturating_sub(used))
}

/// `getmntinfo(3)`; pseudo filesystems (`devfs`, `tmpfs`, `fdescfs`) are
/// dropped the same way `/proc/mounts`'s pseudo set is on Linux.
pub fn read_mounts() -> Result<Vec<MountRaw>> {
    unsafe {
        let mut fs_list: *mut libc::statfs = ptr::null_mut();
        let count = libc::getmntinfo(&mut fs_list, libc::MNT_NOWAIT);
        if count <= 0 || fs_list.is_null() {
            return Ok(Vec::new());
        }

        let mut mounts = Vec::with_capacity(count as usize);
        for i in 0..count {
            let fs = &*fs_list.add(i as usize);
            let device = cstr_to_string(fs.f_mntfromname.as_ptr());
            let mount_point = cstr_to_string(fs.f_mntonname.as_ptr());
            let fs_type = cstr_to_string(fs.f_fstypename.as_ptr());

            if matches!(fs_type.as_str(), "devfs" | "tmpfs" | "fdescfs" | "procfs") {
                continue;
            }

            mounts.push(MountRaw { device, mount_point, fs_type });
        }

        Ok(mounts)
    }
}

pub fn read_disk_usage(mount_point: &str) -> Result<(u64, u64, u64, u64)> {
    unsafe {
        let c_path = CString::new(mount_point).map_err(|_| Error::Platform("invalid path".into()))?;
        let mut stat: libc::statfs = mem::zeroed();
        if libc::statfs(c_path.as_ptr(), &mut stat) != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        let block_size = stat.f_bsize as u64;
        let total = stat.f_blocks as u64 * block_size;
        let free = stat.f_bfree as u64 * block_size;
        let available = stat.f_bavail as u64 * block_size;
        Ok((total, total.saturating_sub(free), available, stat.f_files as u64))
    }
}

/// `kern.devstat.all`: a `u32` generation counter followed by a packed
/// array of `devstat` structs. The struct layout below mirrors FreeBSD's
/// `sys/devicestat.h`; `DEVSTAT_BYTES` is asserted against the reported
/// buffer before any decode is attempted (§9 "embedded binary decoding").
#[repr(C)]
#[derive(Clone, Copy)]
struct RawDevstat {
    device_number: u32,
    device_name: [u8; 16],
    unit_number: i32,
    bytes: [u64; 2],        // bytes[READ], bytes[WRITE]
    operations: [u64; 2],   // operations[READ], operations[WRITE]
    duration: [[i64; 2]; 2], // duration[READ/WRITE] as {sec, frac} bintime
    busy_time: [i64; 2],
    start_count: u32,
    end_count: u32,
}

const DEVSTAT_BYTES: usize = mem::size_of::<RawDevstat>();

pub fn read_disk_io() -> Result<Vec<DiskIoRaw>> {
    let buf = match sysctl_by_name_raw("kern.devstat.all") {
        Ok(buf) => buf,
        Err(_) => return Ok(Vec::new()),
    };
    if buf.len() < 4 {
        return Ok(Vec::new());
    }
    let body = &buf[4..];
    if body.len() % DEVSTAT_BYTES != 0 {
        // Kernel struct layout drifted from ours; disable rather than
        // decode garbage (§9).
        return Ok(Vec::new());
    }

    let count = body.len() / DEVSTAT_BYTES;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let offset = i * DEVSTAT_BYTES;
        let raw: RawDevstat =
            unsafe { ptr::read_unaligned(body[offset..offset + DEVSTAT_BYTES].as_ptr() as *const RawDevstat) };

        let name_end = raw.device_name.iter().position(|&b| b == 0).unwrap_or(raw.device_name.len());
        let name = String::from_utf8_lossy(&raw.device_name[..name_end]).into_owned();
        let device = format!("{name}{}", raw.unit_number);

        let busy = raw.start_count.saturating_sub(raw.end_count);
        let read_time_ms = bintime_to_ms(raw.duration[0][0], raw.duration[0][1]);
        let write_time_ms = bintime_to_ms(raw.duration[1][0], raw.duration[1][1]);

        out.push(DiskIoRaw {
            device,
            read_bytes: raw.bytes[0],
            write_bytes: raw.bytes[1],
            read_ops: raw.operations[0],
            write_ops: raw.operations[1],
            read_time_ms,
            write_time_ms,
            io_in_progress: busy as u64,
        });
    }

    Ok(out)
}

/// `bintime`: seconds plus a `2^-64` fractional part, converted to ms.
fn bintime_to_ms(sec: i64, frac: i64) -> u64 {
    let frac_ms = (frac as u64 as f64 / u64::MAX as f64) * 1000.0;
    (sec.max(0) as u64) * 1000 + frac_ms as u64
}

/// `kern.boottime`: a `struct timeval` (two `i64`s on FreeBSD/amd64).
pub fn read_boot_time() -> Result<i64> {
    let buf = sysctl_by_name_raw("kern.boottime")?;
    buf.get(..8)
        .map(|b| i64::from_ne_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::Platform("kern.boottime returned unexpected size".into()))
}

pub fn read_net_interfaces() -> Result<Vec<NetIfRaw>> {
    unsafe {
        let mut addrs: *mut libc::ifaddrs = ptr::null_mut();
        if libc::getifaddrs(&mut addrs) != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let mut interfaces: std::collections::HashMap<String, NetIfRaw> = std::collections::HashMap::new();
        let mut addr = addrs;
        let mut next_index = 1u32;
        while !addr.is_null() {
            let ifa = &*addr;
            let name = cstr_to_string(ifa.ifa_name);
            if !interfaces.contains_key(&name) {
                let index = next_index;
                next_index += 1;
                interfaces.insert(
                    name.clone(),
                    NetIfRaw { ifindex: index, name: name.clone(), ..Default::default() },
                );
            }
            addr = ifa.ifa_next;
        }
        libc::freeifaddrs(addrs);
        Ok(interfaces.into_values().collect())
    }
}

/// `kern.proc.proc`: a stream of `kinfo_proc` structs, self-describing via
/// a leading `structsize` field so future larger records are skipped
/// safely (§4.3.6, §6).
pub fn list_processes() -> Result<Vec<ProcRaw>> {
    unsafe {
        let mut mib = [libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_PROC, 0];
        let mut len: usize = 0;
        if libc::sysctl(mib.as_mut_ptr(), 4, ptr::null_mut(), &mut len, ptr::null_mut(), 0) != 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; len];
        if libc::sysctl(mib.as_mut_ptr(), 4, buf.as_mut_ptr() as *mut libc::c_void, &mut len, ptr::null_mut(), 0)
            != 0
        {
            return Ok(Vec::new());
        }
        buf.truncate(len);

        let kinfo_size = mem::size_of::<libc::kinfo_proc>();
        let mut out = Vec::new();
        let mut offset = 0usize;
        while offset + 4 <= buf.len() {
            let structsize = u32::from_ne_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
            if structsize == 0 || offset + structsize > buf.len() {
                break;
            }
            if structsize == kinfo_size {
                let kinfo: libc::kinfo_proc =
                    ptr::read_unaligned(buf[offset..offset + structsize].as_ptr() as *const libc::kinfo_proc);
                out.push(kinfo_to_raw(&kinfo));
            }
            offset += structsize;
        }

        Ok(out)
    }
}

unsafe fn kinfo_to_raw(kinfo: &libc::kinfo_proc) -> ProcRaw {
    let name = CStr::from_ptr(kinfo.ki_comm.as_ptr()).to_string_lossy().into_owned();
    let raw_state = match kinfo.ki_stat as i32 {
        2 => RawProcessState::FreeBsdRun,
        3 => RawProcessState::FreeBsdSleep,
        4 => RawProcessState::FreeBsdIdle,
        5 => RawProcessState::FreeBsdZombie,
        6 => RawProcessState::FreeBsdStop,
        7 => RawProcessState::FreeBsdWait,
        8 => RawProcessState::FreeBsdLock,
        _ => RawProcessState::Unknown,
    };

    ProcRaw {
        pid: kinfo.ki_pid,
        name,
        raw_state,
        cpu_ticks: kinfo.ki_runtime as u64,
        rss_bytes: kinfo.ki_rssize as u64 * 4096,
        num_threads: kinfo.ki_numthreads as u32,
        threads_running: 0,
        threads_runnable: 0,
        threads_waiting: 0,
    }
}

unsafe fn cstr_to_string(ptr: *const libc::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_cp_times_parses_five_long_entries() {
        let mut buf = Vec::new();
        for v in [100u64, 10, 200, 5, 1000] {
            buf.extend_from_slice(&v.to_ne_bytes());
        }
        let entries = decode_cp_times(&buf);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user, 100);
        assert_eq!(entries[0].idle, 1000);
        assert_eq!(entries[0].irq, 5);
    }

    #[test]
    fn bintime_zero_frac_is_whole_seconds() {
        assert_eq!(bintime_to_ms(2, 0), 2000);
    }

    #[test]
    fn decode_loadavg_scenario_5() {
        // §8 scenario 5: ldavg=[100,250,500], fscale=100 -> [1.0, 2.5, 5.0].
        let mut buf = Vec::new();
        for v in [100u32, 250, 500] {
            buf.extend_from_slice(&v.to_ne_bytes());
        }
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&100u64.to_ne_bytes());

        let load = decode_loadavg(&buf).unwrap();
        assert!((load.load_1min - 1.0).abs() < 1e-9);
        assert!((load.load_5min - 2.5).abs() < 1e-9);
        assert!((load.load_15min - 5.0).abs() < 1e-9);
    }
}

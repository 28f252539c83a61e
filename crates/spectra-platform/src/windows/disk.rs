//! Logical-drive enumeration via `GetLogicalDrives`/`GetVolumeInformationW`,
//! usage via `GetDiskFreeSpaceExW`, and I/O counters via
//! `IOCTL_DISK_PERFORMANCE` against `\\.\PhysicalDrive{N}` (§4.3.3, §4.3.4).

use spectra_types::{DiskIoRaw, Error, MountRaw, PhysicalDiskRaw, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::os::windows::ffi::OsStrExt;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDrives, GetVolumeInformationW, DRIVE_FIXED,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::IO::DeviceIoControl;

/// Windows only accepts these filesystems as "local" (§GLOSSARY).
const LOCAL_FS_TYPES: &[&str] = &["NTFS", "REFS", "FAT32", "FAT", "EXFAT"];

fn wide(s: &str) -> Vec<u16> {
    OsString::from(s).encode_wide().chain(std::iter::once(0)).collect()
}

pub fn list_mounts() -> Result<Vec<MountRaw>> {
    let mask = unsafe { GetLogicalDrives() };
    let mut mounts = Vec::new();

    for i in 0..26u32 {
        if mask & (1 << i) == 0 {
            continue;
        }
        let letter = (b'A' + i as u8) as char;
        let root = format!("{letter}:\\");
        let root_w = wide(&root);

        if unsafe { GetDriveTypeW(root_w.as_ptr()) } != DRIVE_FIXED {
            continue;
        }

        let mut fs_name = [0u16; 32];
        let mut vol_name = [0u16; 256];
        let ok = unsafe {
            GetVolumeInformationW(
                root_w.as_ptr(),
                vol_name.as_mut_ptr(),
                vol_name.len() as u32,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                fs_name.as_mut_ptr(),
                fs_name.len() as u32,
            )
        };
        if ok == 0 {
            continue;
        }

        let fs_type = String::from_utf16_lossy(&fs_name).trim_end_matches('\0').to_string();
        if !LOCAL_FS_TYPES.contains(&fs_type.as_str()) {
            continue;
        }

        mounts.push(MountRaw { device: format!("{letter}:"), mount_point: root, fs_type });
    }

    Ok(mounts)
}

pub fn read_usage(mount_point: &str) -> Result<(u64, u64, u64, u64)> {
    let root_w = wide(mount_point);
    let mut free_available = 0u64;
    let mut total = 0u64;
    let mut free_total = 0u64;

    let ok = unsafe {
        GetDiskFreeSpaceExW(root_w.as_ptr(), &mut free_available, &mut total, &mut free_total)
    };
    if ok == 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    let used = total.saturating_sub(free_total);
    // NTFS/ReFS don't expose a portable inode count through this API.
    Ok((total, used, free_available, 0))
}

/// `DISK_PERFORMANCE`, returned verbatim by `IOCTL_DISK_PERFORMANCE`
/// (`winioctl.h`); field order and widths match the documented struct.
#[repr(C)]
#[derive(Default)]
struct DiskPerformance {
    bytes_read: i64,
    bytes_written: i64,
    read_time: i64,
    write_time: i64,
    idle_time: i64,
    read_count: u32,
    write_count: u32,
    queue_depth: u32,
    split_count: u32,
    query_time: i64,
    storage_device_number: u32,
    storage_manager_name: [u16; 8],
}

const IOCTL_DISK_PERFORMANCE: u32 = 0x0007_0020;

/// Polls physical drives `0..16`; a drive that returns access-denied (no
/// admin rights, or the index doesn't exist) is skipped for this tick
/// rather than failing the whole probe (§9 Open Question: resolved as
/// skip-this-tick, not probe-wide failure).
///
/// Opened with zero access rights: `IOCTL_DISK_PERFORMANCE` only needs a
/// handle to address the device, and a zero-access open is the one that
/// doesn't require administrator rights (§4.3.4, §9).
pub fn read_io() -> Result<Vec<DiskIoRaw>> {
    let mut out = Vec::new();

    for index in 0..16u32 {
        let path = wide(&format!("\\\\.\\PhysicalDrive{index}"));
        let handle: HANDLE = unsafe {
            CreateFileW(
                path.as_ptr(),
                0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            continue;
        }

        let mut perf = DiskPerformance::default();
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_DISK_PERFORMANCE,
                std::ptr::null(),
                0,
                &mut perf as *mut _ as *mut _,
                std::mem::size_of::<DiskPerformance>() as u32,
                &mut returned,
                std::ptr::null_mut(),
            )
        };
        unsafe { CloseHandle(handle) };
        if ok == 0 {
            continue;
        }

        out.push(DiskIoRaw {
            device: format!("PhysicalDrive{index}"),
            read_bytes: perf.bytes_read as u64,
            write_bytes: perf.bytes_written as u64,
            read_ops: perf.read_count as u64,
            write_ops: perf.write_count as u64,
            read_time_ms: (perf.read_time / 10_000).max(0) as u64,
            write_time_ms: (perf.write_time / 10_000).max(0) as u64,
            io_in_progress: perf.queue_depth as u64,
        });
    }

    Ok(out)
}

/// `STORAGE_PROPERTY_QUERY`, the input buffer `IOCTL_STORAGE_QUERY_PROPERTY`
/// expects (`winioctl.h`).
#[repr(C)]
struct StoragePropertyQuery {
    property_id: u32,
    query_type: u32,
    additional_parameters: u8,
}

/// Fixed-size head of `STORAGE_DEVICE_DESCRIPTOR`; the string fields live
/// at the `*_offset`s into the same output buffer, after this header.
#[repr(C)]
struct StorageDeviceDescriptorHeader {
    version: u32,
    size: u32,
    device_type: u8,
    device_type_modifier: u8,
    removable_media: u8,
    command_queueing: u8,
    vendor_id_offset: i32,
    product_id_offset: i32,
    product_revision_offset: i32,
    serial_number_offset: i32,
    bus_type: u32,
    raw_properties_length: u32,
}

const IOCTL_STORAGE_QUERY_PROPERTY: u32 = 0x002D_1400;
const STORAGE_DEVICE_PROPERTY: u32 = 0;
const PROPERTY_STANDARD_QUERY: u32 = 0;

fn bus_type_name(bus_type: u32) -> &'static str {
    match bus_type {
        1 => "SCSI",
        2 => "ATAPI",
        3 => "ATA",
        4 => "1394",
        5 => "SSA",
        6 => "Fibre",
        7 => "USB",
        8 => "RAID",
        9 => "iSCSI",
        10 => "SAS",
        11 => "SATA",
        12 => "SD",
        13 => "MMC",
        14 => "Virtual",
        15 => "FileBackedVirtual",
        17 => "NVMe",
        _ => "Unknown",
    }
}

/// Reads a NUL-terminated ANSI string out of `buf` at `offset`; Windows
/// uses a negative-or-zero offset to mean "field not present".
fn read_c_str_at(buf: &[u8], offset: i32) -> String {
    if offset <= 0 || offset as usize >= buf.len() {
        return String::new();
    }
    let start = offset as usize;
    let end = buf[start..].iter().position(|&b| b == 0).map(|p| start + p).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[start..end]).trim().to_string()
}

/// Scans `\\.\PhysicalDrive{0..64}` and issues `IOCTL_STORAGE_QUERY_PROPERTY`
/// against each to build the disk-descriptor half of the drive cache's two
/// maps (§4.4). Opened with zero access rights, same rationale as `read_io`.
pub fn list_physical_disks() -> Vec<PhysicalDiskRaw> {
    let mut out = Vec::new();

    for index in 0..64u32 {
        let path = wide(&format!("\\\\.\\PhysicalDrive{index}"));
        let handle: HANDLE = unsafe {
            CreateFileW(
                path.as_ptr(),
                0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            continue;
        }

        let query = StoragePropertyQuery {
            property_id: STORAGE_DEVICE_PROPERTY,
            query_type: PROPERTY_STANDARD_QUERY,
            additional_parameters: 0,
        };
        let mut buf = [0u8; 1024];
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_STORAGE_QUERY_PROPERTY,
                &query as *const _ as *const _,
                std::mem::size_of::<StoragePropertyQuery>() as u32,
                buf.as_mut_ptr() as *mut _,
                buf.len() as u32,
                &mut returned,
                std::ptr::null_mut(),
            )
        };
        unsafe { CloseHandle(handle) };
        if ok == 0 || (returned as usize) < std::mem::size_of::<StorageDeviceDescriptorHeader>() {
            continue;
        }

        let header = unsafe { &*(buf.as_ptr() as *const StorageDeviceDescriptorHeader) };
        let vendor = read_c_str_at(&buf, header.vendor_id_offset);
        let product = read_c_str_at(&buf, header.product_id_offset);
        let model = if vendor.is_empty() { product } else { format!("{vendor} {product}").trim().to_string() };

        out.push(PhysicalDiskRaw {
            index,
            device_id: format!("\\\\.\\PhysicalDrive{index}"),
            model,
            bus_type: bus_type_name(header.bus_type).to_string(),
        });
    }

    out
}

/// `VOLUME_DISK_EXTENTS` with one `DISK_EXTENT`; every local volume in
/// practice sits on exactly one physical disk, so the first extent is the
/// one the drive cache's letter map needs.
#[repr(C)]
struct VolumeDiskExtents {
    number_of_disk_extents: u32,
    _reserved: u32,
    first_disk_number: u32,
    _reserved2: u32,
    starting_offset: i64,
    extent_length: i64,
}

const IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS: u32 = 0x0056_0000;

/// Walks the logical-drive bitmask and asks each fixed volume for its
/// `VOLUME_DISK_EXTENTS` to find the physical disk backing it, building
/// the drive cache's `{index -> [letter, ...]}` map (§4.4).
pub fn drive_letters_by_physical_index() -> HashMap<u32, Vec<String>> {
    let mask = unsafe { GetLogicalDrives() };
    let mut out: HashMap<u32, Vec<String>> = HashMap::new();

    for i in 0..26u32 {
        if mask & (1 << i) == 0 {
            continue;
        }
        let letter = (b'A' + i as u8) as char;
        let root_w = wide(&format!("{letter}:\\"));
        if unsafe { GetDriveTypeW(root_w.as_ptr()) } != DRIVE_FIXED {
            continue;
        }

        let volume_path = wide(&format!("\\\\.\\{letter}:"));
        let handle: HANDLE = unsafe {
            CreateFileW(
                volume_path.as_ptr(),
                0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            continue;
        }

        let mut extents = VolumeDiskExtents {
            number_of_disk_extents: 0,
            _reserved: 0,
            first_disk_number: 0,
            _reserved2: 0,
            starting_offset: 0,
            extent_length: 0,
        };
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS,
                std::ptr::null(),
                0,
                &mut extents as *mut _ as *mut _,
                std::mem::size_of::<VolumeDiskExtents>() as u32,
                &mut returned,
                std::ptr::null_mut(),
            )
        };
        unsafe { CloseHandle(handle) };
        if ok == 0 || extents.number_of_disk_extents == 0 {
            continue;
        }

        out.entry(extents.first_disk_number).or_default().push(format!("{letter}:"));
    }

    out
}

//! `GlobalMemoryStatusEx` (§4.3.2).

use spectra_types::{Error, MemoryRaw, Result};
use windows_sys::Win32::System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX};

pub fn read() -> Result<MemoryRaw> {
    let mut status = MEMORYSTATUSEX { dwLength: std::mem::size_of::<MEMORYSTATUSEX>() as u32, ..unsafe { std::mem::zeroed() } };
    let ok = unsafe { GlobalMemoryStatusEx(&mut status) };
    if ok == 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    Ok(MemoryRaw {
        total_bytes: status.ullTotalPhys,
        available_bytes: status.ullAvailPhys,
        swap_total_bytes: status.ullTotalPageFile.saturating_sub(status.ullTotalPhys),
        swap_free_bytes: status.ullAvailPageFile.saturating_sub(status.ullAvailPhys),
    })
}

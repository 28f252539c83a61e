//! Windows Service Control Manager enumeration (§4.3.8).

use spectra_types::{Error, Metric, Result, ServiceMetric};
use windows_sys::Win32::System::Services::{
    CloseServiceHandle, EnumServicesStatusExW, OpenSCManagerW, ENUM_SERVICE_STATUS_PROCESSW,
    SC_ENUM_PROCESS_INFO, SC_MANAGER_ENUMERATE_SERVICE, SERVICE_STATE_ALL, SERVICE_WIN32,
};

fn state_name(state: u32) -> &'static str {
    match state {
        1 => "stopped",
        2 => "start_pending",
        3 => "stop_pending",
        4 => "running",
        5 => "continue_pending",
        6 => "pause_pending",
        7 => "paused",
        _ => "unknown",
    }
}

pub fn list() -> Result<Vec<Metric>> {
    unsafe {
        let scm = OpenSCManagerW(std::ptr::null(), std::ptr::null(), SC_MANAGER_ENUMERATE_SERVICE);
        if scm.is_null() {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let mut bytes_needed = 0u32;
        let mut services_returned = 0u32;
        let mut resume_handle = 0u32;

        // First call sizes the buffer; it's expected to fail with
        // ERROR_MORE_DATA.
        EnumServicesStatusExW(
            scm,
            SC_ENUM_PROCESS_INFO,
            SERVICE_WIN32,
            SERVICE_STATE_ALL,
            std::ptr::null_mut(),
            0,
            &mut bytes_needed,
            &mut services_returned,
            &mut resume_handle,
            std::ptr::null(),
        );

        let mut buf = vec![0u8; bytes_needed as usize];
        let ok = EnumServicesStatusExW(
            scm,
            SC_ENUM_PROCESS_INFO,
            SERVICE_WIN32,
            SERVICE_STATE_ALL,
            buf.as_mut_ptr(),
            buf.len() as u32,
            &mut bytes_needed,
            &mut services_returned,
            &mut resume_handle,
            std::ptr::null(),
        );
        CloseServiceHandle(scm);

        if ok == 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let entry_size = std::mem::size_of::<ENUM_SERVICE_STATUS_PROCESSW>();
        let mut services = Vec::with_capacity(services_returned as usize);
        for i in 0..services_returned as usize {
            let offset = i * entry_size;
            let entry: &ENUM_SERVICE_STATUS_PROCESSW =
                &*(buf[offset..offset + entry_size].as_ptr() as *const ENUM_SERVICE_STATUS_PROCESSW);

            let name = pwstr_to_string(entry.lpServiceName);
            let description = pwstr_to_string(entry.lpDisplayName);
            let status = state_name(entry.ServiceStatusProcess.dwCurrentState);

            services.push(Metric::Service(ServiceMetric {
                name,
                load_state: "loaded".into(),
                status: status.into(),
                substatus: String::new(),
                description,
            }));
        }

        Ok(services)
    }
}

unsafe fn pwstr_to_string(ptr: *mut u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let slice = std::slice::from_raw_parts(ptr, len);
    String::from_utf16_lossy(slice)
}

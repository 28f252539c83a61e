//! Native NT APIs not exposed by `windows-sys`: `ntdll.dll`'s
//! `NtQuerySystemInformation`, used for per-core CPU accounting and
//! process enumeration the same way every other Windows host-metrics
//! agent in the ecosystem does (the documented `Toolhelp32`/WMI paths
//! don't expose per-core idle/kernel/user ticks at all).

#![allow(non_camel_case_types, non_snake_case)]

use std::ffi::c_void;

pub const SYSTEM_PROCESSOR_PERFORMANCE_INFORMATION: i32 = 8;
pub const SYSTEM_PROCESS_INFORMATION: i32 = 5;

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct SystemProcessorPerformanceInformation {
    pub idle_time: i64,
    pub kernel_time: i64,
    pub user_time: i64,
    pub dpc_time: i64,
    pub interrupt_time: i64,
    pub interrupt_count: u32,
    pub _padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct UnicodeString {
    pub length: u16,
    pub maximum_length: u16,
    pub buffer: *mut u16,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct SystemThreadInformation {
    pub kernel_time: i64,
    pub user_time: i64,
    pub create_time: i64,
    pub wait_time: u32,
    pub start_address: *mut c_void,
    pub client_id: (isize, isize),
    pub priority: i32,
    pub base_priority: i32,
    pub context_switches: u32,
    pub thread_state: u32,
    pub wait_reason: u32,
}

/// `SYSTEM_PROCESS_INFORMATION`. The per-thread array follows this struct
/// in memory, `thread_count` entries long; callers must walk the buffer
/// with `next_entry_offset`, never `mem::size_of` alone, since this
/// struct's trailing fields vary by Windows version.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct SystemProcessInformation {
    pub next_entry_offset: u32,
    pub thread_count: u32,
    pub reserved1: [u8; 48],
    pub image_name: UnicodeString,
    pub base_priority: i32,
    pub process_id: isize,
    pub inherited_from_process_id: isize,
    pub handle_count: u32,
    pub session_id: u32,
    pub reserved2: usize,
    pub peak_virtual_size: usize,
    pub virtual_size: usize,
    pub reserved3: u32,
    pub peak_working_set_size: usize,
    pub working_set_size: usize,
    pub reserved4: usize,
    pub quota_paged_pool_usage: usize,
    pub reserved5: usize,
    pub quota_nonpaged_pool_usage: usize,
    pub pagefile_usage: usize,
    pub peak_pagefile_usage: usize,
    pub private_page_count: usize,
    pub reserved6: [i64; 6],
}

#[link(name = "ntdll")]
unsafe extern "system" {
    pub fn NtQuerySystemInformation(
        system_information_class: i32,
        system_information: *mut c_void,
        system_information_length: u32,
        return_length: *mut u32,
    ) -> i32;
}

/// Grows `buf` until `NtQuerySystemInformation` stops reporting
/// `STATUS_INFO_LENGTH_MISMATCH` (0xC0000004), the documented pattern for
/// calling this API without knowing the buffer size up front.
pub fn query_system_information(class: i32) -> Vec<u8> {
    const STATUS_INFO_LENGTH_MISMATCH: i32 = 0xC0000004u32 as i32;
    let mut size: u32 = 64 * 1024;
    loop {
        let mut buf = vec![0u8; size as usize];
        let mut returned: u32 = 0;
        let status = unsafe {
            NtQuerySystemInformation(class, buf.as_mut_ptr() as *mut c_void, size, &mut returned)
        };
        if status == 0 {
            buf.truncate(returned as usize);
            return buf;
        }
        if status == STATUS_INFO_LENGTH_MISMATCH {
            size = size.saturating_mul(2);
            if size > 256 * 1024 * 1024 {
                return Vec::new();
            }
            continue;
        }
        return Vec::new();
    }
}

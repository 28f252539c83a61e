//! Process enumeration via a single `NtQuerySystemInformation`
//! (`SystemProcessInformation`) walk (§4.3.6).
//!
//! A `Toolhelp32Snapshot` + per-process `OpenProcess`/`GetProcessTimes`
//! walk needs a handle per PID and silently drops processes the agent
//! lacks rights to open. The NT snapshot walked here carries working-set
//! size and per-thread kernel/user time for every process in one call,
//! with no per-process handle at all, so it's used instead for every
//! field this probe needs.

use super::ffi::{self, SystemProcessInformation, SystemThreadInformation, SYSTEM_PROCESS_INFORMATION};
use spectra_types::{ProcRaw, RawProcessState, Result};
use std::mem;

const THREAD_STATE_RUNNING: u32 = 2;
const THREAD_STATE_READY: u32 = 1;
const THREAD_STATE_STANDBY: u32 = 5;
const THREAD_STATE_DEFERRED_READY: u32 = 6;
const THREAD_STATE_WAITING: u32 = 7;
const THREAD_STATE_GATE_WAIT_OBSOLETE: u32 = 13;
const THREAD_STATE_WAITING_FOR_PROCESS_IN_SWAP: u32 = 14;

pub fn list() -> Result<Vec<ProcRaw>> {
    let buf = ffi::query_system_information(SYSTEM_PROCESS_INFORMATION);
    if buf.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut offset = 0usize;
    let proc_size = mem::size_of::<SystemProcessInformation>();
    let thread_size = mem::size_of::<SystemThreadInformation>();

    loop {
        if offset + proc_size > buf.len() {
            break;
        }
        let proc_info: SystemProcessInformation =
            unsafe { std::ptr::read_unaligned(buf[offset..offset + proc_size].as_ptr() as *const _) };

        let name = unicode_string_to_string(&proc_info, buf.as_ptr() as usize, offset, buf.len());

        let mut running = 0u32;
        let mut runnable = 0u32;
        let mut waiting = 0u32;
        let mut cpu_ticks = 0i64;

        let threads_start = offset + proc_size;
        for t in 0..proc_info.thread_count as usize {
            let t_offset = threads_start + t * thread_size;
            if t_offset + thread_size > buf.len() {
                break;
            }
            let thread: SystemThreadInformation =
                unsafe { std::ptr::read_unaligned(buf[t_offset..t_offset + thread_size].as_ptr() as *const _) };
            cpu_ticks += thread.kernel_time + thread.user_time;

            match thread.thread_state {
                THREAD_STATE_RUNNING => running += 1,
                THREAD_STATE_READY | THREAD_STATE_STANDBY | THREAD_STATE_DEFERRED_READY => runnable += 1,
                THREAD_STATE_WAITING | THREAD_STATE_GATE_WAIT_OBSOLETE | THREAD_STATE_WAITING_FOR_PROCESS_IN_SWAP => {
                    waiting += 1
                }
                _ => {}
            }
        }

        out.push(ProcRaw {
            pid: proc_info.process_id as i32,
            name,
            raw_state: RawProcessState::WindowsThreadDerived,
            cpu_ticks: cpu_ticks.max(0) as u64,
            rss_bytes: proc_info.working_set_size as u64,
            num_threads: proc_info.thread_count,
            threads_running: running,
            threads_runnable: runnable,
            threads_waiting: waiting,
        });

        if proc_info.next_entry_offset == 0 {
            break;
        }
        offset += proc_info.next_entry_offset as usize;
    }

    Ok(out)
}

/// The kernel copies the image name into the same allocation it returns
/// for `SystemProcessInformation`, so `image_name.buffer` points inside
/// `buf` rather than into the target process; the bounds check guards
/// against any future Windows version that stops doing this.
fn unicode_string_to_string(proc_info: &SystemProcessInformation, buf_base: usize, proc_offset: usize, buf_len: usize) -> String {
    if proc_info.process_id == 0 {
        return "System Idle Process".to_string();
    }
    let len = proc_info.image_name.length as usize;
    if len == 0 {
        return format!("pid-{}", proc_info.process_id);
    }
    let ptr = proc_info.image_name.buffer as usize;
    let self_start = buf_base + proc_offset;
    if ptr < self_start || ptr + len > buf_base + buf_len {
        return format!("pid-{}", proc_info.process_id);
    }

    let units = len / 2;
    let slice = unsafe { std::slice::from_raw_parts(ptr as *const u16, units) };
    String::from_utf16_lossy(slice)
}

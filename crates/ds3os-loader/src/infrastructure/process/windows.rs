//! Windows process launcher.
//!
//! Uses `CreateProcessW` with `CREATE_SUSPENDED`, `WriteProcessMemory`, and
//! `ResumeThread` for the launch itself, and `GetExitCodeProcess` for
//! liveness.
//!
//! The single-instance guard is a named mutex the game creates at startup.
//! A second copy refuses to start while it exists, so before re-launching we
//! walk the system handle table (`NtQuerySystemInformation` with
//! `SystemExtendedHandleInformation`), find the mutant handle in the running
//! game whose name ends with the guard name, and close it remotely with
//! `DuplicateHandle(DUPLICATE_CLOSE_SOURCE)`.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use tracing::{debug, warn};
use windows::core::{PCWSTR, PWSTR};
use windows::Wdk::Foundation::{NtQueryObject, OBJECT_INFORMATION_CLASS};
use windows::Wdk::System::SystemInformation::{NtQuerySystemInformation, SYSTEM_INFORMATION_CLASS};
use windows::Win32::Foundation::{
    CloseHandle, DuplicateHandle, DUPLICATE_CLOSE_SOURCE, DUPLICATE_SAME_ACCESS, HANDLE, NTSTATUS,
    STILL_ACTIVE, UNICODE_STRING,
};
use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows::Win32::System::Threading::{
    CreateProcessW, GetCurrentProcess, GetExitCodeProcess, OpenProcess, ResumeThread,
    TerminateProcess, CREATE_SUSPENDED, PROCESS_DUP_HANDLE, PROCESS_INFORMATION, STARTUPINFOW,
};

use super::{ProcessError, ProcessLauncher};

const SYSTEM_EXTENDED_HANDLE_INFORMATION: SYSTEM_INFORMATION_CLASS = SYSTEM_INFORMATION_CLASS(64);
const OBJECT_NAME_INFORMATION: OBJECT_INFORMATION_CLASS = OBJECT_INFORMATION_CLASS(1);
const OBJECT_TYPE_INFORMATION: OBJECT_INFORMATION_CLASS = OBJECT_INFORMATION_CLASS(2);
const STATUS_INFO_LENGTH_MISMATCH: NTSTATUS = NTSTATUS(0xC000_0004_u32 as i32);

/// Upper bound for the handle table buffer (256 MiB).
const MAX_HANDLE_TABLE_BYTES: usize = 256 * 1024 * 1024;

/// Kernel object type of a named mutex.
const MUTANT_TYPE_NAME: &str = "Mutant";

/// Owned process and primary-thread handles.
pub struct WindowsProcessHandle {
    process: HANDLE,
    thread: HANDLE,
    process_id: u32,
}

// SAFETY: process and thread handles are plain kernel object references that
// may be used from any thread; the struct owns them exclusively.
unsafe impl Send for WindowsProcessHandle {}

impl Drop for WindowsProcessHandle {
    fn drop(&mut self) {
        // SAFETY: both handles were returned by CreateProcessW and are closed
        // exactly once, here.
        unsafe {
            CloseHandle(self.thread).ok();
            CloseHandle(self.process).ok();
        }
    }
}

/// Windows implementation of [`ProcessLauncher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsProcessLauncher;

impl WindowsProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

fn wide(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
}

impl ProcessLauncher for WindowsProcessLauncher {
    type Handle = WindowsProcessHandle;

    fn create_suspended(
        &self,
        executable: &Path,
        working_dir: &Path,
    ) -> Result<Self::Handle, ProcessError> {
        let application = wide(executable);
        let directory = wide(working_dir);
        // CreateProcessW may modify the command line buffer in place.
        let mut command_line: Vec<u16> = format!("\"{}\"", executable.display())
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();

        let startup = STARTUPINFOW {
            cb: std::mem::size_of::<STARTUPINFOW>() as u32,
            ..Default::default()
        };
        let mut info = PROCESS_INFORMATION::default();

        // SAFETY: every pointer refers to a live, NUL-terminated buffer owned by
        // this frame; `info` receives handles we take ownership of below.
        unsafe {
            CreateProcessW(
                PCWSTR(application.as_ptr()),
                PWSTR(command_line.as_mut_ptr()),
                None,
                None,
                false,
                CREATE_SUSPENDED,
                None,
                PCWSTR(directory.as_ptr()),
                &startup,
                &mut info,
            )
        }
        .map_err(|e| ProcessError::CreateFailed {
            path: executable.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!(process_id = info.dwProcessId, "created suspended process");
        Ok(WindowsProcessHandle {
            process: info.hProcess,
            thread: info.hThread,
            process_id: info.dwProcessId,
        })
    }

    fn write_memory(
        &self,
        handle: &Self::Handle,
        address: u64,
        bytes: &[u8],
    ) -> Result<usize, ProcessError> {
        let mut written = 0usize;
        // SAFETY: the target range lies in another process, so a bad address
        // yields an error rather than undefined behaviour here; `bytes` is a
        // valid slice for the duration of the call.
        let result = unsafe {
            WriteProcessMemory(
                handle.process,
                address as *const c_void,
                bytes.as_ptr().cast(),
                bytes.len(),
                Some(&mut written as *mut usize),
            )
        };
        match result {
            Ok(()) => Ok(written),
            // Partial copies still report how much landed.
            Err(_) if written > 0 => Ok(written),
            Err(e) => Err(ProcessError::WriteFailed {
                address,
                len: bytes.len(),
                reason: e.to_string(),
            }),
        }
    }

    fn resume(&self, handle: &Self::Handle) -> Result<(), ProcessError> {
        // SAFETY: the thread handle is owned by `handle` and still open.
        let previous = unsafe { ResumeThread(handle.thread) };
        if previous == u32::MAX {
            return Err(ProcessError::ResumeFailed {
                process_id: handle.process_id,
                reason: windows::core::Error::from_win32().to_string(),
            });
        }
        Ok(())
    }

    fn terminate(&self, handle: &Self::Handle) -> Result<(), ProcessError> {
        // SAFETY: the process handle is owned by `handle` and still open.
        unsafe { TerminateProcess(handle.process, 1) }.map_err(|e| {
            ProcessError::TerminateFailed {
                process_id: handle.process_id,
                reason: e.to_string(),
            }
        })
    }

    fn is_alive(&self, handle: &Self::Handle) -> bool {
        let mut code = 0u32;
        // SAFETY: the process handle is owned by `handle` and still open.
        match unsafe { GetExitCodeProcess(handle.process, &mut code) } {
            Ok(()) => code == STILL_ACTIVE.0 as u32,
            Err(e) => {
                warn!(process_id = handle.process_id, "GetExitCodeProcess failed: {e}");
                false
            }
        }
    }

    fn process_id(&self, handle: &Self::Handle) -> u32 {
        handle.process_id
    }

    fn kill_single_instance_guard(
        &self,
        process_id: u32,
        guard_name: &str,
    ) -> Result<bool, ProcessError> {
        let guard_failed = |reason: String| ProcessError::GuardFailed { process_id, reason };

        // SAFETY: plain FFI call; the returned handle is closed below.
        let owner = unsafe { OpenProcess(PROCESS_DUP_HANDLE, false, process_id) }
            .map_err(|e| guard_failed(e.to_string()))?;

        let result = query_handle_table()
            .map_err(guard_failed)
            .map(|table| close_named_mutant(owner, process_id, guard_name, &table));

        // SAFETY: `owner` was opened above and is closed exactly once.
        unsafe {
            CloseHandle(owner).ok();
        }
        result
    }
}

// ── Handle table scan ─────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Clone, Copy)]
struct HandleTableEntry {
    object: *mut c_void,
    unique_process_id: usize,
    handle_value: usize,
    granted_access: u32,
    creator_back_trace_index: u16,
    object_type_index: u16,
    handle_attributes: u32,
    reserved: u32,
}

#[repr(C)]
struct HandleTableHeader {
    number_of_handles: usize,
    reserved: usize,
}

/// Snapshot of the system handle table as `(process id, handle value)` pairs.
fn query_handle_table() -> Result<Vec<(usize, usize)>, String> {
    // u64 elements keep the buffer 8-byte aligned.
    let mut buffer: Vec<u64> = vec![0; 1 << 17];
    loop {
        let byte_len = buffer.len() * std::mem::size_of::<u64>();
        let mut needed = 0u32;
        // SAFETY: `buffer` is writable for `byte_len` bytes.
        let status = unsafe {
            NtQuerySystemInformation(
                SYSTEM_EXTENDED_HANDLE_INFORMATION,
                buffer.as_mut_ptr().cast(),
                byte_len as u32,
                &mut needed,
            )
        };
        if status == STATUS_INFO_LENGTH_MISMATCH {
            let grow = (needed as usize).max(byte_len * 2);
            if grow > MAX_HANDLE_TABLE_BYTES {
                return Err("system handle table is too large to query".to_string());
            }
            buffer = vec![0; grow / std::mem::size_of::<u64>() + 1];
            continue;
        }
        if status.is_err() {
            return Err(format!("NtQuerySystemInformation failed: {:#x}", status.0));
        }
        break;
    }

    let header_len = std::mem::size_of::<HandleTableHeader>();
    let entry_len = std::mem::size_of::<HandleTableEntry>();
    let base = buffer.as_ptr().cast::<u8>();
    // SAFETY: the call succeeded, so the buffer starts with a header.
    let count = unsafe { (*base.cast::<HandleTableHeader>()).number_of_handles };
    let capacity = (buffer.len() * std::mem::size_of::<u64>()).saturating_sub(header_len) / entry_len;

    Ok((0..count.min(capacity))
        .map(|i| {
            // SAFETY: `i` is bounded by both the reported count and the buffer.
            let entry = unsafe {
                base.add(header_len + i * entry_len)
                    .cast::<HandleTableEntry>()
                    .read_unaligned()
            };
            (entry.unique_process_id, entry.handle_value)
        })
        .collect())
}

/// Closes the first mutant handle in `owner` whose name ends with
/// `guard_name`.  Returns `true` if one was closed.
fn close_named_mutant(
    owner: HANDLE,
    process_id: u32,
    guard_name: &str,
    table: &[(usize, usize)],
) -> bool {
    for &(_, value) in table.iter().filter(|(pid, _)| *pid == process_id as usize) {
        let remote = HANDLE(value as *mut c_void);
        let mut local = HANDLE::default();

        // SAFETY: duplicating into our own process; failures are skipped.
        let duplicated = unsafe {
            DuplicateHandle(
                owner,
                remote,
                GetCurrentProcess(),
                &mut local,
                0,
                false,
                DUPLICATE_SAME_ACCESS,
            )
        };
        if duplicated.is_err() {
            continue;
        }

        // Name queries can block on some handle types; checking the type
        // first restricts them to mutants.
        let matched = object_string(local, OBJECT_TYPE_INFORMATION).as_deref()
            == Some(MUTANT_TYPE_NAME)
            && object_string(local, OBJECT_NAME_INFORMATION)
                .is_some_and(|name| name.ends_with(guard_name));

        // SAFETY: `local` was created by DuplicateHandle above.
        unsafe {
            CloseHandle(local).ok();
        }
        if !matched {
            continue;
        }

        // SAFETY: closes the handle in the owning process; no target handle
        // is created.
        let closed = unsafe {
            DuplicateHandle(
                owner,
                remote,
                HANDLE::default(),
                std::ptr::null_mut(),
                0,
                false,
                DUPLICATE_CLOSE_SOURCE,
            )
        };
        match closed {
            Ok(()) => {
                debug!(process_id, guard_name, "closed single-instance guard");
                return true;
            }
            Err(e) => warn!(process_id, "failed to close guard handle: {e}"),
        }
    }
    false
}

/// Reads the `UNICODE_STRING` that leads both the name and type records.
fn object_string(handle: HANDLE, class: OBJECT_INFORMATION_CLASS) -> Option<String> {
    let mut buffer: Vec<u64> = vec![0; 256];
    let byte_len = (buffer.len() * std::mem::size_of::<u64>()) as u32;
    let mut needed = 0u32;
    // SAFETY: `buffer` is writable for `byte_len` bytes.
    let status = unsafe {
        NtQueryObject(
            handle,
            class,
            Some(buffer.as_mut_ptr().cast()),
            byte_len,
            Some(&mut needed as *mut u32),
        )
    };
    if status.is_err() {
        return None;
    }

    // SAFETY: on success the buffer starts with a UNICODE_STRING whose buffer
    // points into the same allocation.
    let text = unsafe { &*buffer.as_ptr().cast::<UNICODE_STRING>() };
    if text.Buffer.is_null() || text.Length == 0 {
        return None;
    }
    // SAFETY: Length is in bytes and bounded by the returned record.
    let units = unsafe {
        std::slice::from_raw_parts(text.Buffer.0, usize::from(text.Length) / 2)
    };
    Some(String::from_utf16_lossy(units))
}

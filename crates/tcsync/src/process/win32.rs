use std::ffi::c_void;
use std::mem;

use tracing::{debug, info};
use windows::Win32::Foundation::{CloseHandle, HANDLE, STILL_ACTIVE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_GUARD, PAGE_NOACCESS, VirtualQueryEx,
};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
    PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use crate::error::{Error, Result};
use crate::memory::MemoryPort;
use crate::sync::Attach;

use super::{ProcessConfig, scan_for_pattern};

/// An open handle to the game with table offsets shifted by `base_offset`.
#[derive(Debug)]
pub struct ProcessPort {
    handle: HANDLE,
    base_offset: i64,
}

impl ProcessPort {
    fn address(&self, offset: u64) -> u64 {
        offset.wrapping_add_signed(self.base_offset)
    }

    /// `Detached` when the process has exited, `error` otherwise.
    fn failure(&self, error: Error) -> Error {
        if self.attached() { error } else { Error::Detached }
    }

    /// Committed, readable regions as `(start, len)`.
    fn readable_regions(&self) -> Vec<(u64, usize)> {
        let mut regions = Vec::new();
        let mut address: usize = 0;
        loop {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            // SAFETY: `info` is a valid, writable MEMORY_BASIC_INFORMATION.
            let written = unsafe {
                VirtualQueryEx(
                    self.handle,
                    Some(address as *const c_void),
                    &mut info,
                    mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 || info.RegionSize == 0 {
                break;
            }
            let readable = info.State == MEM_COMMIT
                && (info.Protect.0 & PAGE_GUARD.0) == 0
                && (info.Protect.0 & PAGE_NOACCESS.0) == 0;
            if readable {
                regions.push((info.BaseAddress as u64, info.RegionSize));
            }
            match (info.BaseAddress as usize).checked_add(info.RegionSize) {
                Some(next) if next > address => address = next,
                _ => break,
            }
        }
        regions
    }
}

impl MemoryPort for ProcessPort {
    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut read = 0usize;
        // SAFETY: `buffer` holds `len` writable bytes.
        unsafe {
            ReadProcessMemory(
                self.handle,
                self.address(offset) as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                len,
                Some(&mut read as *mut usize),
            )
        }
        .map_err(|e| {
            self.failure(Error::MemoryReadFailed {
                offset,
                message: e.to_string(),
            })
        })?;
        if read != len {
            return Err(self.failure(Error::MemoryReadFailed {
                offset,
                message: format!("short read ({} of {} bytes)", read, len),
            }));
        }
        Ok(buffer)
    }

    fn write_bytes(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut written = 0usize;
        // SAFETY: `bytes` is a valid slice for the duration of the call.
        unsafe {
            WriteProcessMemory(
                self.handle,
                self.address(offset) as *const c_void,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                Some(&mut written as *mut usize),
            )
        }
        .map_err(|e| {
            self.failure(Error::MemoryWriteFailed {
                offset,
                message: e.to_string(),
            })
        })?;
        if written != bytes.len() {
            return Err(self.failure(Error::MemoryWriteFailed {
                offset,
                message: format!("short write ({} of {} bytes)", written, bytes.len()),
            }));
        }
        Ok(())
    }

    fn attached(&self) -> bool {
        let mut code = 0u32;
        // SAFETY: `code` is a valid out pointer.
        unsafe { GetExitCodeProcess(self.handle, &mut code) }.is_ok()
            && code == STILL_ACTIVE.0 as u32
    }
}

impl Drop for ProcessPort {
    fn drop(&mut self) {
        // SAFETY: the handle was opened by us and is closed exactly once.
        let _ = unsafe { CloseHandle(self.handle) };
    }
}

/// Finds the game by executable name and locates its base offset.
#[derive(Debug, Clone)]
pub struct ProcessAttacher {
    config: ProcessConfig,
}

impl ProcessAttacher {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    fn find_pid(&self) -> Result<u32> {
        // SAFETY: plain snapshot call; the handle is closed below.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|e| Error::ProcessNotFound(e.to_string()))?;

        let mut entry = PROCESSENTRY32W {
            dwSize: mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut found = None;
        // SAFETY: `entry` is initialized with its size as the API requires.
        let mut more = unsafe { Process32FirstW(snapshot, &mut entry) }.is_ok();
        while more {
            let len = entry
                .szExeFile
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(entry.szExeFile.len());
            let exe = String::from_utf16_lossy(&entry.szExeFile[..len]);
            if self.config.matches_exe(&exe) {
                found = Some(entry.th32ProcessID);
                break;
            }
            // SAFETY: as above.
            more = unsafe { Process32NextW(snapshot, &mut entry) }.is_ok();
        }
        // SAFETY: the snapshot handle is owned here.
        let _ = unsafe { CloseHandle(snapshot) };

        found.ok_or_else(|| Error::ProcessNotFound(self.config.name.clone()))
    }
}

impl Attach for ProcessAttacher {
    type Port = ProcessPort;

    fn attach(&mut self) -> Result<ProcessPort> {
        let pid = self.find_pid()?;
        debug!("Found {} (pid {})", self.config.name, pid);

        // SAFETY: plain OpenProcess call; the handle is owned by ProcessPort.
        let handle = unsafe {
            OpenProcess(
                PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION,
                false,
                pid,
            )
        }
        .map_err(|e| Error::ProcessOpenFailed(e.to_string()))?;

        let mut port = ProcessPort {
            handle,
            base_offset: 0,
        };
        let mut found = None;
        for (start, len) in port.readable_regions() {
            if let Some(address) =
                scan_for_pattern(&port, start, len, &self.config.version_pattern)?
            {
                found = Some(address);
                break;
            }
        }
        let address = found.ok_or(Error::PatternNotFound)?;

        port.base_offset = self.config.base_offset(address);
        match self.config.build_name(port.base_offset) {
            Some(build) => info!("Attached to {} ({} build)", self.config.name, build),
            None => info!(
                "Attached to {} (unknown build, base offset {:#x})",
                self.config.name, port.base_offset
            ),
        }
        Ok(port)
    }
}

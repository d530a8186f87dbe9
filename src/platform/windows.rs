// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Windows backend: channel segments are pagefile-backed file mappings,
// named locks are kernel mutexes. The kernel reference-counts both, so the
// header's counter is informational here.

use std::io;
use std::ptr;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, FALSE, HANDLE, INVALID_HANDLE_VALUE, TRUE,
    WAIT_ABANDONED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Security::{
    InitializeSecurityDescriptor, SetSecurityDescriptorDacl, SECURITY_ATTRIBUTES,
    SECURITY_DESCRIPTOR,
};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
    FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
    SEC_COMMIT,
};
use windows_sys::Win32::System::Threading::{CreateMutexW, ReleaseMutex, WaitForSingleObject, INFINITE};

use super::{
    adaptive_yield, calc_size, foreign, header, not_ready, HeaderState, SegmentHeader, ShmMode,
    HEADER_SIZE, INIT_WAIT,
};
use crate::shm_name::{self, Scope};

const SECURITY_DESCRIPTOR_REVISION: u32 = 1;

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Security attributes for kernel objects in `scope`.
///
/// `Global` objects get a NULL DACL so that processes in other sessions
/// (a service and an interactive client) can open them. `Local` objects use
/// the default security of the caller.
struct Security {
    // Pointed to by `attributes.lpSecurityDescriptor`; boxed so it never moves.
    _descriptor: Box<SECURITY_DESCRIPTOR>,
    attributes: SECURITY_ATTRIBUTES,
}

impl Security {
    fn for_scope(scope: Scope) -> io::Result<Option<Self>> {
        if scope == Scope::Local {
            return Ok(None);
        }
        let mut descriptor: Box<SECURITY_DESCRIPTOR> = Box::new(unsafe { std::mem::zeroed() });
        let psd = &mut *descriptor as *mut SECURITY_DESCRIPTOR as *mut core::ffi::c_void;
        unsafe {
            if InitializeSecurityDescriptor(psd, SECURITY_DESCRIPTOR_REVISION) == 0
                || SetSecurityDescriptorDacl(psd, TRUE, ptr::null(), FALSE) == 0
            {
                return Err(io::Error::last_os_error());
            }
        }
        let attributes = SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: psd,
            bInheritHandle: FALSE,
        };
        Ok(Some(Self {
            _descriptor: descriptor,
            attributes,
        }))
    }

    fn as_ptr(this: &Option<Self>) -> *const SECURITY_ATTRIBUTES {
        match this {
            Some(s) => &s.attributes,
            None => ptr::null(),
        }
    }
}

struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { CloseHandle(self.0) };
        }
    }
}

unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

/// A mapped view of a whole file mapping, unmapped on drop.
struct Mapping {
    addr: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
}

impl Mapping {
    fn new(handle: &OwnedHandle) -> io::Result<Self> {
        let addr = unsafe { MapViewOfFile(handle.0, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if addr.Value.is_null() {
            return Err(io::Error::last_os_error());
        }
        let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
        let ret = unsafe {
            VirtualQuery(
                addr.Value,
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if ret == 0 {
            let e = io::Error::last_os_error();
            unsafe { UnmapViewOfFile(addr) };
            return Err(e);
        }
        Ok(Self {
            addr,
            len: info.RegionSize,
        })
    }

    fn ptr(&self) -> *mut u8 {
        self.addr.Value as *mut u8
    }

    fn header(&self) -> &SegmentHeader {
        unsafe { header(self.ptr()) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe { UnmapViewOfFile(self.addr) };
    }
}

// ---------------------------------------------------------------------------
// PlatformShm
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    // Field order matters: unmap the view before closing the mapping handle.
    map: Mapping,
    _handle: OwnedHandle,
    capacity: usize,
    created: bool,
}

unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    pub fn acquire(name: &str, scope: Scope, capacity: usize, mode: ShmMode) -> io::Result<Self> {
        Self::acquire_with(name, scope, capacity, mode, |_| Ok(()))
    }

    pub fn acquire_with<F>(
        name: &str,
        scope: Scope,
        capacity: usize,
        mode: ShmMode,
        init: F,
    ) -> io::Result<Self>
    where
        F: Fn(*mut u8) -> io::Result<()>,
    {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if capacity == 0 && mode != ShmMode::Open {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "capacity is 0"));
        }

        let wide_name = to_wide(&shm_name::win32_name(name, scope));

        if mode == ShmMode::Open {
            let handle = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, FALSE, wide_name.as_ptr()) };
            if handle.is_null() {
                return Err(io::Error::last_os_error());
            }
            let handle = OwnedHandle(handle);
            let map = Mapping::new(&handle)?;
            return match map.header().inspect() {
                HeaderState::Uninitialised => Err(not_ready()),
                HeaderState::Foreign => Err(foreign()),
                HeaderState::Ready { capacity } => Self::attached(map, handle, capacity),
            };
        }

        let total = calc_size(capacity)? as u64;
        let security = Security::for_scope(scope)?;
        let handle = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                Security::as_ptr(&security),
                PAGE_READWRITE | SEC_COMMIT,
                (total >> 32) as u32,
                total as u32,
                wide_name.as_ptr(),
            )
        };
        let err = unsafe { GetLastError() };
        if handle.is_null() {
            return Err(io::Error::from_raw_os_error(err as i32));
        }
        let handle = OwnedHandle(handle);
        let existed = err == ERROR_ALREADY_EXISTS;
        if existed && mode == ShmMode::Create {
            return Err(io::Error::from_raw_os_error(ERROR_ALREADY_EXISTS as i32));
        }

        let map = Mapping::new(&handle)?;
        if !existed {
            init(unsafe { map.ptr().add(HEADER_SIZE) })?;
            map.header().publish(capacity);
            return Ok(Self {
                map,
                _handle: handle,
                capacity,
                created: true,
            });
        }

        // Someone else created it; wait for their header.
        let deadline = std::time::Instant::now() + INIT_WAIT;
        let mut k = 0u32;
        loop {
            match map.header().inspect() {
                HeaderState::Ready { capacity } => return Self::attached(map, handle, capacity),
                HeaderState::Foreign => return Err(foreign()),
                HeaderState::Uninitialised => {}
            }
            if std::time::Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "timed out waiting for the creator to initialise the segment",
                ));
            }
            adaptive_yield(&mut k);
        }
    }

    fn attached(map: Mapping, handle: OwnedHandle, capacity: usize) -> io::Result<Self> {
        if calc_size(capacity)? > map.len {
            return Err(foreign());
        }
        map.header().retain();
        Ok(Self {
            map,
            _handle: handle,
            capacity,
            created: false,
        })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        unsafe { self.map.ptr().add(HEADER_SIZE) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn created(&self) -> bool {
        self.created
    }

    pub fn ref_count(&self) -> i32 {
        self.map.header().ref_count()
    }

    // Pagefile-backed: the kernel drops the object with its last handle.
    pub fn unlink_by_name(_name: &str, _scope: Scope) {}
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        self.map.header().release();
    }
}

// ---------------------------------------------------------------------------
// PlatformMutex: named kernel mutex
// ---------------------------------------------------------------------------

pub struct PlatformMutex {
    handle: OwnedHandle,
}

impl PlatformMutex {
    pub fn open(name: &str, scope: Scope) -> io::Result<Self> {
        let wide_name = to_wide(&shm_name::win32_name(name, scope));
        let security = Security::for_scope(scope)?;
        let h = unsafe { CreateMutexW(Security::as_ptr(&security), FALSE, wide_name.as_ptr()) };
        if h.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            handle: OwnedHandle(h),
        })
    }

    fn wait(&self, ms: u32) -> io::Result<bool> {
        match unsafe { WaitForSingleObject(self.handle.0, ms) } {
            // An abandoned mutex is still ours; the previous owner died holding it.
            WAIT_OBJECT_0 | WAIT_ABANDONED => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            _ => Err(io::Error::last_os_error()),
        }
    }

    pub fn lock(&self) -> io::Result<()> {
        self.wait(INFINITE).map(|_| ())
    }

    pub fn try_lock(&self) -> io::Result<bool> {
        self.wait(0)
    }

    pub fn unlock(&self) -> io::Result<()> {
        if unsafe { ReleaseMutex(self.handle.0) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn clear_storage(_name: &str, _scope: Scope) {}
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX backend: channel segments are `shm_open` objects mapped with `mmap`,
// named locks are process-shared robust `pthread_mutex_t`s living in their
// own small segment.
//
// POSIX shared memory objects outlive every process until unlinked, so the
// header's reference counter stands in for the kernel reference count that
// Windows keeps: the handle that releases the last reference unlinks the
// object.

use std::collections::HashMap;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Instant;

use super::{
    adaptive_yield, calc_size, foreign, header, not_ready, HeaderState, SegmentHeader, ShmMode,
    HEADER_SIZE, INIT_WAIT,
};
use crate::shm_name::{self, Scope};

/// Permission bits for a new object: owner-only for `Local`, world
/// read/write for `Global`.
fn perms_for(scope: Scope) -> libc::mode_t {
    match scope {
        Scope::Local => 0o600,
        Scope::Global => 0o666,
    }
}

fn shm_open(c_name: &CString, flags: libc::c_int, perms: libc::mode_t) -> io::Result<OwnedFd> {
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, perms as libc::c_uint) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn shm_unlink(c_name: &CString) {
    unsafe { libc::shm_unlink(c_name.as_ptr()) };
}

// ---------------------------------------------------------------------------
// Mapping: an mmap'd region, unmapped on drop
// ---------------------------------------------------------------------------

struct Mapping {
    ptr: *mut u8,
    len: usize,
}

impl Mapping {
    fn new(fd: &OwnedFd, len: usize) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr: mem as *mut u8,
            len,
        })
    }

    fn header(&self) -> &SegmentHeader {
        unsafe { header(self.ptr) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
    }
}

// ---------------------------------------------------------------------------
// PlatformShm
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    map: Mapping,
    capacity: usize,
    name: CString, // POSIX name (with leading '/')
    created: bool,
}

// Safety: the mapping is process-shared by design; callers synchronise
// access to the user region themselves.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Create or attach to the segment `name` in `scope`.
    ///
    /// `capacity` is ignored for [`ShmMode::Open`]; the existing header
    /// supplies it.
    pub fn acquire(name: &str, scope: Scope, capacity: usize, mode: ShmMode) -> io::Result<Self> {
        Self::acquire_with(name, scope, capacity, mode, |_| Ok(()))
    }

    /// Like [`acquire`](Self::acquire), running `init` on the user region of
    /// a segment this call creates, before the header is published.
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

        let posix_name = shm_name::make_shm_name(name, scope);
        let c_name = CString::new(posix_name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let perms = perms_for(scope);

        match mode {
            ShmMode::Create => Self::create(c_name, capacity, perms, &init),
            ShmMode::Open => Self::attach(c_name)?.ok_or_else(not_ready),
            ShmMode::CreateOrOpen => Self::create_or_attach(c_name, capacity, perms, &init),
        }
    }

    fn create<F>(c_name: CString, capacity: usize, perms: libc::mode_t, init: &F) -> io::Result<Self>
    where
        F: Fn(*mut u8) -> io::Result<()>,
    {
        let total = calc_size(capacity)?;
        let fd = shm_open(&c_name, libc::O_RDWR | libc::O_CREAT | libc::O_EXCL, perms)?;

        // The name is ours from here on; take it back down if setup fails.
        match Self::initialise(&fd, total, capacity, perms, init) {
            Ok(map) => Ok(Self {
                map,
                capacity,
                name: c_name,
                created: true,
            }),
            Err(e) => {
                shm_unlink(&c_name);
                Err(e)
            }
        }
    }

    fn initialise<F>(
        fd: &OwnedFd,
        total: usize,
        capacity: usize,
        perms: libc::mode_t,
        init: &F,
    ) -> io::Result<Mapping>
    where
        F: Fn(*mut u8) -> io::Result<()>,
    {
        // Override the umask so `Global` objects really are world-accessible.
        if unsafe { libc::fchmod(fd.as_raw_fd(), perms) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let len = libc::off_t::try_from(total)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "segment too large"))?;
        if unsafe { libc::ftruncate(fd.as_raw_fd(), len) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let map = Mapping::new(fd, total)?;
        init(unsafe { map.ptr.add(HEADER_SIZE) })?;
        map.header().publish(capacity);
        Ok(map)
    }

    /// Attach to an existing segment. `Ok(None)` means the object exists but
    /// its creator has not published the header yet, or its last holder is
    /// taking it down.
    fn attach(c_name: CString) -> io::Result<Option<Self>> {
        let fd = shm_open(&c_name, libc::O_RDWR, 0)?;

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd.as_raw_fd(), &mut st) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let size = st.st_size as usize;
        if size < HEADER_SIZE {
            return Ok(None);
        }

        let map = Mapping::new(&fd, size)?;
        let capacity = match map.header().inspect() {
            HeaderState::Uninitialised => return Ok(None),
            HeaderState::Foreign => return Err(foreign()),
            HeaderState::Ready { capacity } => capacity,
        };
        if calc_size(capacity)? > size {
            return Err(foreign());
        }
        // Count already at zero: the last holder is about to unlink.
        if !map.header().try_retain() {
            return Ok(None);
        }

        Ok(Some(Self {
            map,
            capacity,
            name: c_name,
            created: false,
        }))
    }

    fn create_or_attach<F>(
        c_name: CString,
        capacity: usize,
        perms: libc::mode_t,
        init: &F,
    ) -> io::Result<Self>
    where
        F: Fn(*mut u8) -> io::Result<()>,
    {
        let deadline = Instant::now() + INIT_WAIT;
        let mut k = 0u32;
        loop {
            // Try exclusive create first so only the real owner truncates.
            match Self::create(c_name.clone(), capacity, perms, init) {
                Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {}
                other => return other,
            }
            match Self::attach(c_name.clone()) {
                Ok(Some(shm)) => return Ok(shm),
                Ok(None) => {}
                // The owner vanished between our two calls: create again.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "timed out waiting for the creator to initialise the segment",
                ));
            }
            adaptive_yield(&mut k);
        }
    }

    /// Pointer to the start of the user region.
    pub fn as_ptr(&self) -> *mut u8 {
        unsafe { self.map.ptr.add(HEADER_SIZE) }
    }

    /// User-visible capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether this handle created the segment.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Number of live handles across all processes.
    pub fn ref_count(&self) -> i32 {
        self.map.header().ref_count()
    }

    /// Force-remove the backing object. Existing mappings stay valid.
    pub fn unlink(&self) {
        shm_unlink(&self.name);
    }

    /// Remove a named segment without an open handle.
    pub fn unlink_by_name(name: &str, scope: Scope) {
        if let Ok(c_name) = CString::new(shm_name::make_shm_name(name, scope)) {
            shm_unlink(&c_name);
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        // Last reference anywhere: take the name down. `map` unmaps after.
        if self.map.header().release() <= 1 {
            self.unlink();
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformMutex: process-shared pthread mutex in its own segment
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "macos"))]
const EOWNERDEAD: i32 = libc::EOWNERDEAD;

#[cfg(not(target_os = "macos"))]
extern "C" {
    fn pthread_mutexattr_setrobust(
        attr: *mut libc::pthread_mutexattr_t,
        robustness: libc::c_int,
    ) -> libc::c_int;
    fn pthread_mutex_consistent(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;
}

#[cfg(not(target_os = "macos"))]
const PTHREAD_MUTEX_ROBUST: libc::c_int = 1;

// All handles in one process that open the same lock must share a single
// mapping: macOS pthreads keep address-relative state inside the mutex, so a
// second mmap of the same page at another address fails with EINVAL.
fn lock_cache() -> &'static Mutex<HashMap<String, Weak<PlatformShm>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Weak<PlatformShm>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn init_mutex(base: *mut u8) -> io::Result<()> {
    let mtx_ptr = base as *mut libc::pthread_mutex_t;
    unsafe {
        ptr::write_bytes(mtx_ptr, 0, 1);

        let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
        let mut eno = libc::pthread_mutexattr_init(&mut attr);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }

        eno = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        #[cfg(not(target_os = "macos"))]
        if eno == 0 {
            eno = pthread_mutexattr_setrobust(&mut attr, PTHREAD_MUTEX_ROBUST);
        }
        if eno == 0 {
            eno = libc::pthread_mutex_init(mtx_ptr, &attr);
        }
        libc::pthread_mutexattr_destroy(&mut attr);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
    }
    Ok(())
}

pub struct PlatformMutex {
    shm: Arc<PlatformShm>,
}

impl PlatformMutex {
    /// Open (or create) the named lock `name` in `scope`.
    pub fn open(name: &str, scope: Scope) -> io::Result<Self> {
        let key = shm_name::make_shm_name(name, scope);
        let mut cache = lock_cache()
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock cache poisoned"))?;
        if let Some(shm) = cache.get(&key).and_then(Weak::upgrade) {
            return Ok(Self { shm });
        }

        let size = std::mem::size_of::<libc::pthread_mutex_t>();
        let shm = Arc::new(PlatformShm::acquire_with(
            name,
            scope,
            size,
            ShmMode::CreateOrOpen,
            init_mutex,
        )?);
        cache.retain(|_, weak| weak.strong_count() > 0);
        cache.insert(key, Arc::downgrade(&shm));
        Ok(Self { shm })
    }

    fn mtx_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.shm.as_ptr() as *mut libc::pthread_mutex_t
    }

    /// Recover a robust mutex whose previous owner died holding it.
    #[cfg(not(target_os = "macos"))]
    fn make_consistent(&self) -> io::Result<()> {
        let eno = unsafe { pthread_mutex_consistent(self.mtx_ptr()) };
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }

    /// Lock (blocking).
    pub fn lock(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_mutex_lock(self.mtx_ptr()) };
        match eno {
            0 => Ok(()),
            #[cfg(not(target_os = "macos"))]
            EOWNERDEAD => self.make_consistent(),
            _ => Err(io::Error::from_raw_os_error(eno)),
        }
    }

    /// Lock without blocking. `Ok(false)` when another holder has it.
    pub fn try_lock(&self) -> io::Result<bool> {
        let eno = unsafe { libc::pthread_mutex_trylock(self.mtx_ptr()) };
        match eno {
            0 => Ok(true),
            libc::EBUSY => Ok(false),
            #[cfg(not(target_os = "macos"))]
            EOWNERDEAD => self.make_consistent().map(|()| true),
            _ => Err(io::Error::from_raw_os_error(eno)),
        }
    }

    pub fn unlock(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_mutex_unlock(self.mtx_ptr()) };
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }

    /// Remove the lock's backing segment and forget any cached mapping.
    pub fn clear_storage(name: &str, scope: Scope) {
        if let Ok(mut cache) = lock_cache().lock() {
            cache.remove(&shm_name::make_shm_name(name, scope));
        }
        PlatformShm::unlink_by_name(name, scope);
    }
}

// No pthread_mutex_destroy on drop: on macOS the address may already be
// recycled for another segment once unmapped. Unmap + unlink is enough.

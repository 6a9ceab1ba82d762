// POSIX named semaphores (sem_open / sem_wait / sem_post / sem_unlink)
//
// Apple targets have no sem_timedwait(), so a bounded acquire there blocks
// without limit and the backend reports `supports_timeout() == false`.

use super::{checked_semaphore_name, NamedSemaphore, SemaphoreBackend};
use crate::error::{HolodeckError, HolodeckResult};
use crate::memory::platform::PlatformFamily;
use std::ffi::CString;
use std::io;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

const MODE: libc::c_uint = 0o600;

/// Backend over `sem_open` named semaphores
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixBackend;

impl PosixBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SemaphoreBackend for PosixBackend {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn family(&self) -> PlatformFamily {
        PlatformFamily::Posix
    }

    fn supports_timeout(&self) -> bool {
        HAS_TIMEDWAIT
    }

    fn open(&self, base: &str, session_id: &str) -> HolodeckResult<Box<dyn NamedSemaphore>> {
        let name = checked_semaphore_name(self.family(), base, session_id)?;
        let c_name = c_name(&name)?;

        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(HolodeckError::initialization(name, io::Error::last_os_error()));
        }

        log::debug!("Semaphore '{}': opened", name);
        Ok(Box::new(PosixSemaphore::new(name, sem)))
    }

    fn create(
        &self,
        base: &str,
        session_id: &str,
        initial: u32,
    ) -> HolodeckResult<Box<dyn NamedSemaphore>> {
        let name = checked_semaphore_name(self.family(), base, session_id)?;
        let c_name = c_name(&name)?;

        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                MODE,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(HolodeckError::initialization(name, io::Error::last_os_error()));
        }

        log::debug!("Semaphore '{}': created with count {}", name, initial);
        Ok(Box::new(PosixSemaphore::new(name, sem)))
    }

    fn remove(&self, base: &str, session_id: &str) -> HolodeckResult<()> {
        let name = checked_semaphore_name(self.family(), base, session_id)?;
        sem_unlink(&name).map_err(HolodeckError::from)
    }
}

/// An open POSIX named semaphore
#[derive(Debug)]
pub struct PosixSemaphore {
    name: String,
    sem: *mut libc::sem_t,
    closed: bool,
    #[cfg_attr(not(any(target_os = "macos", target_os = "ios")), allow(dead_code))]
    warned_timeout: AtomicBool,
}

// sem_t handles returned by sem_open may be used from any thread
unsafe impl Send for PosixSemaphore {}

impl PosixSemaphore {
    fn new(name: String, sem: *mut libc::sem_t) -> Self {
        Self {
            name,
            sem,
            closed: false,
            warned_timeout: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self, operation: &'static str) -> HolodeckResult<()> {
        if self.closed {
            return Err(HolodeckError::State {
                operation,
                state: format!("unlinked ({})", self.name),
            });
        }
        Ok(())
    }

    fn wait(&self) -> HolodeckResult<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    fn timed_wait(&self, timeout: Duration) -> HolodeckResult<()> {
        let deadline = realtime_deadline(timeout)?;
        loop {
            if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => {
                    return Err(HolodeckError::Timeout {
                        name: self.name.clone(),
                        timeout,
                    })
                }
                _ => return Err(err.into()),
            }
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    fn timed_wait(&self, timeout: Duration) -> HolodeckResult<()> {
        if !self.warned_timeout.swap(true, std::sync::atomic::Ordering::Relaxed) {
            log::warn!(
                "Semaphore '{}': bounded wait of {:?} requested, but this platform has no \
                 sem_timedwait(); waiting without limit",
                self.name,
                timeout
            );
        }
        self.wait()
    }
}

impl NamedSemaphore for PosixSemaphore {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self, timeout: Option<Duration>) -> HolodeckResult<()> {
        self.ensure_open("acquire")?;
        match timeout {
            Some(timeout) => self.timed_wait(timeout),
            None => self.wait(),
        }
    }

    fn release(&self) -> HolodeckResult<()> {
        self.ensure_open("release")?;
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    fn unlink(&mut self) -> HolodeckResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        unsafe { libc::sem_close(self.sem) };
        sem_unlink(&self.name)?;
        log::debug!("Semaphore '{}': unlinked", self.name);
        Ok(())
    }
}

impl Drop for PosixSemaphore {
    fn drop(&mut self) {
        if !self.closed {
            unsafe { libc::sem_close(self.sem) };
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
const HAS_TIMEDWAIT: bool = true;

#[cfg(any(target_os = "macos", target_os = "ios"))]
const HAS_TIMEDWAIT: bool = false;

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains a NUL byte"))
}

fn sem_unlink(name: &str) -> io::Result<()> {
    let c_name = c_name(name)?;
    if unsafe { libc::sem_unlink(c_name.as_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Absolute CLOCK_REALTIME deadline `timeout` from now, as sem_timedwait wants
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn realtime_deadline(timeout: Duration) -> io::Result<libc::timespec> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let nanos = now.tv_nsec as u64 + timeout.subsec_nanos() as u64;
    let secs = (now.tv_sec as u64)
        .saturating_add(timeout.as_secs())
        .saturating_add(nanos / 1_000_000_000);

    Ok(libc::timespec {
        tv_sec: secs.min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: (nanos % 1_000_000_000) as libc::c_long,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::platform::SERVER_SEMAPHORE;

    fn session() -> String {
        format!("posix{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
    }

    #[test]
    fn test_open_requires_existing_semaphore() {
        let backend = PosixBackend::new();
        let err = backend.open(SERVER_SEMAPHORE, &session()).unwrap_err();
        match err {
            HolodeckError::Initialization { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("expected initialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_is_exclusive() {
        let backend = PosixBackend::new();
        let session = session();
        let mut created = backend.create(SERVER_SEMAPHORE, &session, 0).unwrap();

        match backend.create(SERVER_SEMAPHORE, &session, 0).unwrap_err() {
            HolodeckError::Initialization { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists)
            }
            other => panic!("expected initialization error, got {:?}", other),
        }

        created.unlink().unwrap();
        let mut recreated = backend.create(SERVER_SEMAPHORE, &session, 0).unwrap();
        recreated.unlink().unwrap();
    }

    #[test]
    fn test_release_then_acquire_across_handles() {
        let backend = PosixBackend::new();
        let session = session();
        let mut created = backend.create(SERVER_SEMAPHORE, &session, 0).unwrap();
        let opened = backend.open(SERVER_SEMAPHORE, &session).unwrap();
        assert_eq!(opened.name(), created.name());

        created.release().unwrap();
        opened.acquire(Some(Duration::from_secs(5))).unwrap();

        created.unlink().unwrap();
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    #[test]
    fn test_bounded_acquire_times_out() {
        let backend = PosixBackend::new();
        let session = session();
        let mut sem = backend.create(SERVER_SEMAPHORE, &session, 0).unwrap();

        let start = std::time::Instant::now();
        let err = sem.acquire(Some(Duration::from_millis(50))).unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() >= Duration::from_millis(40));

        sem.unlink().unwrap();
    }

    #[test]
    fn test_unlinked_handle_rejects_operations() {
        let backend = PosixBackend::new();
        let mut sem = backend.create(SERVER_SEMAPHORE, &session(), 1).unwrap();
        sem.unlink().unwrap();
        sem.unlink().unwrap();

        assert!(matches!(sem.release(), Err(HolodeckError::State { .. })));
        assert!(matches!(sem.acquire(None), Err(HolodeckError::State { .. })));
    }
}

//! Named cross-process semaphores
//!
//! The session handshake needs one capability set (open, acquire, release,
//! unlink) over two unrelated OS primitive families. Each family is a
//! [`SemaphoreBackend`]; the backend is picked once, when a session is built,
//! and the session never branches on platform after that.

#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

use crate::error::{HolodeckError, HolodeckResult};
use crate::memory::platform::{check_component, PlatformFamily};
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
pub use posix::{PosixBackend, PosixSemaphore};
#[cfg(windows)]
pub use windows::{WindowsBackend, WindowsSemaphore};

/// Handle to one named, cross-process counting semaphore
pub trait NamedSemaphore: Send + Debug {
    /// Full OS name of the semaphore
    fn name(&self) -> &str;

    /// Block until the semaphore is signaled
    ///
    /// With `Some(timeout)` the wait fails with
    /// [`HolodeckError::Timeout`](crate::HolodeckError::Timeout) once the
    /// bound elapses, unless the backend reports `supports_timeout() ==
    /// false`, in which case the bound is accepted and has no effect.
    fn acquire(&self, timeout: Option<Duration>) -> HolodeckResult<()>;

    /// Increment the count, waking one blocked waiter
    fn release(&self) -> HolodeckResult<()>;

    /// Release OS resources and remove the global name where the platform
    /// requires explicit removal. Further calls are no-ops.
    fn unlink(&mut self) -> HolodeckResult<()>;
}

/// One OS family of named semaphores
pub trait SemaphoreBackend: Send + Sync + Debug {
    /// Short backend name for logging/diagnostics
    fn name(&self) -> &'static str;

    fn family(&self) -> PlatformFamily;

    /// Whether `acquire` honors a bounded wait
    fn supports_timeout(&self) -> bool;

    /// Attach to the semaphore `base` + `session_id`, which must already exist
    ///
    /// Fails with [`HolodeckError::Initialization`](crate::HolodeckError::Initialization)
    /// if the peer has not created it yet.
    fn open(&self, base: &str, session_id: &str) -> HolodeckResult<Box<dyn NamedSemaphore>>;

    /// Exclusively create the semaphore `base` + `session_id` (peer side)
    ///
    /// Fails with an `Initialization` error wrapping
    /// [`std::io::ErrorKind::AlreadyExists`] if the name is taken.
    fn create(
        &self,
        base: &str,
        session_id: &str,
        initial: u32,
    ) -> HolodeckResult<Box<dyn NamedSemaphore>>;

    /// Remove a semaphore name without opening it (leak cleanup)
    fn remove(&self, base: &str, session_id: &str) -> HolodeckResult<()>;
}

/// OS name of the semaphore `base` + `session_id` for `family`
///
/// Session ids holding a reserved character are refused rather than rewritten.
pub(crate) fn checked_semaphore_name(
    family: PlatformFamily,
    base: &str,
    session_id: &str,
) -> HolodeckResult<String> {
    let name = family.semaphore_name(base, session_id);
    check_component("session id", session_id).map_err(|reason| {
        HolodeckError::initialization(
            name.clone(),
            io::Error::new(io::ErrorKind::InvalidInput, reason),
        )
    })?;
    Ok(name)
}

/// Backend for the host platform family
pub fn default_backend() -> HolodeckResult<Arc<dyn SemaphoreBackend>> {
    match PlatformFamily::current()? {
        #[cfg(unix)]
        PlatformFamily::Posix => Ok(Arc::new(PosixBackend::new())),
        #[cfg(windows)]
        PlatformFamily::Windows => Ok(Arc::new(WindowsBackend::new())),
        #[allow(unreachable_patterns)]
        other => Err(HolodeckError::UnsupportedPlatform(format!(
            "no semaphore backend for {} on {}",
            other,
            crate::memory::platform::platform_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backend_matches_platform() {
        let backend = default_backend().unwrap();
        assert_eq!(backend.family(), PlatformFamily::current().unwrap());
        assert!(!backend.name().is_empty());

        if cfg!(any(target_os = "macos", target_os = "ios")) {
            assert!(!backend.supports_timeout());
        } else {
            assert!(backend.supports_timeout());
        }
    }

    #[test]
    fn test_reserved_session_ids_are_refused() {
        let backend = default_backend().unwrap();
        for session in ["a/b", "a:b", "a\\b"] {
            match backend.open(crate::memory::SERVER_SEMAPHORE, session).unwrap_err() {
                HolodeckError::Initialization { source, .. } => {
                    assert_eq!(source.kind(), io::ErrorKind::InvalidInput)
                }
                other => panic!("expected initialization error, got {:?}", other),
            }
            assert!(backend.create(crate::memory::CLIENT_SEMAPHORE, session, 0).is_err());
        }
    }
}

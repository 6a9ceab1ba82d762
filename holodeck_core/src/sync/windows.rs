// Win32 named semaphores (OpenSemaphoreW / WaitForSingleObject / ReleaseSemaphore)
//
// Named kernel objects vanish once the last handle closes, so unlink only
// closes our handle.

use super::{checked_semaphore_name, NamedSemaphore, SemaphoreBackend};
use crate::error::{HolodeckError, HolodeckResult};
use crate::memory::platform::PlatformFamily;
use std::io;
use std::ptr;
use std::time::Duration;
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Threading::{
    CreateSemaphoreW, OpenSemaphoreW, ReleaseSemaphore, WaitForSingleObject, INFINITE,
};

const SEMAPHORE_ALL_ACCESS: u32 = 0x1F0003;

/// Backend over Win32 named semaphores
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

fn wide(name: &str) -> Vec<u16> {
    name.encode_utf16().chain(std::iter::once(0)).collect()
}

impl SemaphoreBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        "win32"
    }

    fn family(&self) -> PlatformFamily {
        PlatformFamily::Windows
    }

    fn supports_timeout(&self) -> bool {
        true
    }

    fn open(&self, base: &str, session_id: &str) -> HolodeckResult<Box<dyn NamedSemaphore>> {
        let name = checked_semaphore_name(self.family(), base, session_id)?;
        let handle = unsafe { OpenSemaphoreW(SEMAPHORE_ALL_ACCESS, 0, wide(&name).as_ptr()) };
        if handle == 0 {
            return Err(HolodeckError::initialization(name, io::Error::last_os_error()));
        }

        log::debug!("Semaphore '{}': opened", name);
        Ok(Box::new(WindowsSemaphore::new(name, handle)))
    }

    fn create(
        &self,
        base: &str,
        session_id: &str,
        initial: u32,
    ) -> HolodeckResult<Box<dyn NamedSemaphore>> {
        let name = checked_semaphore_name(self.family(), base, session_id)?;
        let handle = unsafe {
            CreateSemaphoreW(
                ptr::null(),
                initial.min(i32::MAX as u32) as i32,
                i32::MAX,
                wide(&name).as_ptr(),
            )
        };
        if handle == 0 {
            return Err(HolodeckError::initialization(name, io::Error::last_os_error()));
        }
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            unsafe { CloseHandle(handle) };
            return Err(HolodeckError::initialization(
                name,
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }

        log::debug!("Semaphore '{}': created with count {}", name, initial);
        Ok(Box::new(WindowsSemaphore::new(name, handle)))
    }

    fn remove(&self, _base: &str, _session_id: &str) -> HolodeckResult<()> {
        Ok(())
    }
}

/// An open Win32 named semaphore handle
#[derive(Debug)]
pub struct WindowsSemaphore {
    name: String,
    handle: HANDLE,
    closed: bool,
}

unsafe impl Send for WindowsSemaphore {}

impl WindowsSemaphore {
    fn new(name: String, handle: HANDLE) -> Self {
        Self {
            name,
            handle,
            closed: false,
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
}

impl NamedSemaphore for WindowsSemaphore {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self, timeout: Option<Duration>) -> HolodeckResult<()> {
        self.ensure_open("acquire")?;

        // INFINITE is u32::MAX, so clamp bounded waits just below it
        let millis = match timeout {
            Some(timeout) => timeout.as_millis().min((INFINITE - 1) as u128) as u32,
            None => INFINITE,
        };

        match unsafe { WaitForSingleObject(self.handle, millis) } {
            WAIT_OBJECT_0 => Ok(()),
            WAIT_TIMEOUT => Err(HolodeckError::Timeout {
                name: self.name.clone(),
                timeout: timeout.unwrap_or(Duration::MAX),
            }),
            _ => Err(io::Error::last_os_error().into()),
        }
    }

    fn release(&self) -> HolodeckResult<()> {
        self.ensure_open("release")?;
        if unsafe { ReleaseSemaphore(self.handle, 1, ptr::null_mut()) } == 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    fn unlink(&mut self) -> HolodeckResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if unsafe { CloseHandle(self.handle) } == 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }
}

impl Drop for WindowsSemaphore {
    fn drop(&mut self) {
        if !self.closed {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

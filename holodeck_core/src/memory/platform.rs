// Cross-platform OS object naming for HOLODECK sessions
//
// POSIX:   /HOLODECK_MEM<session>_<key>, /HOLODECK_SEMAPHORE_SERVER<session>
// Windows: /HOLODECK_MEM<session>_<key>, Global\HOLODECK_SEMAPHORE_SERVER<session>
//
// The engine builds the same names from the session id it receives on its
// command line, so these formats are part of the wire contract.

use crate::error::HolodeckResult;

/// Prefix of every shared buffer name
pub const MEMORY_PREFIX: &str = "HOLODECK_MEM";

/// Semaphore the client posts to hand the turn to the engine
pub const SERVER_SEMAPHORE: &str = "HOLODECK_SEMAPHORE_SERVER";

/// Semaphore the engine posts to hand the turn back to the client
pub const CLIENT_SEMAPHORE: &str = "HOLODECK_SEMAPHORE_CLIENT";

/// The two OS families with named cross-process semaphores and shared memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFamily {
    /// `sem_open` / `shm_open` (Linux, macOS, BSD)
    Posix,
    /// `OpenSemaphoreW` / `CreateFileMappingW`
    Windows,
}

impl PlatformFamily {
    /// Detect the family of the host we were compiled for
    ///
    /// Hosts outside both families are rejected with
    /// [`HolodeckError::UnsupportedPlatform`].
    pub fn current() -> HolodeckResult<Self> {
        #[cfg(unix)]
        {
            Ok(PlatformFamily::Posix)
        }

        #[cfg(windows)]
        {
            Ok(PlatformFamily::Windows)
        }

        #[cfg(not(any(unix, windows)))]
        {
            Err(crate::error::HolodeckError::UnsupportedPlatform(
                std::env::consts::OS.to_string(),
            ))
        }
    }

    /// Full OS name of a session semaphore
    pub fn semaphore_name(self, base: &str, session_id: &str) -> String {
        match self {
            PlatformFamily::Posix => format!("/{}{}", base, session_id),
            PlatformFamily::Windows => format!("Global\\{}{}", base, session_id),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformFamily::Posix => "posix",
            PlatformFamily::Windows => "windows",
        }
    }
}

impl std::fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full OS name of the shared buffer `key` in session `session_id`
///
/// Components are used verbatim; run [`check_component`] on them first.
pub fn memory_name(session_id: &str, key: &str) -> String {
    format!("/{}{}_{}", MEMORY_PREFIX, session_id, key)
}

/// Characters OS object names cannot carry inside a session id or key
pub const RESERVED_CHARS: [char; 4] = ['/', '\\', ':', '\0'];

/// Reject a session id or key that contains a [`RESERVED_CHARS`] character
///
/// Names are never rewritten, so two distinct keys always map to two
/// distinct OS objects.
pub fn check_component(what: &str, value: &str) -> Result<(), String> {
    match value.chars().find(|c| RESERVED_CHARS.contains(c)) {
        Some(c) => Err(format!(
            "{} '{}' contains reserved character {:?}",
            what,
            value.escape_default(),
            c
        )),
        None => Ok(()),
    }
}

/// Get platform name for logging/diagnostics
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "linux")]
    { "Linux" }

    #[cfg(target_os = "macos")]
    { "macOS" }

    #[cfg(target_os = "windows")]
    { "Windows" }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    { std::env::consts::OS }
}

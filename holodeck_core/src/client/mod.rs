//! # Session client
//!
//! [`HolodeckClient`] is the one object environment code talks to. It owns the
//! session's shared buffers and the two handshake semaphores, and enforces the
//! turn-taking protocol:
//!
//! ```text
//!            release()                     acquire() ok
//! ClientTurn ─────────> WaitingForPeer ───────────────> ClientTurn
//!     │                   │      ▲
//!     │                   └──────┘ acquire() timed out (retryable)
//!     └──── teardown() from any state ────> TornDown
//! ```
//!
//! Writes made before `release` are visible to the engine once it acquires;
//! writes made while waiting for the engine race it and must not happen.

pub mod registry;

use crate::config::{ClientConfig, InitialTurn, TimeoutPolicy};
use crate::error::{HolodeckError, HolodeckResult};
use crate::memory::platform::{CLIENT_SEMAPHORE, SERVER_SEMAPHORE};
use crate::memory::{DType, Element, SharedBuffer};
use crate::sync::{default_backend, NamedSemaphore, SemaphoreBackend};
use std::fmt;
use std::sync::Arc;

pub use registry::BufferRegistry;

/// Who may touch the shared buffers right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// This process may read and write buffers, then `release`
    ClientTurn,
    /// Control was handed to the engine; `acquire` to get it back
    WaitingForPeer,
    /// Session resources were released; terminal
    TornDown,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::ClientTurn => write!(f, "client-turn"),
            TurnState::WaitingForPeer => write!(f, "waiting-for-peer"),
            TurnState::TornDown => write!(f, "torn-down"),
        }
    }
}

/// Client side of a lockstep session with a simulation engine
///
/// # Example
///
/// ```no_run
/// use holodeck_core::{ClientConfig, DType, HolodeckClient};
///
/// let mut client = HolodeckClient::new(ClientConfig::new("abc").with_engine_timeout())?;
/// client
///     .allocate("cmd", &[4], DType::F32)?
///     .write(&[0.0f32, 0.0, 2.0, 1000.0])?;
/// client.tick()?;
/// let state = client.buffer("state").map(|b| b.to_vec::<f32>());
/// client.teardown();
/// # Ok::<(), holodeck_core::HolodeckError>(())
/// ```
pub struct HolodeckClient {
    config: ClientConfig,
    backend: Arc<dyn SemaphoreBackend>,
    buffers: BufferRegistry,
    /// Posted by us: the engine may proceed
    server: Box<dyn NamedSemaphore>,
    /// Posted by the engine: we may proceed
    client: Box<dyn NamedSemaphore>,
    state: TurnState,
}

impl HolodeckClient {
    /// Attach to the session's semaphores using the host platform backend
    ///
    /// The engine must already have created both semaphores.
    pub fn new(config: ClientConfig) -> HolodeckResult<Self> {
        Self::with_backend(config, default_backend()?)
    }

    /// Configuration from `HOLODECK_*` environment variables
    pub fn from_env() -> HolodeckResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_backend(
        config: ClientConfig,
        backend: Arc<dyn SemaphoreBackend>,
    ) -> HolodeckResult<Self> {
        let server = backend.open(SERVER_SEMAPHORE, &config.session_id)?;
        let client = backend.open(CLIENT_SEMAPHORE, &config.session_id)?;

        if let TimeoutPolicy::Bounded(timeout) = config.timeout_policy() {
            if !backend.supports_timeout() {
                log::warn!(
                    "Session '{}': {} semaphores cannot honor the {:?} timeout; \
                     acquire will wait without limit",
                    config.session_id,
                    backend.name(),
                    timeout
                );
            }
        }

        let state = match config.initial_turn {
            InitialTurn::Client => TurnState::ClientTurn,
            InitialTurn::Peer => TurnState::WaitingForPeer,
        };

        log::info!(
            "Session '{}': attached via {} semaphores ({})",
            config.session_id,
            backend.name(),
            state
        );

        Ok(Self {
            buffers: BufferRegistry::new(&config.session_id),
            config,
            backend,
            server,
            client,
            state,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether `acquire` honors the configured timeout on this platform
    pub fn supports_timeout(&self) -> bool {
        self.backend.supports_timeout()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get a shared buffer for `key`, creating or reallocating it as needed
    ///
    /// The returned view borrows the client, so it cannot outlive a later
    /// reallocation of the same key.
    pub fn allocate(
        &mut self,
        key: &str,
        shape: &[usize],
        dtype: DType,
    ) -> HolodeckResult<&mut SharedBuffer> {
        self.ensure_live("allocate")?;
        self.buffers.allocate(key, shape, dtype)
    }

    /// [`allocate`](Self::allocate) and view the result as `[T]`
    pub fn allocate_typed<T: Element>(
        &mut self,
        key: &str,
        shape: &[usize],
    ) -> HolodeckResult<&mut [T]> {
        self.allocate(key, shape, T::DTYPE)?.as_mut_slice()
    }

    pub fn buffer(&self, key: &str) -> Option<&SharedBuffer> {
        self.buffers.get(key)
    }

    pub fn buffer_mut(&mut self, key: &str) -> Option<&mut SharedBuffer> {
        self.buffers.get_mut(key)
    }

    pub fn buffers(&self) -> &BufferRegistry {
        &self.buffers
    }

    /// Write a command into an already allocated buffer
    ///
    /// A key that was never allocated is a [`HolodeckError::View`] error;
    /// nothing is created.
    pub fn act<T: Element>(&mut self, key: &str, values: &[T]) -> HolodeckResult<()> {
        self.ensure_live("act")?;
        self.buffers
            .get_mut(key)
            .ok_or_else(|| HolodeckError::view(key, "not allocated in this session"))?
            .write(values)
    }

    /// Hand the turn to the engine
    pub fn release(&mut self) -> HolodeckResult<()> {
        self.expect_state("release", TurnState::ClientTurn)?;
        self.server.release()?;
        self.state = TurnState::WaitingForPeer;
        log::debug!("Session '{}': released turn", self.config.session_id);
        Ok(())
    }

    /// Wait for the engine to hand the turn back
    ///
    /// On timeout the client stays in `WaitingForPeer` and the call may be
    /// retried; whether to retry or rebuild the session is up to the caller.
    pub fn acquire(&mut self) -> HolodeckResult<()> {
        self.expect_state("acquire", TurnState::WaitingForPeer)?;
        self.client.acquire(self.config.timeout_policy().as_duration())?;
        self.state = TurnState::ClientTurn;
        log::debug!("Session '{}': acquired turn", self.config.session_id);
        Ok(())
    }

    /// One lockstep step: `release` then `acquire`
    pub fn tick(&mut self) -> HolodeckResult<()> {
        self.release()?;
        self.acquire()
    }

    /// Unlink every buffer, then both semaphores
    ///
    /// Best effort: failures are logged and skipped. Calling it again does
    /// nothing.
    pub fn teardown(&mut self) {
        if self.state == TurnState::TornDown {
            return;
        }
        self.state = TurnState::TornDown;

        let mut failures = self.buffers.unlink_all();
        for sem in [&mut self.server, &mut self.client] {
            if let Err(e) = sem.unlink() {
                log::warn!("Semaphore '{}': unlink failed: {}", sem.name(), e);
                failures += 1;
            }
        }

        log::info!(
            "Session '{}': torn down ({} cleanup failures)",
            self.config.session_id,
            failures
        );
    }

    fn ensure_live(&self, operation: &'static str) -> HolodeckResult<()> {
        if self.state == TurnState::TornDown {
            return Err(self.state_error(operation));
        }
        Ok(())
    }

    fn expect_state(&self, operation: &'static str, expected: TurnState) -> HolodeckResult<()> {
        if self.state != expected {
            return Err(self.state_error(operation));
        }
        Ok(())
    }

    fn state_error(&self, operation: &'static str) -> HolodeckError {
        HolodeckError::State {
            operation,
            state: self.state.to_string(),
        }
    }
}

impl fmt::Debug for HolodeckClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HolodeckClient")
            .field("session_id", &self.config.session_id)
            .field("backend", &self.backend.name())
            .field("state", &self.state)
            .field("buffers", &self.buffers.len())
            .finish_non_exhaustive()
    }
}

impl Drop for HolodeckClient {
    fn drop(&mut self) {
        self.teardown();
    }
}

//! Engine side of a session
//!
//! The simulation engine creates the two handshake semaphores before the
//! client attaches, then loops: wait for the client's turn hand-off, step,
//! signal back. [`PeerSession`] does the same for tests and local tooling.

use crate::error::HolodeckResult;
use crate::memory::platform::{CLIENT_SEMAPHORE, SERVER_SEMAPHORE};
use crate::memory::{DType, SharedBuffer};
use crate::sync::{default_backend, NamedSemaphore, SemaphoreBackend};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct PeerSession {
    session_id: String,
    backend: Arc<dyn SemaphoreBackend>,
    /// Posted by the client when the engine may step
    server: Box<dyn NamedSemaphore>,
    /// Posted by us when the client may proceed
    client: Box<dyn NamedSemaphore>,
    buffers: HashMap<String, SharedBuffer>,
    closed: bool,
}

impl PeerSession {
    /// Create the session's semaphores with the host platform backend
    pub fn create(session_id: &str) -> HolodeckResult<Self> {
        Self::create_with_backend(session_id, default_backend()?)
    }

    /// Create both semaphores with a count of zero
    ///
    /// Fails if either name is already taken, e.g. by a session that was
    /// never torn down.
    pub fn create_with_backend(
        session_id: &str,
        backend: Arc<dyn SemaphoreBackend>,
    ) -> HolodeckResult<Self> {
        let mut server = backend.create(SERVER_SEMAPHORE, session_id, 0)?;
        let client = match backend.create(CLIENT_SEMAPHORE, session_id, 0) {
            Ok(client) => client,
            Err(e) => {
                if let Err(unlink_err) = server.unlink() {
                    log::warn!(
                        "Semaphore '{}': rollback unlink failed: {}",
                        server.name(),
                        unlink_err
                    );
                }
                return Err(e);
            }
        };

        log::info!("Peer '{}': created handshake semaphores", session_id);

        Ok(Self {
            session_id: session_id.to_string(),
            backend,
            server,
            client,
            buffers: HashMap::new(),
            closed: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn backend(&self) -> &dyn SemaphoreBackend {
        self.backend.as_ref()
    }

    /// Map the client's buffer `key`, replacing any earlier mapping of it
    ///
    /// Attach again after the client reallocates a key: the old mapping
    /// still points at the unlinked region.
    pub fn attach(
        &mut self,
        key: &str,
        shape: &[usize],
        dtype: DType,
    ) -> HolodeckResult<&mut SharedBuffer> {
        let buffer = SharedBuffer::attach(&self.session_id, key, shape, dtype)?;
        match self.buffers.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(buffer);
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => Ok(entry.insert(buffer)),
        }
    }

    pub fn buffer(&self, key: &str) -> Option<&SharedBuffer> {
        self.buffers.get(key)
    }

    pub fn buffer_mut(&mut self, key: &str) -> Option<&mut SharedBuffer> {
        self.buffers.get_mut(key)
    }

    /// Block until the client releases the turn
    pub fn wait_for_client(&self, timeout: Option<Duration>) -> HolodeckResult<()> {
        self.server.acquire(timeout)
    }

    /// Hand the turn back to the client
    pub fn signal_client(&self) -> HolodeckResult<()> {
        self.client.release()
    }

    /// Wait for the client, run `step`, then signal the client
    ///
    /// The client is not signaled if `step` fails.
    pub fn serve<F>(&mut self, timeout: Option<Duration>, step: F) -> HolodeckResult<()>
    where
        F: FnOnce(&mut Self) -> HolodeckResult<()>,
    {
        self.wait_for_client(timeout)?;
        step(self)?;
        self.signal_client()
    }

    /// Unmap buffers and unlink both semaphores, best effort
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.buffers.clear();

        for sem in [&mut self.server, &mut self.client] {
            if let Err(e) = sem.unlink() {
                log::debug!("Semaphore '{}': unlink skipped: {}", sem.name(), e);
            }
        }
        log::info!("Peer '{}': closed", self.session_id);
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("session_id", &self.session_id)
            .field("backend", &self.backend.name())
            .field("buffers", &self.buffers.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        self.close();
    }
}

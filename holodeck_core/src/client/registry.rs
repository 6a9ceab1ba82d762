use crate::error::HolodeckResult;
use crate::memory::{DType, SharedBuffer};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Shared buffers of one session, one live buffer per key
///
/// Owned by a single client, so independent sessions in one process never
/// see each other's buffers.
#[derive(Debug)]
pub struct BufferRegistry {
    session_id: String,
    buffers: HashMap<String, SharedBuffer>,
}

impl BufferRegistry {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            buffers: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Return the buffer for `key`, creating or replacing it as needed
    ///
    /// Same shape and dtype returns the existing buffer untouched. A different
    /// shape or dtype unlinks and unmaps the old region before the new one is
    /// created, so nothing may hold on to the old view.
    pub fn allocate(
        &mut self,
        key: &str,
        shape: &[usize],
        dtype: DType,
    ) -> HolodeckResult<&mut SharedBuffer> {
        let stale = self
            .buffers
            .get(key)
            .is_some_and(|existing| !existing.matches(shape, dtype));

        if stale {
            if let Some(mut old) = self.buffers.remove(key) {
                log::info!(
                    "Shared buffer '{}': reallocating {} {:?} -> {} {:?}",
                    old.name(),
                    old.dtype(),
                    old.shape(),
                    dtype,
                    shape
                );
                if let Err(e) = old.unlink() {
                    log::warn!("Shared buffer '{}': unlink failed: {}", old.name(), e);
                }
            }
        }

        match self.buffers.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let buffer = SharedBuffer::create(&self.session_id, key, shape, dtype)?;
                Ok(entry.insert(buffer))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&SharedBuffer> {
        self.buffers.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut SharedBuffer> {
        self.buffers.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Unlink and unmap every buffer, continuing past failures
    ///
    /// Returns the number of buffers whose unlink failed.
    pub fn unlink_all(&mut self) -> usize {
        let mut failures = 0;
        for (_, mut buffer) in self.buffers.drain() {
            if let Err(e) = buffer.unlink() {
                log::warn!("Shared buffer '{}': unlink failed: {}", buffer.name(), e);
                failures += 1;
            }
        }
        failures
    }
}

//! # HOLODECK Core
//!
//! Lockstep exchange between a control process and a simulation engine
//! running on the same machine.
//!
//! - **Memory**: named OS shared memory exposed as shaped, typed buffers
//! - **Sync**: named cross-process semaphores behind one backend trait
//! - **Client**: the session coordinator that owns buffers and drives the
//!   two-semaphore turn-taking handshake
//! - **Peer**: the engine side of the handshake, for tests and tooling
//!
//! ## Quick Start
//!
//! ```no_run
//! use holodeck_core::{ClientConfig, DType, HolodeckClient};
//!
//! let mut client = HolodeckClient::new(ClientConfig::new("abc"))?;
//! client.allocate("cmd", &[4], DType::F32)?.write(&[0.0f32, 0.0, 2.0, 1000.0])?;
//! client.release()?;
//! client.acquire()?;
//! # Ok::<(), holodeck_core::HolodeckError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod peer;
pub mod sync;

// Re-export commonly used types for easy access
pub use client::{BufferRegistry, HolodeckClient, TurnState};
pub use config::{ClientConfig, InitialTurn, TimeoutPolicy};
pub use error::{HolodeckError, HolodeckResult};
pub use memory::{DType, Element, PlatformFamily, SharedBuffer};
pub use peer::PeerSession;
pub use sync::{default_backend, NamedSemaphore, SemaphoreBackend};

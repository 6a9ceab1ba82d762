//! # Shared memory for HOLODECK sessions
//!
//! - **ShmRegion**: a named OS shared memory region mapped into this process
//! - **SharedBuffer**: a shaped, typed, row-major view over one region
//! - **platform**: OS object naming and platform family detection
//!
//! Buffers are exchanged with the engine without serialization: both sides
//! map the same pages and agree on shape and element type by convention.

pub mod dtype;
pub mod platform;
pub mod shared_buffer;
pub mod shm_region;

pub use dtype::{DType, Element};
pub use platform::*;
pub use shared_buffer::SharedBuffer;
pub use shm_region::ShmRegion;

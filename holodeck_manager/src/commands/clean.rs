use anyhow::{anyhow, Result};
use colored::*;
use holodeck_core::memory::platform::{
    check_component, memory_name, CLIENT_SEMAPHORE, SERVER_SEMAPHORE,
};
use holodeck_core::memory::ShmRegion;
use holodeck_core::default_backend;
use std::io;

/// Remove named objects a crashed client or engine left behind
///
/// Missing objects are not an error. Returns the number of objects removed.
pub fn run_clean(session: &str, buffers: &[String]) -> Result<usize> {
    check_component("session id", session).map_err(|e| anyhow!(e))?;
    for key in buffers {
        check_component("key", key).map_err(|e| anyhow!(e))?;
    }

    let backend = default_backend()?;
    let mut removed = 0;

    for base in [SERVER_SEMAPHORE, CLIENT_SEMAPHORE] {
        let name = backend.family().semaphore_name(base, session);
        match backend.remove(base, session) {
            Ok(()) => {
                println!("  {} removed semaphore {}", "✓".green(), name);
                removed += 1;
            }
            Err(holodeck_core::HolodeckError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                println!("  {} no semaphore {}", "-".dimmed(), name);
            }
            Err(e) => println!("  {} {}: {}", "✗".red(), name, e),
        }
    }

    for key in buffers {
        let name = memory_name(session, key);
        match ShmRegion::unlink_name(&name) {
            Ok(()) => {
                println!("  {} removed buffer {}", "✓".green(), name);
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                println!("  {} no buffer {}", "-".dimmed(), name);
            }
            Err(e) => println!("  {} {}: {}", "✗".red(), name, e),
        }
    }

    tracing::info!(session, removed, "cleaned session objects");
    Ok(removed)
}

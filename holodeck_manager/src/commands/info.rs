use anyhow::{anyhow, Result};
use colored::*;
use holodeck_core::memory::platform::{
    check_component, memory_name, platform_name, PlatformFamily, CLIENT_SEMAPHORE,
    SERVER_SEMAPHORE,
};
use holodeck_core::default_backend;
use serde_json::json;

/// Print the platform backend and the OS object names of a session
pub fn run_info(session: &str, buffers: &[String], json: bool) -> Result<()> {
    check_names(session, buffers)?;
    let family = PlatformFamily::current()?;
    let backend = default_backend()?;

    if json {
        let report = session_report(session, buffers, family, backend.supports_timeout());
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "HOLODECK platform".bold());
    println!("  {:<18} {}", "Platform:", platform_name());
    println!("  {:<18} {}", "Family:", family);
    println!("  {:<18} {}", "Semaphores:", backend.name());
    let timeout = if backend.supports_timeout() {
        "supported".green()
    } else {
        "not supported (waits are unbounded)".yellow()
    };
    println!("  {:<18} {}", "Bounded waits:", timeout);

    println!();
    println!("{} '{}'", "Session".bold(), session);
    println!(
        "  {:<18} {}",
        "Engine turn:",
        family.semaphore_name(SERVER_SEMAPHORE, session)
    );
    println!(
        "  {:<18} {}",
        "Client turn:",
        family.semaphore_name(CLIENT_SEMAPHORE, session)
    );
    for key in buffers {
        println!("  {:<18} {}", format!("Buffer {}:", key), memory_name(session, key));
    }

    Ok(())
}

/// Names that no client could create are reported instead of printed
fn check_names(session: &str, buffers: &[String]) -> Result<()> {
    check_component("session id", session).map_err(|e| anyhow!(e))?;
    for key in buffers {
        check_component("key", key).map_err(|e| anyhow!(e))?;
    }
    Ok(())
}

fn session_report(
    session: &str,
    buffers: &[String],
    family: PlatformFamily,
    supports_timeout: bool,
) -> serde_json::Value {
    let buffers: serde_json::Map<String, serde_json::Value> = buffers
        .iter()
        .map(|key| (key.clone(), json!(memory_name(session, key))))
        .collect();

    json!({
        "platform": platform_name(),
        "family": family.as_str(),
        "supports_timeout": supports_timeout,
        "session": session,
        "semaphores": {
            "server": family.semaphore_name(SERVER_SEMAPHORE, session),
            "client": family.semaphore_name(CLIENT_SEMAPHORE, session),
        },
        "buffers": buffers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_report() {
        let report = session_report(
            "abc",
            &["cmd".to_string(), "cam_rgb".to_string()],
            PlatformFamily::Posix,
            true,
        );
        assert_eq!(report["family"], "posix");
        assert_eq!(report["semaphores"]["server"], "/HOLODECK_SEMAPHORE_SERVERabc");
        assert_eq!(report["semaphores"]["client"], "/HOLODECK_SEMAPHORE_CLIENTabc");
        assert_eq!(report["buffers"]["cmd"], "/HOLODECK_MEMabc_cmd");
        assert_eq!(report["buffers"]["cam_rgb"], "/HOLODECK_MEMabc_cam_rgb");
    }

    #[test]
    fn test_reserved_names_are_refused() {
        assert!(check_names("abc", &["cmd".to_string()]).is_ok());
        assert!(check_names("abc", &["cam/rgb".to_string()]).is_err());
        assert!(check_names("a:b", &[]).is_err());
    }
}

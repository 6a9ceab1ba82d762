use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use holodeck_core::ClientConfig;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use holodeck_manager::commands::{self, EchoRule, PeerOptions};

#[derive(Parser)]
#[command(name = "holodeck")]
#[command(about = "HOLODECK - shared memory sessions between agents and a simulation engine")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the platform backend and the object names of a session
    Info {
        /// Session id (defaults to $HOLODECK_UUID, then a fresh one)
        #[arg(short = 's', long = "session")]
        session: Option<String>,

        /// Buffer keys to print names for
        #[arg(short = 'b', long = "buffer", value_name = "KEY")]
        buffers: Vec<String>,

        /// Output as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Act as the engine side of a session for local testing
    Peer {
        /// Session id (defaults to $HOLODECK_UUID, then a fresh one)
        #[arg(short = 's', long = "session")]
        session: Option<String>,

        /// Stop after this many steps
        #[arg(short = 'n', long = "steps")]
        steps: Option<u64>,

        /// Give up if the client does not release within this many milliseconds
        #[arg(short = 't', long = "timeout-ms")]
        timeout_ms: Option<u64>,

        /// Copy buffer SRC into DST every step, e.g. cmd=state:4:f32
        #[arg(short = 'e', long = "echo", value_name = "SRC=DST:SHAPE:DTYPE")]
        echoes: Vec<EchoRule>,
    },

    /// Remove semaphores and buffers a crashed session left behind
    Clean {
        /// Session id
        #[arg(short = 's', long = "session")]
        session: String,

        /// Buffer keys to unlink
        #[arg(short = 'b', long = "buffer", value_name = "KEY")]
        buffers: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "holodeck_core=info,holodeck_manager=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_command(cli.command) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Info {
            session,
            buffers,
            json,
        } => commands::run_info(&resolve_session(session)?, &buffers, json),
        Commands::Peer {
            session,
            steps,
            timeout_ms,
            echoes,
        } => {
            let opts = PeerOptions {
                session: resolve_session(session)?,
                steps,
                timeout: timeout_ms.map(Duration::from_millis),
                echoes,
            };
            commands::run_peer(&opts).map(|_| ())
        }
        Commands::Clean { session, buffers } => {
            let removed = commands::run_clean(&session, &buffers)?;
            println!("{} Removed {} objects", "✓".green(), removed);
            Ok(())
        }
    }
}

fn resolve_session(session: Option<String>) -> Result<String> {
    if let Some(session) = session {
        return Ok(session);
    }
    let from_env = ClientConfig::from_env()?.session_id;
    if from_env.is_empty() {
        Ok(ClientConfig::generate_session_id())
    } else {
        Ok(from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_peer_arguments() {
        let cli = Cli::try_parse_from([
            "holodeck", "peer", "-s", "abc", "-n", "3", "--echo", "cmd=state:4:f32",
        ])
        .unwrap();
        match cli.command {
            Commands::Peer {
                session,
                steps,
                timeout_ms,
                echoes,
            } => {
                assert_eq!(session.as_deref(), Some("abc"));
                assert_eq!(steps, Some(3));
                assert_eq!(timeout_ms, None);
                assert_eq!(echoes.len(), 1);
                assert_eq!(echoes[0].dst, "state");
            }
            _ => panic!("expected peer command"),
        }
    }

    #[test]
    fn test_clean_requires_session() {
        assert!(Cli::try_parse_from(["holodeck", "clean"]).is_err());
    }
}

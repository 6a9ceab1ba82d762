use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use holodeck_core::{DType, PeerSession};
use std::str::FromStr;
use std::time::Duration;

/// Copy one client buffer into another on every step
///
/// Parsed from `SRC=DST:SHAPE:DTYPE`, e.g. `cmd=state:2x3:f32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRule {
    pub src: String,
    pub dst: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl FromStr for EchoRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let (keys, shape, dtype) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(keys), Some(shape), Some(dtype), None) => (keys, shape, dtype),
            _ => bail!("expected SRC=DST:SHAPE:DTYPE, got '{}'", s),
        };

        let (src, dst) = keys
            .split_once('=')
            .filter(|(src, dst)| !src.is_empty() && !dst.is_empty())
            .ok_or_else(|| anyhow!("expected SRC=DST before the shape, got '{}'", keys))?;

        let shape = shape
            .split(['x', ','])
            .map(|dim| {
                dim.trim()
                    .parse::<usize>()
                    .with_context(|| format!("invalid dimension '{}' in '{}'", dim, s))
            })
            .collect::<Result<Vec<_>>>()?;

        let dtype = dtype.parse::<DType>().map_err(|e| anyhow!(e))?;

        Ok(Self {
            src: src.to_string(),
            dst: dst.to_string(),
            shape,
            dtype,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PeerOptions {
    pub session: String,
    /// Stop after this many steps; run until an error otherwise
    pub steps: Option<u64>,
    pub timeout: Option<Duration>,
    pub echoes: Vec<EchoRule>,
}

/// Stand in for the simulation engine of a session
///
/// Creates the handshake semaphores, then answers every client release by
/// applying the echo rules and handing the turn back. Returns the number of
/// steps served.
pub fn run_peer(opts: &PeerOptions) -> Result<u64> {
    let mut peer = PeerSession::create(&opts.session)
        .with_context(|| format!("failed to start peer for session '{}'", opts.session))?;

    println!(
        "{} Peer ready for session {} ({} semaphores)",
        "✓".green(),
        opts.session.cyan(),
        peer.backend().name()
    );
    println!(
        "  {} HOLODECK_UUID={} <client>",
        "Run:".dimmed(),
        opts.session
    );

    let mut served = 0u64;
    while opts.steps.map_or(true, |steps| served < steps) {
        peer.serve(opts.timeout, |peer| {
            for echo in &opts.echoes {
                let bytes = peer
                    .attach(&echo.src, &echo.shape, echo.dtype)?
                    .as_bytes()
                    .to_vec();
                peer.attach(&echo.dst, &echo.shape, echo.dtype)?
                    .as_bytes_mut()
                    .copy_from_slice(&bytes);
            }
            Ok(())
        })
        .with_context(|| format!("step {} failed", served + 1))?;

        served += 1;
        tracing::debug!(session = %opts.session, step = served, "served step");
    }

    println!("{} Served {} steps", "✓".green(), served);
    Ok(served)
}

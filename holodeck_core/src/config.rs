//! Configuration for a HOLODECK client session
//!
//! Loaded from TOML/YAML files, overridden from the environment, or built in
//! code. Precedence: builder calls > environment variables > config file >
//! defaults.

use crate::error::{HolodeckError, HolodeckResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Session id variable; the engine receives the same value on its command line
pub const ENV_SESSION_ID: &str = "HOLODECK_UUID";
/// Bounded wait in milliseconds; `0` or `none` means unbounded
pub const ENV_TIMEOUT_MS: &str = "HOLODECK_TIMEOUT_MS";
/// `client` or `peer`
pub const ENV_INITIAL_TURN: &str = "HOLODECK_INITIAL_TURN";

/// Bound used when a client opts into timeouts without giving one
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// How long `acquire` may wait for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Block until the engine signals, however long that takes
    #[default]
    Unbounded,
    /// Fail with a timeout error after this long (hung or crashed engine)
    Bounded(Duration),
}

impl TimeoutPolicy {
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            TimeoutPolicy::Unbounded => None,
            TimeoutPolicy::Bounded(timeout) => Some(timeout),
        }
    }
}

/// Which side holds the turn when the session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialTurn {
    /// The client may write buffers and must `release` first
    #[default]
    Client,
    /// The engine starts; the client's first call is `acquire`
    Peer,
}

impl std::str::FromStr for InitialTurn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client" => Ok(InitialTurn::Client),
            "peer" | "engine" | "server" => Ok(InitialTurn::Peer),
            _ => Err(format!("Unknown initial turn: {}. Expected client or peer", s)),
        }
    }
}

/// HOLODECK client configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Namespaces every OS object name of the session
    #[serde(default)]
    pub session_id: String,

    /// Bounded wait for the engine in milliseconds; absent or `0` is
    /// unbounded, the same as `HOLODECK_TIMEOUT_MS=0`
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub initial_turn: InitialTurn,
}

impl ClientConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Fresh random session id, for starting an engine with a unique namespace
    pub fn generate_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Defaults overridden by `HOLODECK_*` environment variables
    pub fn from_env() -> HolodeckResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load config from a file (auto-detect format)
    pub fn from_file<P: AsRef<Path>>(path: P) -> HolodeckResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HolodeckError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            _ => Self::from_toml(&contents).or_else(|_| Self::from_yaml(&contents)),
        }
    }

    pub fn from_toml(contents: &str) -> HolodeckResult<Self> {
        toml::from_str(contents)
            .map_err(|e| HolodeckError::config(format!("Failed to parse TOML: {}", e)))
    }

    pub fn from_yaml(contents: &str) -> HolodeckResult<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| HolodeckError::config(format!("Failed to parse YAML: {}", e)))
    }

    /// Override fields from the process environment
    pub fn apply_env(&mut self) -> HolodeckResult<()> {
        self.apply_vars(
            [ENV_SESSION_ID, ENV_TIMEOUT_MS, ENV_INITIAL_TURN]
                .into_iter()
                .filter_map(|key| std::env::var(key).ok().map(|value| (key, value))),
        )
    }

    /// Override fields from `(variable, value)` pairs
    pub fn apply_vars<K, V>(&mut self, vars: impl IntoIterator<Item = (K, V)>) -> HolodeckResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                ENV_SESSION_ID => self.session_id = value.to_string(),
                ENV_TIMEOUT_MS => {
                    self.timeout_ms = match value.to_lowercase().as_str() {
                        "" | "0" | "none" | "infinite" => None,
                        millis => Some(millis.parse().map_err(|_| {
                            HolodeckError::config(format!(
                                "{} must be milliseconds, got '{}'",
                                ENV_TIMEOUT_MS, value
                            ))
                        })?),
                    }
                }
                ENV_INITIAL_TURN => {
                    self.initial_turn = value.parse().map_err(HolodeckError::Config)?
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Set the wait policy; bounds are rounded up to whole milliseconds
    ///
    /// A bound shorter than a millisecond, zero included, becomes 1 ms so it
    /// stays bounded.
    pub fn with_timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_ms = policy.as_duration().map(|timeout| {
            let millis = timeout.as_nanos().div_ceil(1_000_000);
            millis.clamp(1, u64::MAX as u128) as u64
        });
        self
    }

    /// Bound waits by [`DEFAULT_ENGINE_TIMEOUT`]
    pub fn with_engine_timeout(self) -> Self {
        self.with_timeout(TimeoutPolicy::Bounded(DEFAULT_ENGINE_TIMEOUT))
    }

    pub fn with_initial_turn(mut self, turn: InitialTurn) -> Self {
        self.initial_turn = turn;
        self
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        match self.timeout_ms {
            None | Some(0) => TimeoutPolicy::Unbounded,
            Some(millis) => TimeoutPolicy::Bounded(Duration::from_millis(millis)),
        }
    }
}

use super::session::ReadinessPolicy;
use crate::core::RepoError;
use log::warn;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting the client mode (`test` or `production`).
pub const MODE_ENV: &str = "ENTITYKIT_MODE";
/// Environment variable overriding the readiness poll attempt count.
pub const SESSION_ATTEMPTS_ENV: &str = "ENTITYKIT_SESSION_ATTEMPTS";
/// Environment variable overriding the readiness poll delay in milliseconds.
pub const SESSION_DELAY_ENV: &str = "ENTITYKIT_SESSION_DELAY_MS";

/// Which backend handle a client resolves to, and whether session
/// orchestration applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientMode {
    #[default]
    Production,
    /// Isolated test double; mutating calls wait for session readiness first.
    Test,
}

impl ClientMode {
    /// Decides the mode from the process environment.
    pub fn detect() -> Self {
        Self::from_env_value(std::env::var(MODE_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!("ignoring {MODE_ENV}={raw:?}: {err}");
                Self::Production
            }),
            None => Self::Production,
        }
    }

    pub fn is_test(self) -> bool {
        matches!(self, Self::Test)
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl FromStr for ClientMode {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" | "" => Ok(Self::Production),
            "test" | "testing" => Ok(Self::Test),
            other => Err(RepoError::Validation(format!("unknown client mode '{other}'"))),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub mode: ClientMode,

    /// Readiness budget before each mutating call in test mode
    pub readiness: ReadinessPolicy,

    /// Readiness budget for the one wait after an authorization race
    pub retry_readiness: ReadinessPolicy,

    /// Maximum number of entity types kept in the selection-tag cache
    pub selection_cache_capacity: usize,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            mode: ClientMode::Production,
            readiness: ReadinessPolicy::default(),
            retry_readiness: ReadinessPolicy::retry_default(),
            selection_cache_capacity: 64,
        }
    }

    /// Builds a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new().mode(ClientMode::from_env_value(lookup(MODE_ENV).as_deref()));

        if let Some(raw) = lookup(SESSION_ATTEMPTS_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(attempts) => {
                    config.readiness = ReadinessPolicy::new(attempts, config.readiness.delay)
                }
                Err(err) => warn!("ignoring {SESSION_ATTEMPTS_ENV}={raw:?}: {err}"),
            }
        }

        if let Some(raw) = lookup(SESSION_DELAY_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => {
                    config.readiness =
                        ReadinessPolicy::new(config.readiness.max_attempts, Duration::from_millis(ms))
                }
                Err(err) => warn!("ignoring {SESSION_DELAY_ENV}={raw:?}: {err}"),
            }
        }

        config
    }

    /// Set the client mode
    pub fn mode(mut self, mode: ClientMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the pre-mutation readiness budget
    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Set the post-race readiness budget
    pub fn retry_readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.retry_readiness = policy;
        self
    }

    /// Set the selection cache capacity
    pub fn selection_cache_capacity(mut self, capacity: usize) -> Self {
        self.selection_cache_capacity = capacity.max(1);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! Ledger configuration

use std::{env, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

pub const DEFAULT_MATURATION_WINDOW_MS: u64 = 5_000;

pub const ENV_MATURATION_MS: &str = "BURN_LEDGER_MATURATION_MS";
pub const ENV_LOOKUP: &str = "BURN_LEDGER_LOOKUP";
pub const ENV_REGISTRATION: &str = "BURN_LEDGER_REGISTRATION";

/// What a reward read returns for an account with no burn history.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LookupPolicy {
    /// Unknown accounts have zero rewards.
    #[default]
    Lenient,
    /// Unknown accounts are an error.
    Strict,
}

/// Whether accounts must be registered before they may burn.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    #[default]
    Open,
    PreRegistered,
}

impl FromStr for LookupPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::InvalidValue {
                key: ENV_LOOKUP,
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for RegistrationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "open" => Ok(Self::Open),
            "pre_registered" => Ok(Self::PreRegistered),
            other => Err(ConfigError::InvalidValue {
                key: ENV_REGISTRATION,
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Delay after a burn before it counts towards rewards.
    pub maturation_window_ms: u64,
    pub lookup: LookupPolicy,
    pub registration: RegistrationPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            maturation_window_ms: DEFAULT_MATURATION_WINDOW_MS,
            lookup: LookupPolicy::default(),
            registration: RegistrationPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Applies `BURN_LEDGER_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MATURATION_MS) {
            self.maturation_window_ms =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_MATURATION_MS,
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup(ENV_LOOKUP) {
            self.lookup = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_REGISTRATION) {
            self.registration = raw.parse()?;
        }
        Ok(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

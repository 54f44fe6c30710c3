//! Runtime configuration.
//!
//! Read from the environment (and a `.env` file, if present):
//!
//! | Variable                    | Default  | Meaning                               |
//! |-----------------------------|----------|---------------------------------------|
//! | `LEADGEN_PORT`              | `3000`   | HTTP port for `leadgen serve`         |
//! | `LEADGEN_BATCH_SIZE`        | `30`     | Leads per batch                       |
//! | `LEADGEN_SECONDS_PER_BATCH` | `2`      | Seconds between batches (max 3600)    |
//! | `LEADGEN_HISTORY_DIR`       | *(none)* | Persist search history here           |
//! | `LEADGEN_EXPORT_PREFIX`     | `leads`  | Filename prefix for CSV exports       |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::export::DEFAULT_PREFIX;
use crate::generator::{
    GeneratorSettings, DEFAULT_BATCH_SIZE, DEFAULT_SECONDS_PER_BATCH, MAX_SECONDS_PER_BATCH,
};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub generator: GeneratorSettings,
    /// `None` keeps history in memory only.
    pub history_dir: Option<PathBuf>,
    pub export_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            generator: GeneratorSettings::default(),
            history_dir: None,
            export_prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let batch_size = parse_or(&lookup, "LEADGEN_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "LEADGEN_BATCH_SIZE".into(),
                value: "0".into(),
            });
        }

        let seconds_per_batch =
            parse_or(&lookup, "LEADGEN_SECONDS_PER_BATCH", DEFAULT_SECONDS_PER_BATCH)?;
        if seconds_per_batch > MAX_SECONDS_PER_BATCH {
            return Err(ConfigError::Invalid {
                key: "LEADGEN_SECONDS_PER_BATCH".into(),
                value: seconds_per_batch.to_string(),
            });
        }

        Ok(Self {
            port: parse_or(&lookup, "LEADGEN_PORT", DEFAULT_PORT)?,
            generator: GeneratorSettings {
                batch_size,
                seconds_per_batch,
            },
            history_dir: non_empty(&lookup, "LEADGEN_HISTORY_DIR").map(PathBuf::from),
            export_prefix: non_empty(&lookup, "LEADGEN_EXPORT_PREFIX")
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
    }
}

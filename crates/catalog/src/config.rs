use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Repository settings.
///
/// | Variable                 | Default                  |
/// |--------------------------|--------------------------|
/// | `CACHE_TTL_SECONDS`      | 300                      |
/// | `CACHE_MAX_ENTRIES`      | 10 000                   |
/// | `TREE_CACHE_TTL_SECONDS` | 3 600                    |
/// | `SQLITE_PATH`            | `catalog.db`             |
/// | `REDIS_URL`              | `redis://localhost:6379` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL for entity and query entries.
    pub cache_ttl_seconds: u64,
    /// Capacity of the in-memory LRU cache.
    pub cache_max_entries: usize,
    /// TTL for rendered category trees.
    pub tree_cache_ttl_seconds: u64,
    /// Only read with the `sqlite` feature.
    pub sqlite_path: String,
    /// Only read with the `redis` feature.
    pub redis_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 300,
            cache_max_entries: 10_000,
            tree_cache_ttl_seconds: 3_600,
            sqlite_path: "catalog.db".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

impl Config {
    /// Reads the process environment over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads settings through `lookup`; unset names keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            cache_ttl_seconds: positive(&lookup, "CACHE_TTL_SECONDS", defaults.cache_ttl_seconds)?,
            cache_max_entries: positive(&lookup, "CACHE_MAX_ENTRIES", defaults.cache_max_entries)?,
            tree_cache_ttl_seconds: positive(
                &lookup,
                "TREE_CACHE_TTL_SECONDS",
                defaults.tree_cache_ttl_seconds,
            )?,
            sqlite_path: lookup("SQLITE_PATH").unwrap_or(defaults.sqlite_path),
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn tree_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tree_cache_ttl_seconds)
    }
}

fn positive<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw,
            expected: "a positive integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.tree_cache_ttl(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("CACHE_TTL_SECONDS", "60"),
            ("CACHE_MAX_ENTRIES", " 500 "),
            ("SQLITE_PATH", "/tmp/shop.db"),
        ]))
        .unwrap();

        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache_max_entries, 500);
        assert_eq!(config.tree_cache_ttl_seconds, 3_600);
        assert_eq!(config.sqlite_path, "/tmp/shop.db");
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let err = Config::from_lookup(lookup(&[("CACHE_TTL_SECONDS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "CACHE_TTL_SECONDS",
                value: "soon".to_string(),
                expected: "a positive integer",
            }
        );

        assert!(Config::from_lookup(lookup(&[("CACHE_MAX_ENTRIES", "0")])).is_err());
    }
}

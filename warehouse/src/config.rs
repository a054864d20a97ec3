//! Runtime configuration.
//!
//! Built once at startup from the environment and passed by reference to
//! whatever needs it. The binary loads `.env` before reading it.
//!
//! | Variable                    | Default              |
//! |-----------------------------|----------------------|
//! | `CARSALES_SOURCE_DIR`       | `data/source`        |
//! | `CARSALES_STAGING_DIR`      | `data/staging`       |
//! | `CARSALES_WAREHOUSE_DIR`    | `data/warehouse`     |
//! | `FILE_PATH`                 | `.`                  |
//! | `CARSALES_LOG_PATH`         | `logs/etl_log.jsonl` |
//! | `CARSALES_PLAN`             | built-in plan        |
//! | `CARSALES_JOIN_CARDINALITY` | `enforce`            |
//! | `CARSALES_ON_ERROR`         | `continue`           |

use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};
use crate::transform::{JoinCardinality, OnError, WarehousePlan};

pub const ENV_SOURCE_DIR: &str = "CARSALES_SOURCE_DIR";
pub const ENV_STAGING_DIR: &str = "CARSALES_STAGING_DIR";
pub const ENV_WAREHOUSE_DIR: &str = "CARSALES_WAREHOUSE_DIR";
pub const ENV_PROFILE_DIR: &str = "FILE_PATH";
pub const ENV_LOG_PATH: &str = "CARSALES_LOG_PATH";
pub const ENV_PLAN: &str = "CARSALES_PLAN";
pub const ENV_JOIN_CARDINALITY: &str = "CARSALES_JOIN_CARDINALITY";
pub const ENV_ON_ERROR: &str = "CARSALES_ON_ERROR";

/// Everything a pipeline run needs to locate its stores and pick its policies.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Raw source tables, copied by the staging run
    pub source_dir: PathBuf,
    /// Staged tables, read by the warehouse run
    pub staging_dir: PathBuf,
    /// Warehouse append target
    pub warehouse_dir: PathBuf,
    /// Base path for profiling artifacts
    pub profile_dir: PathBuf,
    /// Outcome log file
    pub log_path: PathBuf,
    /// Plan file replacing the built-in warehouse plan
    pub plan_path: Option<PathBuf>,
    pub join_cardinality: JoinCardinality,
    pub on_error: OnError,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/source"),
            staging_dir: PathBuf::from("data/staging"),
            warehouse_dir: PathBuf::from("data/warehouse"),
            profile_dir: PathBuf::from("."),
            log_path: PathBuf::from("logs/etl_log.jsonl"),
            plan_path: None,
            join_cardinality: JoinCardinality::default(),
            on_error: OnError::default(),
        }
    }
}

impl Config {
    /// Read the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        let join_cardinality = match lookup(ENV_JOIN_CARDINALITY) {
            Some(raw) => raw.parse().map_err(|expected| ConfigError::InvalidValue {
                var: ENV_JOIN_CARDINALITY.to_string(),
                value: raw.clone(),
                expected,
            })?,
            None => defaults.join_cardinality,
        };

        let on_error = match lookup(ENV_ON_ERROR) {
            Some(raw) => raw.parse().map_err(|expected| ConfigError::InvalidValue {
                var: ENV_ON_ERROR.to_string(),
                value: raw.clone(),
                expected,
            })?,
            None => defaults.on_error,
        };

        Ok(Self {
            source_dir: path(ENV_SOURCE_DIR, defaults.source_dir),
            staging_dir: path(ENV_STAGING_DIR, defaults.staging_dir),
            warehouse_dir: path(ENV_WAREHOUSE_DIR, defaults.warehouse_dir),
            profile_dir: path(ENV_PROFILE_DIR, defaults.profile_dir),
            log_path: path(ENV_LOG_PATH, defaults.log_path),
            plan_path: lookup(ENV_PLAN)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            join_cardinality,
            on_error,
        })
    }

    /// The plan to run: the configured plan file, or the built-in one.
    pub fn load_plan(&self) -> ConfigResult<WarehousePlan> {
        match &self.plan_path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                Ok(WarehousePlan::from_json(&content)?)
            }
            None => Ok(WarehousePlan::car_sales()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.join_cardinality, JoinCardinality::Enforce);
        assert_eq!(config.on_error, OnError::Continue);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_STAGING_DIR, "/srv/staging"),
            (ENV_PROFILE_DIR, "/srv/profiles"),
            (ENV_JOIN_CARDINALITY, "allow"),
            (ENV_ON_ERROR, "ABORT"),
        ]))
        .unwrap();

        assert_eq!(config.staging_dir, PathBuf::from("/srv/staging"));
        assert_eq!(config.profile_dir, PathBuf::from("/srv/profiles"));
        assert_eq!(config.join_cardinality, JoinCardinality::Allow);
        assert_eq!(config.on_error, OnError::Abort);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let result = Config::from_lookup(lookup_from(&[(ENV_ON_ERROR, "retry")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_plan_from_file() {
        let dir = tempdir().unwrap();
        let plan_path = dir.path().join("plan.json");
        fs::write(&plan_path, WarehousePlan::car_sales().to_json().unwrap()).unwrap();

        let config = Config {
            plan_path: Some(plan_path),
            ..Config::default()
        };
        assert_eq!(config.load_plan().unwrap(), WarehousePlan::car_sales());
    }

    #[test]
    fn test_load_plan_bad_json() {
        let dir = tempdir().unwrap();
        let plan_path = dir.path().join("plan.json");
        fs::write(&plan_path, "{ not json").unwrap();

        let config = Config {
            plan_path: Some(plan_path),
            ..Config::default()
        };
        assert!(matches!(config.load_plan(), Err(ConfigError::Json(_))));
    }
}

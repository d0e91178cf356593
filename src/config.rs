//! Configuration for the scoring service and the training job
//!
//! Loaded from environment variables (a `.env` file is honoured). Connection
//! strings and artifact paths are required; tunables fall back to defaults.

use std::env;
use std::path::PathBuf;

use crate::error::{Result, ScoreError};
use crate::trainer::TrainingParams;

/// Scoring service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub artifacts: ArtifactConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

/// Offline training job configuration
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub artifacts: ArtifactConfig,
    pub database: DatabaseConfig,
    pub params: TrainingParams,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Serialized forest (MODEL_PATH)
    pub model_path: PathBuf,
    /// Serialized scaler (SCALER_PATH)
    pub scaler_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// DATABASE_URL, `sqlite://<path>` or a bare path
    pub url: String,
    /// Max pooled connections
    pub pool_size: u32,
    /// Connection checkout and busy timeout (milliseconds)
    pub timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        PathBuf::from(strip_scheme(&self.url))
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// CACHE_URL, `memory://`, `sqlite://<path>` or a bare path
    pub url: String,
}

impl CacheConfig {
    pub fn is_memory(&self) -> bool {
        self.url == "memory://" || self.url == "memory"
    }

    pub fn sqlite_path(&self) -> PathBuf {
        PathBuf::from(strip_scheme(&self.url))
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound for one validated-scores batch (seconds)
    pub batch_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the human formatter
    pub json: bool,
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite://").unwrap_or(url)
}

/// Only `sqlite://<path>` or a bare path; any other scheme is a typo or an
/// unsupported backend and must not be opened as a file name.
fn check_sqlite_url(key: &str, url: &str) -> Result<()> {
    if url.contains("://") && !url.starts_with("sqlite://") {
        return Err(ScoreError::Configuration(format!(
            "{} has unsupported scheme: {}",
            key, url
        )));
    }
    if strip_scheme(url).trim().is_empty() {
        return Err(ScoreError::Configuration(format!("{} has no database path", key)));
    }
    Ok(())
}

impl Config {
    /// Load service configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            artifacts: artifact_config(&lookup)?,
            database: database_config(&lookup)?,
            cache: cache_config(&lookup)?,
            service: ServiceConfig {
                batch_timeout_secs: get_parsed(&lookup, "BATCH_TIMEOUT_SECS", 30)?,
            },
            logging: logging_config(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_database(&self.database)?;
        if self.service.batch_timeout_secs == 0 {
            return Err(invalid("BATCH_TIMEOUT_SECS must be > 0"));
        }
        if self.artifacts.model_path == self.artifacts.scaler_path {
            return Err(invalid("MODEL_PATH and SCALER_PATH must be different files"));
        }
        Ok(())
    }
}

impl TrainingConfig {
    /// Load training configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TrainingParams::default();
        let config = TrainingConfig {
            artifacts: artifact_config(&lookup)?,
            database: database_config(&lookup)?,
            params: TrainingParams {
                seed: get_parsed(&lookup, "TRAIN_SEED", defaults.seed)?,
                n_trees: get_parsed(&lookup, "TRAIN_TREES", defaults.n_trees)?,
                max_depth: get_parsed(&lookup, "TRAIN_MAX_DEPTH", defaults.max_depth)?,
                test_fraction: get_parsed(&lookup, "TRAIN_TEST_FRACTION", defaults.test_fraction)?,
            },
            logging: logging_config(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_database(&self.database)?;
        if self.params.n_trees == 0 {
            return Err(invalid("TRAIN_TREES must be > 0"));
        }
        if self.params.max_depth == 0 {
            return Err(invalid("TRAIN_MAX_DEPTH must be > 0"));
        }
        if !(self.params.test_fraction > 0.0 && self.params.test_fraction < 1.0) {
            return Err(invalid("TRAIN_TEST_FRACTION must be between 0.0 and 1.0 (exclusive)"));
        }
        if self.artifacts.model_path == self.artifacts.scaler_path {
            return Err(invalid("MODEL_PATH and SCALER_PATH must be different files"));
        }
        Ok(())
    }
}

fn validate_database(db: &DatabaseConfig) -> Result<()> {
    if db.pool_size == 0 {
        return Err(invalid("STORE_POOL_SIZE must be > 0"));
    }
    if db.timeout_ms == 0 {
        return Err(invalid("STORE_TIMEOUT_MS must be > 0"));
    }
    Ok(())
}

fn artifact_config<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<ArtifactConfig> {
    Ok(ArtifactConfig {
        model_path: PathBuf::from(get_required(lookup, "MODEL_PATH")?),
        scaler_path: PathBuf::from(get_required(lookup, "SCALER_PATH")?),
    })
}

fn database_config<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<DatabaseConfig> {
    let url = get_required(lookup, "DATABASE_URL")?;
    check_sqlite_url("DATABASE_URL", &url)?;
    Ok(DatabaseConfig {
        url,
        pool_size: get_parsed(lookup, "STORE_POOL_SIZE", 4)?,
        timeout_ms: get_parsed(lookup, "STORE_TIMEOUT_MS", 5000)?,
    })
}

fn cache_config<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<CacheConfig> {
    let config = CacheConfig {
        url: get_required(lookup, "CACHE_URL")?,
    };
    if !config.is_memory() {
        check_sqlite_url("CACHE_URL", &config.url)?;
    }
    Ok(config)
}

fn logging_config<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<LoggingConfig> {
    let json = match lookup("LOG_JSON").as_deref().map(str::trim) {
        None | Some("") | Some("0") | Some("false") => false,
        Some("1") | Some("true") => true,
        Some(other) => {
            return Err(ScoreError::Configuration(format!("Invalid LOG_JSON value: {}", other)))
        }
    };
    Ok(LoggingConfig { json })
}

// Helper functions for environment variable parsing

fn invalid(msg: &str) -> ScoreError {
    ScoreError::Configuration(msg.to_string())
}

fn get_required<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Result<String> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ScoreError::Configuration(format!("{} must be set", key))),
    }
}

fn get_parsed<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ScoreError::Configuration(format!("Invalid {} value: {}", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("MODEL_PATH", "models/trading_model.bin"),
            ("SCALER_PATH", "models/scaler.bin"),
            ("DATABASE_URL", "sqlite://data/trading.db"),
            ("CACHE_URL", "memory://"),
        ])
    }

    fn lookup<'a>(env: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| env.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_config_with_defaults() {
        let env = base_env();
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.database.pool_size, 4);
        assert_eq!(config.database.timeout_ms, 5000);
        assert_eq!(config.service.batch_timeout_secs, 30);
        assert_eq!(config.database.sqlite_path(), PathBuf::from("data/trading.db"));
        assert!(config.cache.is_memory());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_each_required_variable_is_fatal() {
        for key in ["MODEL_PATH", "SCALER_PATH", "DATABASE_URL", "CACHE_URL"] {
            let mut env = base_env();
            env.remove(key);
            match Config::from_lookup(lookup(&env)) {
                Err(ScoreError::Configuration(msg)) => assert!(msg.contains(key)),
                other => panic!("expected configuration error for {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_blank_required_variable_is_fatal() {
        let mut env = base_env();
        env.insert("CACHE_URL", "   ");
        assert!(Config::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn test_invalid_number_rejected() {
        let mut env = base_env();
        env.insert("STORE_TIMEOUT_MS", "soon");
        assert!(Config::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn test_same_artifact_paths_rejected() {
        let mut env = base_env();
        env.insert("SCALER_PATH", "models/trading_model.bin");
        assert!(Config::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn test_training_config_does_not_need_cache() {
        let mut env = base_env();
        env.remove("CACHE_URL");
        env.insert("TRAIN_TREES", "50");
        let config = TrainingConfig::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.params.n_trees, 50);
        assert_eq!(config.params.max_depth, 10);
        assert_eq!(config.params.seed, 42);
    }

    #[test]
    fn test_foreign_database_scheme_rejected() {
        for url in ["postgres:///tmp/typo/trading", "mysql://db/trading", "sqlite://"] {
            let mut env = base_env();
            env.insert("DATABASE_URL", url);
            match Config::from_lookup(lookup(&env)) {
                Err(ScoreError::Configuration(msg)) => assert!(msg.contains("DATABASE_URL"), "{}", msg),
                other => panic!("expected configuration error for {}, got {:?}", url, other),
            }
        }
    }

    #[test]
    fn test_bare_and_sqlite_paths_accepted() {
        let mut env = base_env();
        env.insert("DATABASE_URL", "data/trading.db");
        env.insert("CACHE_URL", "sqlite://data/verdicts.db");
        let config = Config::from_lookup(lookup(&env)).unwrap();
        assert_eq!(config.database.sqlite_path(), PathBuf::from("data/trading.db"));
        assert_eq!(config.cache.sqlite_path(), PathBuf::from("data/verdicts.db"));
    }

    #[test]
    fn test_foreign_cache_scheme_rejected() {
        let mut env = base_env();
        env.insert("CACHE_URL", "redis://localhost:6379");
        assert!(matches!(
            Config::from_lookup(lookup(&env)),
            Err(ScoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_training_fraction_bounds() {
        let mut env = base_env();
        env.insert("TRAIN_TEST_FRACTION", "1.0");
        assert!(TrainingConfig::from_lookup(lookup(&env)).is_err());
    }
}

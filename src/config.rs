use crate::store::UniquenessMode;
use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SOURCE_URL: &str = "https://kb.bullseyelocations.com/article/60-india-state-codes";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub source_url: String,
    pub database_path: PathBuf,
    /// Directory holding the staging and verified slot files
    pub data_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub uniqueness: UniquenessMode,
    pub bind_addr: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let database_path = match env::var("DATABASE_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => data_dir.join("states.db"),
        };

        let fetch_timeout = Duration::from_secs(
            env::var("FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("FETCH_TIMEOUT_SECS must be a whole number of seconds")?,
        );

        let strict_names = match env::var("STRICT_NAMES") {
            Ok(value) => parse_bool(&value).context("STRICT_NAMES must be true or false")?,
            Err(_) => false,
        };

        Ok(Self {
            source_url: env::var("SOURCE_URL").unwrap_or_else(|_| DEFAULT_SOURCE_URL.to_string()),
            database_path,
            data_dir,
            fetch_timeout,
            uniqueness: if strict_names {
                UniquenessMode::CodeAndName
            } else {
                UniquenessMode::Code
            },
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }

    /// Defaults with every file rooted in `dir`
    pub fn for_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            database_path: dir.join("states.db"),
            data_dir: dir.to_path_buf(),
            fetch_timeout: Duration::from_secs(30),
            uniqueness: UniquenessMode::Code,
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }

    pub fn staging_path(&self) -> PathBuf {
        self.data_dir.join("staging.json")
    }

    pub fn verified_path(&self) -> PathBuf {
        self.data_dir.join("verified.json")
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("invalid boolean {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(parse_bool(" 1 ").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_for_dir_roots_all_paths() {
        let config = Config::for_dir("/tmp/registry");

        assert_eq!(config.database_path, PathBuf::from("/tmp/registry/states.db"));
        assert_eq!(config.staging_path(), PathBuf::from("/tmp/registry/staging.json"));
        assert_eq!(config.verified_path(), PathBuf::from("/tmp/registry/verified.json"));
        assert_eq!(config.uniqueness, UniquenessMode::Code);
    }
}

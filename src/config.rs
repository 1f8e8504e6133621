//! Configuration manager for accounts.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOCAL_ENVIRONMENT: &str = "local";

/// Errors raised while loading the configuration file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to deserialize configuration: {0}")]
    Deserialize(#[from] serde_yaml::Error),
    #[error("missing `jwt_secret` entry or `JWT_SECRET` environment variable")]
    MissingSecret,
}

/// Backend selected at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// MongoDB.
    Document,
    /// PostgreSQL.
    #[default]
    Relational,
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseKind::Document => write!(f, "document"),
            DatabaseKind::Relational => write!(f, "relational"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Version label surfaced in health.
    pub version: String,
    /// Environment label surfaced in health.
    pub environment: String,
    pub http_port: u16,
    pub grpc_port: u16,
    pub database: DatabaseKind,
    /// Backend connection string.
    #[serde(skip_serializing)]
    pub dsn: String,
    /// HMAC key for bearer tokens.
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// Per-request deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Background health poll.
    #[serde(rename = "async")]
    pub poller: Poller,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Request logger.
    pub log: Log,
    #[serde(skip)]
    path: PathBuf,
    #[serde(skip)]
    loaded: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            version: VERSION.to_owned(),
            environment: LOCAL_ENVIRONMENT.to_owned(),
            http_port: 8080,
            grpc_port: 50051,
            database: DatabaseKind::default(),
            dsn: String::default(),
            jwt_secret: String::default(),
            timeout: Duration::from_secs(10),
            poller: Poller::default(),
            argon2: None,
            log: Log::default(),
            path: PathBuf::default(),
            loaded: false,
        }
    }
}

/// Background health poll controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Poller {
    pub run: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            run: false,
            interval: Duration::from_secs(30),
        }
    }
}

/// Argon2 configuration.
///
/// Missing fields fall back to the library defaults.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing, in KiB.
    pub memory_cost: Option<u32>,
    /// Iterations of hash.
    pub iterations: Option<u32>,
    /// Parallelism degree.
    pub parallelism: Option<u32>,
}

/// Request logger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Log {
    /// Path prefixes never logged.
    pub skip_paths: Vec<String>,
    /// Maximum bytes of body kept in a log record.
    pub snapshot_limit: usize,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            skip_paths: vec!["/v1/health".into(), "/metrics".into()],
            snapshot_limit: 512,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Whether secrets may be surfaced in diagnostics.
    pub fn is_local(&self) -> bool {
        self.environment == LOCAL_ENVIRONMENT
    }

    /// File the configuration was read from, or tried to be read from.
    pub fn file(&self) -> &Path {
        &self.path
    }

    /// Whether [`Configuration::file`] existed. Defaults are used otherwise.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location, then applies environment overrides.
    ///
    /// Runs before tracing is installed, so nothing is logged here.
    pub fn read(self) -> Result<Arc<Self>, Error> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let mut config = match File::open(&file_path) {
            Ok(file) => Configuration {
                loaded: true,
                ..serde_yaml::from_reader(file)?
            },
            Err(_) => Self::default(),
        };
        config.path = file_path;

        if let Ok(dsn) = std::env::var("DSN") {
            config.dsn = dsn;
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.jwt_secret = secret;
        }

        config.validate()?;
        Ok(Arc::new(config))
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.jwt_secret.is_empty() {
            return Err(Error::MissingSecret);
        }
        Ok(())
    }
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

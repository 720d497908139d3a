//! Client configuration file and environment.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via CPS_CONFIG)
//! 3. Environment variables

use crate::connection::ConnectionConfig;
use crate::endpoint::Endpoint;
use crate::error::ClientError;
use cps_protocol::{IdPath, DEFAULT_REQUEST_PATH};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Serializable connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection URL (`tcp://`, `http://`, `unix://`, or empty).
    pub url: String,
    pub storage: String,
    pub user: String,
    pub password: String,
    pub application: Option<String>,
    /// Root tag wrapped around documents sent with ids.
    pub document_root: String,
    pub id_path: String,
    pub request_path: String,
    pub connect_timeout_secs: Option<u64>,
    pub io_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            storage: String::new(),
            user: String::new(),
            password: String::new(),
            application: None,
            document_root: "document".to_string(),
            id_path: "id".to_string(),
            request_path: DEFAULT_REQUEST_PATH.to_string(),
            connect_timeout_secs: None,
            io_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ClientError> {
        let mut config = match std::env::var("CPS_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies `CPS_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CPS_URL") {
            self.url = url;
        }
        if let Some(storage) = lookup("CPS_STORAGE") {
            self.storage = storage;
        }
        if let Some(user) = lookup("CPS_USER") {
            self.user = user;
        }
        if let Some(password) = lookup("CPS_PASSWORD") {
            self.password = password;
        }
        if let Some(application) = lookup("CPS_APPLICATION") {
            self.application = Some(application).filter(|a| !a.is_empty());
        }
    }

    /// Validates the settings and builds a [`ConnectionConfig`].
    pub fn into_connection_config(self) -> Result<ConnectionConfig, ClientError> {
        Endpoint::parse(&self.url, &self.storage)?;
        let id_path = IdPath::parse(&self.id_path)
            .map_err(|e| ClientError::Config(format!("id_path '{}': {}", self.id_path, e)))?;

        Ok(ConnectionConfig::new(self.url, self.storage)
            .with_credentials(self.user, self.password)
            .with_application(self.application)
            .with_document_root(self.document_root)
            .with_id_path(id_path)
            .with_request_path(self.request_path)
            .with_connect_timeout(self.connect_timeout_secs.map(Duration::from_secs))
            .with_io_timeout(self.io_timeout_secs.map(Duration::from_secs)))
    }
}

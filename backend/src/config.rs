//! Configuration.
//!
//! The service reads one JSON file holding the rules, the handler list and
//! the hook plugins:
//!
//! ```json
//! {
//!   "auth": { "bearer": "secret" },
//!   "handlers_dir": "./handlers",
//!   "worker_timeout_ms": 5000,
//!   "handlers": [{ "name": "upper", "persistent": true }],
//!   "plugins": [{ "type": "logger" }],
//!   "rules": [{ "id": "people", "each_line": [{ "map": [{ "name": "id" }] }] }]
//! }
//! ```
//!
//! Process settings (config path, port, auth token) come from the
//! environment, with `.env` loaded first.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hooks::{HookPipeline, PluginConfig};
use crate::models::Rule;
use crate::supervisor::{ProcessSupervisor, DEFAULT_HANDLERS_DIR};

pub const DEFAULT_CONFIG_PATH: &str = "linemap.json";
pub const DEFAULT_PORT: u16 = 8080;

/// Inbound authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Fallback bearer token when `AUTH_TOKEN` is not set.
    #[serde(default)]
    pub bearer: Option<String>,
}

/// One external handler program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub name: String,
    /// Start the handler at boot and keep it running.
    #[serde(default)]
    pub persistent: bool,
}

fn default_handlers_dir() -> PathBuf {
    PathBuf::from(DEFAULT_HANDLERS_DIR)
}

/// Decoded configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,

    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    #[serde(default = "default_handlers_dir")]
    pub handlers_dir: PathBuf,

    /// Upper bound on a single handler exchange.
    #[serde(default)]
    pub worker_timeout_ms: Option<u64>,
}

impl Config {
    /// Read and decode a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.id.clone()));
            }
        }
        Ok(())
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn worker_timeout(&self) -> Option<Duration> {
        self.worker_timeout_ms.map(Duration::from_millis)
    }

    /// Build the hook pipeline from the `plugins` list.
    pub fn build_hooks(&self) -> Result<HookPipeline, ConfigError> {
        HookPipeline::from_config(&self.plugins)
            .map_err(|(name, source)| ConfigError::Plugin { name, source })
    }

    /// Build a supervisor for `handlers_dir`. Persistent handlers are not
    /// started yet.
    pub fn build_supervisor(&self) -> ProcessSupervisor {
        let supervisor = ProcessSupervisor::new(&self.handlers_dir);
        match self.worker_timeout() {
            Some(timeout) => supervisor.with_timeout(timeout),
            None => supervisor,
        }
    }
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub port: u16,
    pub auth_token: Option<String>,
}

impl Settings {
    /// Load `.env` if present, then read `LINEMAP_CONFIG`, `PORT` and
    /// `AUTH_TOKEN`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            config_path: std::env::var("LINEMAP_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            auth_token: std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    /// Token expected on uploads: `AUTH_TOKEN` first, then `auth.bearer`.
    pub fn bearer_token(&self, config: &Config) -> Option<String> {
        self.auth_token
            .clone()
            .or_else(|| config.auth.bearer.clone().filter(|t| !t.is_empty()))
    }
}

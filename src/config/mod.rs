pub mod provider;
pub use provider::ProviderConfig;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete broker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Origins allowed by the CORS layer
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Accepted values of the Host header (port ignored)
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    /// Responses smaller than this are sent uncompressed
    #[serde(default = "default_gzip_min_bytes")]
    pub gzip_min_bytes: u16,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}

fn default_gzip_min_bytes() -> u16 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: default_allowed_origins(),
            allowed_hosts: default_allowed_hosts(),
            gzip_min_bytes: default_gzip_min_bytes(),
        }
    }
}

/// Which key-value backend holds states and credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(anyhow::anyhow!("Unknown store backend '{}'", other)),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// How often expired keys are purged (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_sqlite_path() -> String {
    "credbroker.db".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

/// OAuth lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// Lifetime of an unused authorization state
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: u64,
    /// Tokens this close to expiry are refreshed before use
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_seconds: i64,
    /// Providers to enable; each needs its environment variables set
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
}

fn default_state_ttl() -> u64 {
    600
}

fn default_refresh_margin() -> i64 {
    300
}

fn default_providers() -> Vec<String> {
    vec![
        "hubspot".to_string(),
        "notion".to_string(),
        "airtable".to_string(),
    ]
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_seconds: default_state_ttl(),
            refresh_margin_seconds: default_refresh_margin(),
            providers: default_providers(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            oauth: OAuthConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Apply BROKER_* environment overrides on top of file/default values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("BROKER_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Ok(v) = std::env::var("BROKER_STORE_BACKEND") {
            self.store.backend = v.parse().context("Invalid BROKER_STORE_BACKEND")?;
        }
        if let Ok(v) = std::env::var("BROKER_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("BROKER_PROVIDERS") {
            self.oauth.providers = parse_provider_list(&v);
        }
        Ok(())
    }
}

fn parse_provider_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BrokerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: BrokerConfig = toml::from_str(&contents).context("Failed to parse config file")?;
    Ok(config)
}

/// Load configuration from `BROKER_CONFIG` (if set) and apply env overrides.
pub fn load_from_env() -> Result<BrokerConfig> {
    let mut config = match std::env::var("BROKER_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => BrokerConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

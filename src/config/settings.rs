use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Storage backend selected for sub-queue messages and restriction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Postgres,
    Redis,
    Document,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Memory
    }
}

/// Which access-control mode the server enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationMode {
    /// No token required; any caller can touch any sub-queue.
    None,
    /// A token is accepted and scopes its bearer to one sub-queue, but
    /// unauthenticated requests still reach unrestricted sub-queues.
    Hybrid,
    /// A valid token is required for every sub-queue operation.
    Restricted,
}

impl Default for AuthenticationMode {
    fn default() -> Self {
        AuthenticationMode::None
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend_kind: BackendKind,
    #[serde(default)]
    pub authentication_mode: AuthenticationMode,
    #[serde(default)]
    pub token: TokenConfig,
    pub admin_token: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Signing configuration for [`crate::auth::TokenProvider`].
/// `secret` is optional: without it the provider refuses to issue tokens
/// and rejects every token on verification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenConfig {
    pub secret: Option<String>,
    #[serde(default = "default_token_ttl")]
    pub default_ttl_seconds: u64,
}

fn default_token_ttl() -> u64 {
    3600
}

/// Relational (Postgres) backend connectivity.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_database_name")]
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u32,
}

fn default_database_url() -> String {
    "postgres://localhost/multiqueue".to_string()
}

fn default_database_name() -> String {
    "multiqueue".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout_seconds() -> u32 {
    5
}

fn default_idle_timeout_seconds() -> u32 {
    300
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            database: default_database_name(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
        }
    }
}

/// Key/value cache (Redis) backend connectivity, including optional
/// sentinel-mode settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
    /// Whether `endpoints` names a set of Redis Sentinels rather than a
    /// single node.
    #[serde(default)]
    pub sentinel_enabled: bool,
    /// Comma-separated `host[:port]` list; a missing port defaults to
    /// [`default_redis_port`].
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Sentinel master group name; required when `sentinel_enabled`.
    pub master_name: Option<String>,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_prefix() -> String {
    "multiqueue".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            prefix: default_redis_prefix(),
            sentinel_enabled: false,
            endpoints: Vec::new(),
            master_name: None,
        }
    }
}

impl RedisConfig {
    /// Parse `endpoints` into `(host, port)` pairs, applying
    /// [`default_redis_port`] to any entry without one.
    pub fn parsed_endpoints(&self) -> Vec<(String, u16)> {
        self.endpoints
            .iter()
            .map(|entry| match entry.rsplit_once(':') {
                Some((host, port)) => port
                    .parse()
                    .map(|p| (host.to_string(), p))
                    .unwrap_or_else(|_| (entry.clone(), default_redis_port())),
                None => (entry.clone(), default_redis_port()),
            })
            .collect()
    }
}

/// Document store (MongoDB) backend connectivity.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_document_url")]
    pub url: String,
    #[serde(default = "default_database_name")]
    pub database: String,
    #[serde(default = "default_document_collection")]
    pub collection: String,
}

fn default_document_url() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_document_collection() -> String {
    "messages".to_string()
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            url: default_document_url(),
            database: default_database_name(),
            collection: default_document_collection(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Emit structured logs as JSON instead of the human-readable console
    /// formatter.
    #[serde(default)]
    pub json_logs: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            json_logs: false,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("backend_kind", "memory")?
            .set_default("authentication_mode", "none")?
            .set_default("token.default_ttl_seconds", 3600)?
            .set_default("database.url", default_database_url())?
            .set_default("database.database", default_database_name())?
            .set_default("database.pool_size", 10)?
            .set_default("database.connect_timeout_seconds", 5)?
            .set_default("database.idle_timeout_seconds", 300)?
            .set_default("redis.url", default_redis_url())?
            .set_default("redis.prefix", default_redis_prefix())?
            .set_default("redis.sentinel_enabled", false)?
            .set_default("document.url", default_document_url())?
            .set_default("document.database", default_database_name())?
            .set_default("document.collection", default_document_collection())?
            .set_default("server.host", default_host())?
            .set_default("server.port", 8080)?
            .set_default("server.json_logs", false)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults_match_expected_host_and_port() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8080);
    }

    #[test]
    fn backend_kind_defaults_to_memory() {
        assert_eq!(BackendKind::default(), BackendKind::Memory);
    }

    #[test]
    fn authentication_mode_defaults_to_none() {
        assert_eq!(AuthenticationMode::default(), AuthenticationMode::None);
    }

    #[test]
    fn parsed_endpoints_applies_default_port_when_absent() {
        let mut redis = RedisConfig::default();
        redis.endpoints = vec!["sentinel-a:26380".to_string(), "sentinel-b".to_string()];
        let parsed = redis.parsed_endpoints();
        assert_eq!(parsed[0], ("sentinel-a".to_string(), 26380));
        assert_eq!(parsed[1], ("sentinel-b".to_string(), 6379));
    }
}

//! API Configuration Module
//!
//! Configuration is loaded from environment variables with defaults suited
//! to local development: an in-memory store, permissive CORS and port 3002.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use repolens_core::{ConfigError, ResourceOrigin};
use repolens_storage::{GatewayConfig, LmdbStore, PostgrestConfig};
use secrecy::SecretString;

const DEFAULT_PORT: u16 = 3002;
const DEFAULT_ANALYZE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LMDB_MAX_SIZE_MB: usize = 256;

// ============================================================================
// STORE SELECTION
// ============================================================================

/// Which store backs the gateway.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// Process-local map; records are lost on restart.
    Memory,
    /// Local LMDB environment.
    Lmdb { path: PathBuf, max_size_mb: usize },
    /// Supabase / PostgREST table.
    Postgrest(PostgrestConfig),
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Lmdb { .. } => "lmdb",
            StoreBackend::Postgrest(_) => "postgrest",
        }
    }
}

// ============================================================================
// GITHUB ANALYZER SETTINGS
// ============================================================================

/// Settings for the GitHub analyzer.
#[derive(Clone)]
pub struct GithubConfig {
    /// REST API base URL.
    pub api_url: String,
    /// Optional token; unauthenticated requests are heavily rate limited.
    pub token: Option<SecretString>,
    /// Per-request timeout for GitHub calls.
    pub request_timeout: Duration,
    /// Number of contributors included in the analysis.
    pub max_contributors: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
            max_contributors: 10,
        }
    }
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("max_contributors", &self.max_contributors)
            .finish()
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Process configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Listen host.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Prefix used to turn `owner/repo` into a cache key.
    pub resource_origin: ResourceOrigin,

    /// Store backend.
    pub store: StoreBackend,

    /// GitHub analyzer settings.
    pub github: GithubConfig,

    /// Bound on one analysis; `None` waits indefinitely.
    pub analyze_timeout: Option<Duration>,

    /// Coalesce concurrent misses for the same repository.
    pub single_flight: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            resource_origin: ResourceOrigin::default(),
            store: StoreBackend::Memory,
            github: GithubConfig::default(),
            analyze_timeout: Some(Duration::from_secs(DEFAULT_ANALYZE_TIMEOUT_SECS)),
            single_flight: true,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PORT` or `REPOLENS_API_PORT`: listen port (default: 3002)
    /// - `REPOLENS_API_BIND`: listen host (default: 0.0.0.0)
    /// - `REPOLENS_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `REPOLENS_RESOURCE_ORIGIN`: key prefix (default: https://github.com)
    /// - `REPOLENS_STORE`: `memory`, `lmdb` or `postgrest` (default: memory)
    /// - `REPOLENS_LMDB_PATH`, `REPOLENS_LMDB_MAX_SIZE_MB`: LMDB location and map size
    /// - `SUPABASE_URL`, `SUPABASE_KEY`, `REPOLENS_STORE_TABLE`: PostgREST backend
    /// - `GITHUB_TOKEN`, `REPOLENS_GITHUB_API_URL`: GitHub analyzer
    /// - `REPOLENS_ANALYZE_TIMEOUT_SECS`: analysis timeout, `0` disables (default: 120)
    /// - `REPOLENS_SINGLE_FLIGHT`: "true" or "false" (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let host = var("REPOLENS_API_BIND").unwrap_or(defaults.host);

        let port = match var("PORT").or_else(|| var("REPOLENS_API_PORT")) {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| invalid("PORT", &value, "expected a port number"))?,
            None => defaults.port,
        };

        let cors_origins = var("REPOLENS_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = var("REPOLENS_CORS_MAX_AGE_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let resource_origin = var("REPOLENS_RESOURCE_ORIGIN")
            .map(ResourceOrigin::new)
            .unwrap_or(defaults.resource_origin);

        let store = match var("REPOLENS_STORE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("lmdb") => StoreBackend::Lmdb {
                path: var("REPOLENS_LMDB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data/repolens")),
                max_size_mb: match var("REPOLENS_LMDB_MAX_SIZE_MB") {
                    Some(value) => parse_map_size_mb(&value)?,
                    None => DEFAULT_LMDB_MAX_SIZE_MB,
                },
            },
            Some("postgrest") | Some("supabase") => {
                let base_url = var("SUPABASE_URL").ok_or_else(|| missing("SUPABASE_URL"))?;
                let api_key = var("SUPABASE_KEY").ok_or_else(|| missing("SUPABASE_KEY"))?;
                let mut config = PostgrestConfig::new(base_url, SecretString::from(api_key));
                if let Some(table) = var("REPOLENS_STORE_TABLE") {
                    config = config.with_table(table);
                }
                StoreBackend::Postgrest(config)
            }
            Some(other) => {
                return Err(invalid(
                    "REPOLENS_STORE",
                    other,
                    "expected memory, lmdb or postgrest",
                ))
            }
        };

        let github = GithubConfig {
            api_url: var("REPOLENS_GITHUB_API_URL").unwrap_or(defaults.github.api_url),
            token: var("GITHUB_TOKEN").map(SecretString::from),
            ..defaults.github
        };

        let analyze_timeout = match var("REPOLENS_ANALYZE_TIMEOUT_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    return Err(invalid(
                        "REPOLENS_ANALYZE_TIMEOUT_SECS",
                        &value,
                        "expected whole seconds",
                    ))
                }
            },
            None => defaults.analyze_timeout,
        };

        let single_flight = var("REPOLENS_SINGLE_FLIGHT")
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.single_flight);

        Ok(Self {
            host,
            port,
            cors_origins,
            cors_max_age_secs,
            resource_origin,
            store,
            github,
            analyze_timeout,
            single_flight,
        })
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| invalid("REPOLENS_API_BIND", &addr, &e.to_string()))
    }

    /// Whether CORS is restricted to configured origins.
    pub fn is_cors_restricted(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Gateway settings derived from this configuration.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default()
            .with_origin(self.resource_origin.clone())
            .with_coalescing(self.single_flight)
            .with_analyze_timeout(self.analyze_timeout)
    }
}

fn missing(field: &str) -> ConfigError {
    ConfigError::MissingRequired {
        field: field.to_string(),
    }
}

fn parse_map_size_mb(value: &str) -> Result<usize, ConfigError> {
    const FIELD: &str = "REPOLENS_LMDB_MAX_SIZE_MB";
    let mb = value
        .trim()
        .parse::<usize>()
        .map_err(|_| invalid(FIELD, value, "must be a positive number of megabytes"))?;
    LmdbStore::map_size_bytes(mb)
        .map(|_| mb)
        .ok_or_else(|| invalid(FIELD, value, "map size must be non-zero and fit in memory"))
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 3002);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.cors_origins.is_empty());
        assert!(!config.is_cors_restricted());
        assert!(matches!(config.store, StoreBackend::Memory));
        assert_eq!(config.resource_origin.as_str(), "https://github.com");
        assert_eq!(config.analyze_timeout, Some(Duration::from_secs(120)));
        assert!(config.single_flight);
        assert!(config.github.token.is_none());
    }

    #[test]
    fn test_port_precedence_and_validation() {
        let config = config_from(&[("PORT", "8080"), ("REPOLENS_API_PORT", "9090")]).unwrap();
        assert_eq!(config.port, 8080);

        let config = config_from(&[("REPOLENS_API_PORT", "9090")]).unwrap();
        assert_eq!(config.port, 9090);

        let err = config_from(&[("PORT", "not-a-port")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "PORT"));
    }

    #[test]
    fn test_bind_addr() {
        let config = config_from(&[("REPOLENS_API_BIND", "127.0.0.1"), ("PORT", "4000")]).unwrap();
        assert_eq!(config.bind_addr().unwrap(), "127.0.0.1:4000".parse::<SocketAddr>().unwrap());

        let config = config_from(&[("REPOLENS_API_BIND", "not a host")]).unwrap();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_cors_origins() {
        let config = config_from(&[(
            "REPOLENS_CORS_ORIGINS",
            "https://repolens.dev, https://app.repolens.dev,,",
        )])
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://repolens.dev", "https://app.repolens.dev"]
        );
        assert!(config.is_cors_restricted());
    }

    #[test]
    fn test_lmdb_store() {
        let config = config_from(&[
            ("REPOLENS_STORE", "LMDB"),
            ("REPOLENS_LMDB_PATH", "/var/lib/repolens"),
        ])
        .unwrap();
        match config.store {
            StoreBackend::Lmdb { path, max_size_mb } => {
                assert_eq!(path, PathBuf::from("/var/lib/repolens"));
                assert_eq!(max_size_mb, 256);
            }
            other => panic!("unexpected store {:?}", other),
        }
    }

    #[test]
    fn test_lmdb_map_size_is_validated() {
        let config = config_from(&[
            ("REPOLENS_STORE", "lmdb"),
            ("REPOLENS_LMDB_MAX_SIZE_MB", "512"),
        ])
        .unwrap();
        assert!(matches!(
            config.store,
            StoreBackend::Lmdb { max_size_mb: 512, .. }
        ));

        let too_large = usize::MAX.to_string();
        for bad in ["0", "lots", too_large.as_str()] {
            let err = config_from(&[
                ("REPOLENS_STORE", "lmdb"),
                ("REPOLENS_LMDB_MAX_SIZE_MB", bad),
            ])
            .unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { field, .. } if field == "REPOLENS_LMDB_MAX_SIZE_MB"),
                "value {bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_postgrest_store_requires_credentials() {
        let err = config_from(&[("REPOLENS_STORE", "postgrest")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "SUPABASE_URL".to_string()
            }
        );

        let err = config_from(&[
            ("REPOLENS_STORE", "postgrest"),
            ("SUPABASE_URL", "https://xyz.supabase.co"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "SUPABASE_KEY".to_string()
            }
        );

        let config = config_from(&[
            ("REPOLENS_STORE", "postgrest"),
            ("SUPABASE_URL", "https://xyz.supabase.co"),
            ("SUPABASE_KEY", "service-key"),
        ])
        .unwrap();
        match config.store {
            StoreBackend::Postgrest(pg) => {
                assert_eq!(pg.table, "gitdata");
                assert_eq!(pg.api_key.expose_secret(), "service-key");
            }
            other => panic!("unexpected store {:?}", other),
        }
    }

    #[test]
    fn test_unknown_store_is_rejected() {
        let err = config_from(&[("REPOLENS_STORE", "redis")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "REPOLENS_STORE"));
    }

    #[test]
    fn test_timeout_and_coalescing() {
        let config = config_from(&[
            ("REPOLENS_ANALYZE_TIMEOUT_SECS", "0"),
            ("REPOLENS_SINGLE_FLIGHT", "false"),
        ])
        .unwrap();
        assert_eq!(config.analyze_timeout, None);
        assert!(!config.single_flight);

        let gateway = config.gateway_config();
        assert!(!gateway.coalesce);
        assert!(gateway.analyze_timeout.is_none());

        assert!(config_from(&[("REPOLENS_ANALYZE_TIMEOUT_SECS", "soon")]).is_err());
    }

    #[test]
    fn test_secrets_are_redacted() {
        let config = config_from(&[
            ("GITHUB_TOKEN", "ghp_supersecret"),
            ("REPOLENS_STORE", "postgrest"),
            ("SUPABASE_URL", "https://xyz.supabase.co"),
            ("SUPABASE_KEY", "service-key"),
        ])
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("ghp_supersecret"));
        assert!(!debug.contains("service-key"));
        assert!(debug.contains("[REDACTED]"));
    }
}

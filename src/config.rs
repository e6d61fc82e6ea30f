//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `API_KEYS`: Comma-separated `key=Display Name` pairs accepted by the gateway
//! - `SIGNATURE_SECRET`: Shared HMAC-SHA256 secret used to verify `X-Signature`
//! - `SIGNATURE_VALIDITY_SECS`: Accepted clock skew for `X-Timestamp` (default: 300)
//! - `ENABLE_IP_WHITELIST` / `IP_WHITELIST`: Optional exact-match client IP allow-list
//! - `BLOCK_SUSPICIOUS_REQUESTS`: Reject script-injection probes (default: false)
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*` for dev)
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_PER_MINUTE`: Fixed-window quota per API key (default: 100)
//! - `RATE_LIMIT_CLEANUP_INTERVAL_SECS`: Idle window purge period (default: 300)
//! - `RATE_LIMIT_IDLE_TTL_SECS`: Age after which an expired window is purged (default: 120, at least 60)

use std::env;
use std::fmt;
use std::time::Duration;

use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::middleware::WINDOW_SECONDS;
use crate::registry::{ApiKeyEntry, KeyRegistry};

/// Secret used when `SIGNATURE_SECRET` is unset. Only fit for local development.
pub const DEFAULT_SIGNATURE_SECRET: &str = "default-signature-secret";

/// Path prefix guarded by the gateway when `PROTECTED_PATH_PREFIX` is unset.
pub const DEFAULT_PROTECTED_PREFIX: &str = "/api/v1/process-system";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{other}'")),
        }
    }
}

impl LogFormat {
    /// Read `LOG_FORMAT`, defaulting to pretty when unset.
    ///
    /// Read separately from [`Config::from_env`] because the subscriber has
    /// to exist before configuration errors can be logged.
    ///
    /// # Errors
    ///
    /// Returns the parse message for an unrecognised value.
    pub fn from_env() -> Result<Self, String> {
        match env::var("LOG_FORMAT") {
            Ok(value) => value.parse(),
            Err(_) => Ok(LogFormat::default()),
        }
    }
}

/// Settings consumed by the gateway pipeline.
#[derive(Clone)]
pub struct SecurityConfig {
    /// Shared HMAC secret for request signatures
    pub signature_secret: String,

    /// Requests per API key per 60-second window (must be > 0)
    pub rate_limit_per_minute: u32,

    /// Maximum distance in seconds between `X-Timestamp` and the server clock
    pub signature_validity_seconds: u64,

    /// Whether the IP allow-list is consulted
    pub enable_ip_whitelist: bool,

    /// Exact client IPs admitted when the allow-list is enabled
    pub ip_whitelist: Vec<String>,

    /// Append the suspicious-request stage to the pipeline
    pub block_suspicious_requests: bool,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("signature_secret", &"<redacted>")
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field(
                "signature_validity_seconds",
                &self.signature_validity_seconds,
            )
            .field("enable_ip_whitelist", &self.enable_ip_whitelist)
            .field("ip_whitelist", &self.ip_whitelist)
            .field("block_suspicious_requests", &self.block_suspicious_requests)
            .finish()
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            signature_secret: DEFAULT_SIGNATURE_SECRET.to_string(),
            rate_limit_per_minute: 100,
            signature_validity_seconds: 300,
            enable_ip_whitelist: false,
            ip_whitelist: Vec::new(),
            block_suspicious_requests: false,
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    // =========================================================================
    // Gateway Configuration
    // =========================================================================
    /// Registered API keys (debug output redacts the key values)
    pub api_keys: Vec<ApiKeyEntry>,

    /// Pipeline settings
    pub security: SecurityConfig,

    /// Requests under this prefix go through the gateway (default: "/api/v1/process-system")
    /// Stored without a trailing slash; "/" guards every path.
    pub protected_path_prefix: String,

    // =========================================================================
    // Rate Limit Housekeeping
    // =========================================================================
    /// How often idle windows are purged (default: 300 seconds)
    pub rate_limit_cleanup_interval: Duration,

    /// Windows that started longer ago than this are purged (default: 120 seconds)
    pub rate_limit_idle_ttl: Duration,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins (not recommended for production)
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any configuration value is invalid
    /// (e.g., non-numeric PORT value, malformed `API_KEYS` entry).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,

            // Gateway
            api_keys: Self::parse_api_keys(&env::var("API_KEYS").unwrap_or_default())?,
            security: SecurityConfig {
                signature_secret: env::var("SIGNATURE_SECRET")
                    .unwrap_or_else(|_| DEFAULT_SIGNATURE_SECRET.to_string()),
                rate_limit_per_minute: Self::parse_env("RATE_LIMIT_PER_MINUTE", 100)?,
                signature_validity_seconds: Self::parse_env("SIGNATURE_VALIDITY_SECS", 300)?,
                enable_ip_whitelist: Self::parse_env("ENABLE_IP_WHITELIST", false)?,
                ip_whitelist: Self::parse_list(&env::var("IP_WHITELIST").unwrap_or_default()),
                block_suspicious_requests: Self::parse_env("BLOCK_SUSPICIOUS_REQUESTS", false)?,
            },
            protected_path_prefix: normalize_prefix(
                &env::var("PROTECTED_PATH_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_PROTECTED_PREFIX.to_string()),
            ),

            // Rate limit housekeeping
            rate_limit_cleanup_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_CLEANUP_INTERVAL_SECS",
                300,
            )?),
            rate_limit_idle_ttl: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_IDLE_TTL_SECS",
                120,
            )?),

            // HTTP
            cors_allowed_origins: Self::parse_cors_origins(),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.security.rate_limit_per_minute == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_PER_MINUTE must be greater than 0".to_string(),
            ));
        }

        if self.security.signature_validity_seconds == 0 {
            return Err(AppError::ConfigError(
                "SIGNATURE_VALIDITY_SECS must be greater than 0".to_string(),
            ));
        }

        if self.security.signature_secret.is_empty() {
            return Err(AppError::ConfigError(
                "SIGNATURE_SECRET must not be empty".to_string(),
            ));
        }

        if !self.protected_path_prefix.starts_with('/') {
            return Err(AppError::ConfigError(format!(
                "PROTECTED_PATH_PREFIX must start with '/', got '{}'",
                self.protected_path_prefix
            )));
        }

        if self.rate_limit_cleanup_interval.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_CLEANUP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_idle_ttl < Duration::from_secs(WINDOW_SECONDS.unsigned_abs()) {
            return Err(AppError::ConfigError(format!(
                "RATE_LIMIT_IDLE_TTL_SECS must be at least {WINDOW_SECONDS} (one rate limit window)"
            )));
        }

        // Blank and duplicate keys are rejected by the registry
        self.key_registry()?;

        if self.security.signature_secret == DEFAULT_SIGNATURE_SECRET {
            warn!("SIGNATURE_SECRET is not set, using the built-in development secret");
        }
        if self.api_keys.is_empty() {
            warn!("API_KEYS is empty, every protected request will be rejected");
        }

        Ok(())
    }

    /// Build the key registry from the configured keys.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` for blank or duplicate keys.
    pub fn key_registry(&self) -> AppResult<KeyRegistry> {
        KeyRegistry::from_pairs(
            self.api_keys
                .iter()
                .map(|entry| (entry.key.clone(), entry.display_name.clone())),
        )
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse `key=Display Name` pairs separated by commas.
    ///
    /// Entries are reported by position so key values never reach error
    /// messages.
    fn parse_api_keys(raw: &str) -> AppResult<Vec<ApiKeyEntry>> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(index, pair)| {
                let (key, name) = pair.split_once('=').ok_or_else(|| {
                    AppError::ConfigError(format!(
                        "Invalid API_KEYS entry #{}: expected 'key=Display Name'",
                        index + 1
                    ))
                })?;
                Ok(ApiKeyEntry {
                    key: key.trim().to_string(),
                    display_name: name.trim().to_string(),
                })
            })
            .collect()
    }

    fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        Self::parse_list(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()))
    }
}

/// Strip trailing slashes from a path prefix, keeping "/" for the root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            // Gateway
            api_keys: Vec::new(),
            security: SecurityConfig::default(),
            protected_path_prefix: DEFAULT_PROTECTED_PREFIX.to_string(),
            // Rate limit housekeeping
            rate_limit_cleanup_interval: Duration::from_secs(300),
            rate_limit_idle_ttl: Duration::from_secs(120),
            // HTTP
            cors_allowed_origins: vec!["*".to_string()],
            // Observability
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn key(key: &str, name: &str) -> ApiKeyEntry {
        ApiKeyEntry {
            key: key.to_string(),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.security.rate_limit_per_minute, 100);
        assert_eq!(config.security.signature_validity_seconds, 300);
        assert!(!config.security.enable_ip_whitelist);
        assert!(!config.security.block_suspicious_requests);
        assert_eq!(config.protected_path_prefix, "/api/v1/process-system");
        assert_eq!(config.rate_limit_cleanup_interval, Duration::from_secs(300));
        assert_eq!(config.rate_limit_idle_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "localhost".to_string(),
            port: 3000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "localhost:3000");
    }

    #[test]
    fn test_metrics_addr() {
        assert!(Config::default().metrics_addr().is_some());

        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert!(config.metrics_addr().is_none());
    }

    #[test]
    fn test_parse_api_keys() {
        let keys =
            Config::parse_api_keys(" k1 = Partner One ,, k2=Partner Two=Ltd ").unwrap();

        assert_eq!(
            keys,
            vec![key("k1", "Partner One"), key("k2", "Partner Two=Ltd")]
        );
        assert!(Config::parse_api_keys("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_api_keys_rejects_missing_separator() {
        let err = Config::parse_api_keys("k1=One,secret-key-no-name").unwrap_err();
        let message = err.to_string();

        assert!(message.contains("#2"));
        assert!(!message.contains("secret-key-no-name"));
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let config = Config {
            security: SecurityConfig {
                rate_limit_per_minute: 0,
                ..SecurityConfig::default()
            },
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("RATE_LIMIT_PER_MINUTE")
        );
    }

    #[test]
    fn test_validate_zero_validity() {
        let config = Config {
            security: SecurityConfig {
                signature_validity_seconds: 0,
                ..SecurityConfig::default()
            },
            ..Config::default()
        };

        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("SIGNATURE_VALIDITY_SECS")
        );
    }

    #[test]
    fn test_validate_empty_secret() {
        let config = Config {
            security: SecurityConfig {
                signature_secret: String::new(),
                ..SecurityConfig::default()
            },
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_prefix_must_be_absolute() {
        let config = Config {
            protected_path_prefix: "api".to_string(),
            ..Config::default()
        };

        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("PROTECTED_PATH_PREFIX")
        );
    }

    #[test]
    fn test_validate_zero_cleanup_interval() {
        let config = Config {
            rate_limit_cleanup_interval: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_idle_ttl_shorter_than_window() {
        for secs in [0, 10, 59] {
            let config = Config {
                rate_limit_idle_ttl: Duration::from_secs(secs),
                ..Config::default()
            };
            assert!(config.validate().is_err(), "ttl {secs}s accepted");
        }

        let config = Config {
            rate_limit_idle_ttl: Duration::from_secs(60),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_keys() {
        let config = Config {
            api_keys: vec![key("k1", "One"), key("k1", "Other")],
            ..Config::default()
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Duplicate"));
        assert!(!err.contains("k1"));
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config {
            api_keys: vec![key("k1", "One")],
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api/v1/"), "/api/v1");
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("/"), "/");
        assert_eq!(normalize_prefix(""), "/");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_security_debug_hides_secret() {
        let rendered = format!(
            "{:?}",
            SecurityConfig {
                signature_secret: "top-secret".to_string(),
                ..SecurityConfig::default()
            }
        );
        assert!(!rendered.contains("top-secret"));
    }
}

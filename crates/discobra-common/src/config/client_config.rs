//! Client configuration
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present), or is assembled with the builder methods by an embedding
//! application.

use std::env;
use std::time::Duration;

use discobra_core::Intents;

/// Gateway API version this client speaks
pub const API_VERSION: u8 = 10;

/// Main client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bot token; may also be passed directly to `Client::run`
    pub token: Option<String>,
    pub gateway: GatewayConfig,
    pub rest: RestConfig,
    pub reconnect: ReconnectConfig,
    pub log_format: LogFormat,
}

/// Gateway connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base WebSocket URL; a query string is kept
    pub url: String,
    /// Request `zlib-stream` transport compression
    pub compress: bool,
    pub intents: Intents,
    pub api_version: u8,
    /// Limit for the TCP connect and WebSocket upgrade
    pub connect_timeout: Duration,
    /// Limit between the upgrade and the server's Hello
    pub hello_timeout: Duration,
}

impl GatewayConfig {
    /// Build the connect URL for `base`, adding version, encoding and compression
    ///
    /// Query keys already present in `base` are left as they are.
    #[must_use]
    pub fn connect_url(&self, base: &str) -> String {
        let present: Vec<&str> = base
            .split_once('?')
            .map(|(_, query)| {
                query
                    .split('&')
                    .filter_map(|pair| pair.split('=').next())
                    .collect()
            })
            .unwrap_or_default();

        let mut params = vec![
            ("v", self.api_version.to_string()),
            ("encoding", "json".to_string()),
        ];
        if self.compress {
            params.push(("compress", "zlib-stream".to_string()));
        }
        let missing: Vec<String> = params
            .into_iter()
            .filter(|(key, _)| !present.contains(key))
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let mut url = base.to_string();
        if missing.is_empty() {
            return url;
        }
        if url.contains('?') {
            if !url.ends_with('?') && !url.ends_with('&') {
                url.push('&');
            }
        } else {
            // `wss://host` has no path; the query needs one
            let authority = url.split_once("://").map_or(url.as_str(), |(_, rest)| rest);
            if !authority.contains('/') {
                url.push('/');
            }
            url.push('?');
        }
        url.push_str(&missing.join("&"));
        url
    }
}

/// REST API settings
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// API root without the version segment, e.g. `https://discord.com/api`
    pub base_url: String,
    pub api_version: u8,
}

impl RestConfig {
    /// Versioned API root, e.g. `https://discord.com/api/v10`
    #[must_use]
    pub fn versioned_url(&self) -> String {
        format!("{}/v{}", self.base_url.trim_end_matches('/'), self.api_version)
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Give up after this many consecutive failed attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(default_reconnect_base_ms()),
            max_delay: Duration::from_millis(default_reconnect_max_ms()),
            max_attempts: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

// Default value functions
fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/".to_string()
}

fn default_api_base_url() -> String {
    "https://discord.com/api".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_hello_timeout_ms() -> u64 {
    20_000
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            gateway: GatewayConfig {
                url: default_gateway_url(),
                compress: true,
                intents: Intents::default(),
                api_version: API_VERSION,
                connect_timeout: Duration::from_millis(default_connect_timeout_ms()),
                hello_timeout: Duration::from_millis(default_hello_timeout_ms()),
            },
            rest: RestConfig {
                base_url: default_api_base_url(),
                api_version: API_VERSION,
            },
            reconnect: ReconnectConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Unset variables fall back to defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_version = parse_var(&lookup, "DISCORD_API_VERSION")?.unwrap_or(API_VERSION);

        let intents = match lookup("DISCORD_INTENTS") {
            Some(raw) => Intents::parse(&raw)
                .map_err(|e| ConfigError::InvalidValue("DISCORD_INTENTS", e.to_string()))?,
            None => defaults.gateway.intents,
        };

        let compress = match lookup("DISCORD_COMPRESS") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::InvalidValue("DISCORD_COMPRESS", raw))?,
            None => defaults.gateway.compress,
        };

        let log_format = match lookup("DISCORD_LOG_FORMAT") {
            Some(raw) => LogFormat::parse(&raw)
                .ok_or_else(|| ConfigError::InvalidValue("DISCORD_LOG_FORMAT", raw))?,
            None => defaults.log_format,
        };

        let connect_timeout_ms = parse_positive(&lookup, "DISCORD_CONNECT_TIMEOUT_MS")?
            .unwrap_or_else(default_connect_timeout_ms);
        let hello_timeout_ms = parse_positive(&lookup, "DISCORD_HELLO_TIMEOUT_MS")?
            .unwrap_or_else(default_hello_timeout_ms);

        let base_ms = parse_positive(&lookup, "DISCORD_RECONNECT_BASE_MS")?
            .unwrap_or_else(default_reconnect_base_ms);
        let max_ms =
            parse_var(&lookup, "DISCORD_RECONNECT_MAX_MS")?.unwrap_or_else(default_reconnect_max_ms);
        if max_ms < base_ms {
            return Err(ConfigError::InvalidValue(
                "DISCORD_RECONNECT_MAX_MS",
                format!("{max_ms} is below DISCORD_RECONNECT_BASE_MS ({base_ms})"),
            ));
        }

        Ok(Self {
            token: lookup("DISCORD_TOKEN").filter(|t| !t.trim().is_empty()),
            gateway: GatewayConfig {
                url: lookup("DISCORD_GATEWAY_URL").unwrap_or(defaults.gateway.url),
                compress,
                intents,
                api_version,
                connect_timeout: Duration::from_millis(connect_timeout_ms),
                hello_timeout: Duration::from_millis(hello_timeout_ms),
            },
            rest: RestConfig {
                base_url: lookup("DISCORD_API_BASE_URL").unwrap_or(defaults.rest.base_url),
                api_version,
            },
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
                max_attempts: parse_var(&lookup, "DISCORD_MAX_RECONNECT_ATTEMPTS")?,
            },
            log_format,
        })
    }

    /// Get the token or fail with `MissingVar`
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token
            .as_deref()
            .ok_or(ConfigError::MissingVar("DISCORD_TOKEN"))
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.gateway.intents = intents;
        self
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway.url = url.into();
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest.base_url = url.into();
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.gateway.compress = compress;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, hello: Duration) -> Self {
        self.gateway.connect_timeout = connect;
        self.gateway.hello_timeout = hello;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key, raw))
        })
        .transpose()
}

/// Millisecond values that must not be zero
fn parse_positive<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<u64, F>(lookup, key)? {
        Some(0) => Err(ConfigError::InvalidValue(key, "must be greater than zero".to_string())),
        value => Ok(value),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

//! Environment-driven configuration.
//!
//! Every client reads its settings from `LAKECHAT_*` variables. The
//! gateway section is always required; the query, discovery and extractor
//! sections are optional and present only when their URL variable is set.
//! Parsing goes through a lookup function so tests never touch the
//! process environment.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::job::PollConfig;

/// Model requested when `LAKECHAT_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// Configuration for the chat completion gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    /// Per-request deadline for gateway calls.
    pub request_timeout: Duration,
    /// Submission retry budget, including the first attempt.
    pub retry_attempts: u32,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = require(&lookup, "LAKECHAT_GATEWAY_URL")?;
        let api_key = SecretString::from(require(&lookup, "LAKECHAT_API_KEY")?);
        let model = lookup("LAKECHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let request_timeout = duration_secs(&lookup, "LAKECHAT_REQUEST_TIMEOUT_SECS", 180)?;
        let retry_attempts = parse_u32(&lookup, "LAKECHAT_RETRY_ATTEMPTS", 10)?;
        Ok(Self {
            base_url,
            api_key,
            model,
            request_timeout,
            retry_attempts,
        })
    }
}

/// Configuration for the analytical query service.
#[derive(Debug, Clone)]
pub struct QueryServiceConfig {
    pub base_url: String,
    /// Database the queries run against.
    pub database: String,
    /// Table holding per-learner activity records.
    pub table: String,
    /// Where the service materializes result sets.
    pub output_location: String,
    pub poll: PollConfig,
}

impl QueryServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            base_url: require(&lookup, "LAKECHAT_QUERY_URL")?,
            database: require(&lookup, "LAKECHAT_QUERY_DATABASE")?,
            table: require(&lookup, "LAKECHAT_QUERY_TABLE")?,
            output_location: require(&lookup, "LAKECHAT_QUERY_OUTPUT")?,
            poll: PollConfig {
                interval: duration_millis(&lookup, "LAKECHAT_QUERY_POLL_INTERVAL_MS", 1_000)?,
                timeout: duration_secs(&lookup, "LAKECHAT_QUERY_TIMEOUT_SECS", 180)?,
            },
        })
    }
}

/// Configuration for the catalog discovery service.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub base_url: String,
    pub poll: PollConfig,
}

impl DiscoveryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            base_url: require(&lookup, "LAKECHAT_DISCOVERY_URL")?,
            poll: PollConfig {
                interval: duration_millis(&lookup, "LAKECHAT_DISCOVERY_POLL_INTERVAL_MS", 5_000)?,
                timeout: duration_secs(&lookup, "LAKECHAT_DISCOVERY_TIMEOUT_SECS", 600)?,
            },
        })
    }
}

/// Configuration for the document text extraction service.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl ExtractorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            base_url: require(&lookup, "LAKECHAT_EXTRACTOR_URL")?,
            request_timeout: duration_secs(&lookup, "LAKECHAT_EXTRACTOR_TIMEOUT_SECS", 120)?,
        })
    }
}

/// Everything the binary needs, in one read.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub query: Option<QueryServiceConfig>,
    pub discovery: Option<DiscoveryConfig>,
    pub extractor: Option<ExtractorConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gateway = GatewayConfig::from_lookup(&lookup)?;
        let query = match lookup("LAKECHAT_QUERY_URL") {
            Some(_) => Some(QueryServiceConfig::from_lookup(&lookup)?),
            None => None,
        };
        let discovery = match lookup("LAKECHAT_DISCOVERY_URL") {
            Some(_) => Some(DiscoveryConfig::from_lookup(&lookup)?),
            None => None,
        };
        let extractor = match lookup("LAKECHAT_EXTRACTOR_URL") {
            Some(_) => Some(ExtractorConfig::from_lookup(&lookup)?),
            None => None,
        };
        Ok(Self {
            gateway,
            query,
            discovery,
            extractor,
        })
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn duration_secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_number(lookup, key, default).map(Duration::from_secs)
}

fn duration_millis<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_number(lookup, key, default).map(Duration::from_millis)
}

fn parse_u32<F>(lookup: &F, key: &str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_number(lookup, key, default)
}

fn parse_number<F, N>(lookup: &F, key: &str, default: N) -> Result<N, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    N: std::str::FromStr,
    N::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|e: N::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

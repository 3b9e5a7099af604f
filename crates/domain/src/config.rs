//! Configuration structures shared by all binaries.
//!
//! The XCP client itself only ever sees an [`XcpConfig`] value; reading it
//! from the environment happens here so binaries can share one contract.

use std::{env, time::Duration};

use thiserror::Error;

use crate::model::XcpNode;

/// Counterparty nodes tried, in order, when nothing else is configured.
pub const DEFAULT_XCP_NODES: &[(&str, &str)] = &[
    ("counterparty.io", "https://api.counterparty.io:4000/v2"),
    (
        "stampchain.io",
        "https://k6e0ufzq8h.execute-api.us-east-1.amazonaws.com/beta/counterpartyproxy/v2",
    ),
];

/// Connection and retry knobs for the XCP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XcpConfig {
    nodes: Vec<XcpNode>,
    cache_ttl: Duration,
    max_retries: u32,
    retry_delay: Duration,
    request_timeout: Duration,
}

impl Default for XcpConfig {
    fn default() -> Self {
        Self {
            nodes: DEFAULT_XCP_NODES
                .iter()
                .map(|(name, url)| XcpNode::new(*name, *url))
                .collect(),
            cache_ttl: Self::DEFAULT_CACHE_TTL,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl XcpConfig {
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(nodes: Vec<XcpNode>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Loads the node list and tuning knobs from the environment, falling
    /// back to the defaults for anything unset.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let mut config = Self::default();
        if let Some(raw) = get_optional_var("XCP_V2_NODES") {
            config.nodes = parse_nodes(&raw)?;
        }
        if let Some(secs) = get_optional_number("XCP_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(retries) = get_optional_number("XCP_MAX_RETRIES")? {
            config.max_retries = u32::try_from(retries).unwrap_or(u32::MAX);
        }
        if let Some(millis) = get_optional_number("XCP_RETRY_DELAY_MS")? {
            config.retry_delay = Duration::from_millis(millis);
        }
        if let Some(secs) = get_optional_number("XCP_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn nodes(&self) -> &[XcpNode] {
        &self.nodes
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// API-specific configuration so the HTTP surface does not depend on
/// probe-only variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    api_bind_address: String,
    api_unix_socket: Option<String>,
}

impl ApiConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
        })
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }
}

/// Parses `name=url;name=url`. Entries without a name use the URL as name.
fn parse_nodes(raw: &str) -> Result<Vec<XcpNode>, ConfigError> {
    let mut nodes = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, url) = match entry.split_once('=') {
            Some((name, url)) => (name.trim(), url.trim()),
            None => (entry, entry),
        };
        if url.is_empty() || !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidNode {
                entry: entry.to_string(),
            });
        }
        nodes.push(XcpNode::new(name, url));
    }

    if nodes.is_empty() {
        return Err(ConfigError::NoNodes);
    }
    Ok(nodes)
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_optional_number(key: &'static str) -> Result<Option<u64>, ConfigError> {
    get_optional_var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("STAMPS_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid xcp node entry `{entry}`, expected name=http(s)://host")]
    InvalidNode { entry: String },
    #[error("no xcp nodes configured")]
    NoNodes,
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

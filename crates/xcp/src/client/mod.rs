//! Node failover fetcher shared by every XCP read and compose call.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use stamps_domain::{
    config::XcpConfig,
    model::XcpNode,
    services::cache::{api_cache_key, get_or_compute, CacheService},
};
use tracing::{debug, error, warn};
use url::form_urlencoded;

use crate::{error::XcpError, http::HttpClient};

pub mod types;

pub use types::{degraded_payload, extract_error_message, Envelope};

/// Characters left as-is inside a path segment. Everything else, `/`, `?`,
/// `#` and `%` included, is percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':');

/// Encodes a caller-supplied address, asset or UTXO for use as one path
/// segment. Empty and dot-only values are rejected since they would change
/// which endpoint is hit.
pub fn path_segment(value: &str) -> Result<String, XcpError> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(XcpError::InvalidRequest(format!(
            "`{value}` is not a valid path segment"
        )));
    }
    Ok(utf8_percent_encode(value, PATH_SEGMENT).to_string())
}

/// Ordered query parameters; encoding keeps insertion order so cache keys
/// are stable for identical calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Replaces an existing value for `key` or appends a new pair.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn set_opt<T: ToString>(&mut self, key: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// Reason the last node in the list gave for failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeFailure {
    pub message: String,
}

/// Counterparty v2 client. Nodes are tried strictly in configured order and
/// every collaborator is injected so tests can swap them out.
#[derive(Clone)]
pub struct XcpClient {
    config: XcpConfig,
    http: Arc<dyn HttpClient>,
    cache: Arc<dyn CacheService>,
}

impl XcpClient {
    pub fn new(config: XcpConfig, http: Arc<dyn HttpClient>, cache: Arc<dyn CacheService>) -> Self {
        Self {
            config,
            http,
            cache,
        }
    }

    pub fn config(&self) -> &XcpConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }

    /// Cached read. When every node fails the degraded payload
    /// `{result: [], next_cursor: null, result_count: 0, error}` is returned
    /// instead of an error and is not cached.
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &QueryParams,
        cache_ttl: Option<Duration>,
    ) -> Value {
        let query = params.encode();
        let key = api_cache_key(endpoint, &query);
        let ttl = cache_ttl.unwrap_or(self.config.cache_ttl());

        match get_or_compute(self.cache.as_ref(), &key, ttl, || {
            self.fetch_from_nodes(endpoint, &query)
        })
        .await
        {
            Ok(value) => value,
            Err(failure) => {
                counter!("xcp_fetch_exhausted_total", "path" => "read").increment(1);
                error!(
                    endpoint,
                    error = %failure.message,
                    "all xcp nodes failed, returning degraded payload"
                );
                degraded_payload(&failure.message)
            }
        }
    }

    /// Failover without the cache. Exhaustion is an error here.
    pub async fn fetch_uncached(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Value, XcpError> {
        self.fetch_from_nodes(endpoint, &params.encode())
            .await
            .map_err(|failure| {
                counter!("xcp_fetch_exhausted_total", "path" => "uncached").increment(1);
                XcpError::NodesExhausted {
                    endpoint: endpoint.to_string(),
                    message: failure.message,
                }
            })
    }

    pub(crate) async fn fetch_from_nodes(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<Value, NodeFailure> {
        let mut last_error = String::from("no xcp nodes configured");

        for node in self.config.nodes() {
            let url = node.endpoint_url(endpoint, query);
            match self.attempt(node, &url).await {
                Ok(value) => {
                    counter!("xcp_node_requests_total", "node" => node.name.clone(), "result" => "ok")
                        .increment(1);
                    debug!(node = %node.name, endpoint, "xcp node answered");
                    return Ok(value);
                }
                Err(message) => {
                    counter!("xcp_node_requests_total", "node" => node.name.clone(), "result" => "error")
                        .increment(1);
                    warn!(
                        node = %node.name,
                        url = %url,
                        endpoint,
                        error = %message,
                        "xcp node request failed, trying next node"
                    );
                    last_error = message;
                }
            }
        }

        Err(NodeFailure {
            message: last_error,
        })
    }

    async fn attempt(&self, node: &XcpNode, url: &str) -> Result<Value, String> {
        let response = self
            .http
            .get(url, self.config.request_timeout())
            .await
            .map_err(|err| err.to_string())?;

        if !response.is_success() {
            debug!(node = %node.name, status = response.status, "xcp node returned error status");
            return Err(extract_error_message(&response.body));
        }

        serde_json::from_str(&response.body)
            .map_err(|err| format!("invalid JSON from {}: {err}", node.name))
    }
}

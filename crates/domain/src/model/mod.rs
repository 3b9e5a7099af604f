//! Data structures shared by the XCP client and the HTTP surface.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Counterparty API v2 node the client may fail over to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XcpNode {
    pub name: String,
    pub url: String,
}

impl XcpNode {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Joins the node base URL with an endpoint path and an encoded query.
    pub fn endpoint_url(&self, endpoint: &str, query: &str) -> String {
        let base = self.url.trim_end_matches('/');
        if query.is_empty() {
            format!("{base}{endpoint}")
        } else {
            format!("{base}{endpoint}?{query}")
        }
    }
}

/// Opaque pagination cursor. Counterparty hands out either numbers or
/// strings; both are re-sent verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads a `next_cursor` field. `null`, empty strings and other JSON
    /// types mean there is no further page.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(Self(number.to_string())),
            Value::String(text) if !text.is_empty() => Some(Self(text.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub address: String,
    pub cpid: String,
    /// Amount in base units.
    pub quantity: u64,
    /// Empty when the balance sits on the address rather than on a UTXO.
    pub utxo: String,
    pub utxo_address: String,
    pub divisible: bool,
}

impl Balance {
    pub fn is_utxo_attached(&self) -> bool {
        !self.utxo.is_empty()
    }
}

/// One page of balances as returned by a single fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePage {
    pub balances: Vec<Balance>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
    /// Set when every node failed and the page was built from the
    /// degraded payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// Balances accumulated over every page for an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub balances: Vec<Balance>,
    pub total: u64,
}

/// A generic cursor page for the read endpoints that are passed through
/// without normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub result: Vec<T>,
    pub next_cursor: Option<Cursor>,
    pub result_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub name: String,
    pub url: String,
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_url_handles_trailing_slash_and_empty_query() {
        let node = XcpNode::new("cp", "https://api.counterparty.io:4000/v2/");
        assert_eq!(
            node.endpoint_url("/healthz", ""),
            "https://api.counterparty.io:4000/v2/healthz"
        );
        assert_eq!(
            node.endpoint_url("/assets/XCP", "verbose=true"),
            "https://api.counterparty.io:4000/v2/assets/XCP?verbose=true"
        );
    }

    #[test]
    fn cursor_accepts_numbers_and_strings() {
        assert_eq!(Cursor::from_json(&json!(1500)), Some(Cursor::new("1500")));
        assert_eq!(Cursor::from_json(&json!("abc")), Some(Cursor::new("abc")));
        assert_eq!(Cursor::from_json(&json!("")), None);
        assert_eq!(Cursor::from_json(&Value::Null), None);
    }
}

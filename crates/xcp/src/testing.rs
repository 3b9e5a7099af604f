//! In-process doubles for the XCP client tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use stamps_domain::{config::XcpConfig, model::XcpNode, services::cache::MokaCacheService};

use crate::{
    client::XcpClient,
    http::{HttpClient, HttpError, HttpResponse},
};

type Responder = dyn Fn(&str) -> Result<HttpResponse, HttpError> + Send + Sync;

/// [`HttpClient`] that answers from a closure and records every URL.
#[derive(Clone)]
pub struct ScriptedHttp {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<String>>>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
}

impl ScriptedHttp {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<HttpResponse, HttpError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
            timeouts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Option<String> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Timeouts passed with each request, in call order.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, HttpError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.timeouts.lock().unwrap().push(timeout);
        (self.responder)(url)
    }
}

/// `count` nodes named `node1..` at `https://nodeN.test/v2`.
pub fn nodes(count: usize) -> Vec<XcpNode> {
    (1..=count)
        .map(|i| XcpNode::new(format!("node{i}"), format!("https://node{i}.test/v2")))
        .collect()
}

/// Client over `nodes` with a 1ms retry delay.
pub fn client_with(nodes: Vec<XcpNode>, http: ScriptedHttp) -> XcpClient {
    client_with_config(
        XcpConfig::new(nodes).with_retry_delay(Duration::from_millis(1)),
        http,
    )
}

pub fn client_with_config(config: XcpConfig, http: ScriptedHttp) -> XcpClient {
    XcpClient::new(config, Arc::new(http), Arc::new(MokaCacheService::default()))
}

/// Reads a query parameter back out of a recorded URL.
pub fn query_value(url: &str, key: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

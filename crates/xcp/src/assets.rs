//! Asset, holder, dispenser and health reads.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stamps_domain::model::{Balance, Cursor, NodeHealth, Page};
use strum_macros::AsRefStr;
use tracing::{debug, warn};

use crate::{
    client::{path_segment, types::normalize_balance_row, Envelope, QueryParams, XcpClient},
    error::XcpError,
};

const HEALTH_ENDPOINT: &str = "/healthz";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsRefStr, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispenserStatus {
    #[default]
    Open,
    Closed,
    All,
}

fn page_params(limit: Option<u32>, cursor: Option<&Cursor>) -> QueryParams {
    let mut params = QueryParams::new().with("verbose", true);
    params.set_opt("limit", limit);
    params.set_opt("cursor", cursor.map(Cursor::as_str));
    params
}

fn into_page<T>(envelope: Envelope, result: Vec<T>) -> Page<T> {
    let result_count = envelope.result_count.unwrap_or(result.len() as u64);
    Page {
        result,
        next_cursor: envelope.next_cursor,
        result_count,
        error: envelope.error,
    }
}

fn require(value: &str, field: &str) -> Result<(), XcpError> {
    if value.trim().is_empty() {
        return Err(XcpError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

fn is_healthy(value: &Value) -> bool {
    value
        .get("result")
        .and_then(|result| result.get("status"))
        .and_then(Value::as_str)
        == Some("Healthy")
}

impl XcpClient {
    /// Asset details for `cpid`. A node answering with no result (or every
    /// node failing) is reported as a missing asset.
    pub async fn get_asset(&self, cpid: &str) -> Result<Value, XcpError> {
        require(cpid, "cpid")?;
        let endpoint = format!("/assets/{}", path_segment(cpid)?);
        let value = self
            .fetch(&endpoint, &QueryParams::new().with("verbose", true), None)
            .await;

        match value.get("result") {
            Some(Value::Object(asset)) => Ok(Value::Object(asset.clone())),
            _ => {
                debug!(cpid, "asset lookup returned no data");
                Err(XcpError::AssetNotFound {
                    cpid: cpid.to_string(),
                })
            }
        }
    }

    pub async fn get_holders(
        &self,
        cpid: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Balance>, XcpError> {
        require(cpid, "cpid")?;
        let value = self
            .fetch(
                &format!("/assets/{}/balances", path_segment(cpid)?),
                &page_params(limit, cursor),
                None,
            )
            .await;
        let envelope = Envelope::parse(&value);
        let holders = envelope
            .result
            .iter()
            .filter_map(|row| normalize_balance_row("", row))
            .collect();
        Ok(into_page(envelope, holders))
    }

    pub async fn get_dispensers_by_address(
        &self,
        address: &str,
        status: DispenserStatus,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Value>, XcpError> {
        require(address, "address")?;
        self.fetch_page(
            &format!("/addresses/{}/dispensers", path_segment(address)?),
            page_params(limit, cursor).with("status", status.as_ref()),
        )
        .await
    }

    pub async fn get_dispensers_by_cpid(
        &self,
        cpid: &str,
        status: DispenserStatus,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Value>, XcpError> {
        require(cpid, "cpid")?;
        self.fetch_page(
            &format!("/assets/{}/dispensers", path_segment(cpid)?),
            page_params(limit, cursor).with("status", status.as_ref()),
        )
        .await
    }

    pub async fn get_sends(
        &self,
        cpid: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Value>, XcpError> {
        require(cpid, "cpid")?;
        self.fetch_page(
            &format!("/assets/{}/sends", path_segment(cpid)?),
            page_params(limit, cursor),
        )
        .await
    }

    pub async fn get_dispenses(
        &self,
        cpid: &str,
        limit: Option<u32>,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Value>, XcpError> {
        require(cpid, "cpid")?;
        self.fetch_page(
            &format!("/assets/{}/dispenses", path_segment(cpid)?),
            page_params(limit, cursor),
        )
        .await
    }

    async fn fetch_page(&self, endpoint: &str, params: QueryParams) -> Result<Page<Value>, XcpError> {
        let value = self.fetch(endpoint, &params, None).await;
        let envelope = Envelope::parse(&value);
        let rows = envelope.result.clone();
        Ok(into_page(envelope, rows))
    }

    /// True when the first node to answer `/healthz` reports `Healthy`.
    pub async fn check_health(&self) -> bool {
        match self.fetch_uncached(HEALTH_ENDPOINT, &QueryParams::new()).await {
            Ok(value) => is_healthy(&value),
            Err(err) => {
                warn!(error = %err, "xcp health check failed");
                false
            }
        }
    }

    /// Probes every configured node on its own, without failover.
    pub async fn node_health(&self) -> Vec<NodeHealth> {
        let mut report = Vec::with_capacity(self.config().nodes().len());

        for node in self.config().nodes() {
            let url = node.endpoint_url(HEALTH_ENDPOINT, "");
            let healthy = match self.http().get(&url, self.config().request_timeout()).await {
                Ok(response) if response.is_success() => {
                    match serde_json::from_str::<Value>(&response.body) {
                        Ok(value) => is_healthy(&value),
                        Err(err) => {
                            warn!(
                                node = %node.name,
                                error = %err,
                                "xcp node sent an unreadable health payload"
                            );
                            false
                        }
                    }
                }
                Ok(response) => {
                    warn!(node = %node.name, status = response.status, "xcp node unhealthy");
                    false
                }
                Err(err) => {
                    warn!(node = %node.name, error = %err, "xcp node unreachable");
                    false
                }
            };

            report.push(NodeHealth {
                name: node.name.clone(),
                url: node.url.clone(),
                healthy,
                checked_at: Utc::now(),
            });
        }

        report
    }
}

//! Operator probe: reports per-node health and, given an address, its full
//! Counterparty balance sweep as JSON on stdout.

use std::{env, io, sync::Arc};

use serde_json::json;
use stamps_domain::{
    config::XcpConfig,
    services::{
        cache::MokaCacheService,
        telemetry::{init_telemetry, TelemetryConfig},
    },
};
use stamps_xcp::{ProbeError, ReqwestHttpClient, XcpClient};
use tracing::info;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[xcp-probe] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), ProbeError> {
    let config = XcpConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("PROBE");
    let _telemetry = init_telemetry(&telemetry_config)?;

    let cache = MokaCacheService::new();
    let client = XcpClient::new(
        config,
        Arc::new(ReqwestHttpClient::new()?),
        Arc::new(cache),
    );

    let nodes = client.node_health().await;
    info!(
        healthy = nodes.iter().filter(|node| node.healthy).count(),
        total = nodes.len(),
        "probed xcp nodes"
    );

    let mut report = json!({ "nodes": nodes });
    if let Some(address) = env::args().nth(1) {
        let summary = client.get_all_balances(&address, None, false).await?;
        report["address"] = json!(address);
        report["balances"] = serde_json::to_value(summary)?;
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

use stamps_domain::{config::ConfigError, fee::FeeRateError, services::telemetry::TelemetryError};
use thiserror::Error;

use crate::{compose::ComposeKind, http::HttpError};

#[derive(Debug, Error)]
pub enum XcpError {
    #[error("all xcp nodes failed for {endpoint}: {message}")]
    NodesExhausted { endpoint: String, message: String },
    #[error("{kind} compose failed: {message}")]
    Compose { kind: ComposeKind, message: String },
    #[error("invalid fee rate: {0}")]
    FeeRate(#[from] FeeRateError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("no data returned for asset {cpid}")]
    AssetNotFound { cpid: String },
    #[error("balance sweep for {address} failed after {attempts} attempts: {message}")]
    SweepFailed {
        address: String,
        attempts: u32,
        message: String,
    },
}

/// Errors surfaced by the `xcp-probe` binary.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    #[error("xcp error: {0}")]
    Xcp(#[from] XcpError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

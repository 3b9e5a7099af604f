//! Counterparty v2 client used by the stamps explorer: ordered node
//! failover with a read-through cache, balance aggregation across pages,
//! and transaction composition. The `xcp-probe` binary in `main.rs` wraps
//! the same client for operators.

pub mod assets;
pub mod balances;
pub mod client;
pub mod compose;
pub mod error;
pub mod http;

#[cfg(test)]
mod testing;

pub use assets::DispenserStatus;
pub use balances::{
    aggregate_balances, BalanceKeying, BalanceQuery, BalanceType, BALANCE_PAGE_LIMIT,
};
pub use client::{degraded_payload, extract_error_message, Envelope, QueryParams, XcpClient};
pub use compose::{
    AttachOptions, ComposeFee, ComposeKind, DetachOptions, DispenseOptions, IssuanceOptions,
    SendOptions, DEFAULT_REGULAR_DUST_SIZE,
};
pub use error::{ProbeError, XcpError};
pub use http::{HttpClient, HttpError, HttpResponse, ReqwestHttpClient};

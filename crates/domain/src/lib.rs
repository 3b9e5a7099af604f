//! Domain-level building blocks shared across the XCP client and API crates.
//!
//! Everything here is transport-agnostic: node descriptors and balance rows,
//! the fee-rate normaliser, configuration loading and the cache/telemetry
//! services that the client receives by injection.

pub mod config;
pub mod fee;
pub mod model;
pub mod services;

pub use config::{ApiConfig, ConfigError, XcpConfig};
pub use fee::{normalize_fee_rate, FeeRateError, FeeRateInput, NormalizedFeeRate};
pub use model::*;
pub use services::cache::{api_cache_key, get_or_compute, CacheService, MokaCacheService};

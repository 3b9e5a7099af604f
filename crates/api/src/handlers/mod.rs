pub mod assets;
pub mod balances;
pub mod compose;
pub mod fee;
pub mod ops;

pub use assets::asset_handler;
pub use balances::balances_handler;
pub use compose::{
    compose_attach_handler, compose_detach_handler, compose_dispense_handler,
    compose_issuance_handler, compose_send_handler,
};
pub use fee::normalize_fee_handler;
pub use ops::{health_handler, metrics_handler};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use stamps_domain::fee::FeeRateError;
use stamps_xcp::XcpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("invalid fee rate: {0}")]
    FeeRate(#[from] FeeRateError),
    #[error("asset {0} not found")]
    AssetNotFound(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl From<XcpError> for ApiError {
    fn from(err: XcpError) -> Self {
        match err {
            XcpError::InvalidRequest(message) => ApiError::InvalidRequest(message),
            XcpError::FeeRate(err) => ApiError::FeeRate(err),
            XcpError::AssetNotFound { cpid } => ApiError::AssetNotFound(cpid),
            other @ (XcpError::NodesExhausted { .. }
            | XcpError::Compose { .. }
            | XcpError::SweepFailed { .. }) => ApiError::Upstream(other.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::FeeRate(_) => StatusCode::BAD_REQUEST,
            ApiError::AssetNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use stamps_domain::model::Cursor;
use stamps_xcp::{BalanceKeying, BalanceQuery, BalanceType};

use crate::state::AppState;

use super::ApiError;

/// Largest page a caller may ask Counterparty for.
pub const MAX_PAGE_LIMIT: u32 = 1000;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BalancesParams {
    pub cpid: Option<String>,
    pub utxo_only: Option<bool>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub all: Option<bool>,
    pub keying: Option<BalanceKeying>,
}

pub async fn balances_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<BalancesParams>,
) -> Result<HttpResponse, ApiError> {
    let address = path.into_inner();
    if address.trim().is_empty() {
        return Err(ApiError::InvalidRequest("address is required".into()));
    }
    let params = params.into_inner();
    let cpid = params.cpid.as_deref().filter(|cpid| !cpid.is_empty());
    let utxo_only = params.utxo_only.unwrap_or(false);
    let keying = params.keying.unwrap_or_default();

    if params.all.unwrap_or(false) {
        let summary = state
            .client()
            .get_all_balances_with(&address, cpid, utxo_only, keying)
            .await
            .inspect_err(|_| {
                counter!("api_balance_requests_total", "mode" => "all", "status" => "error")
                    .increment(1);
            })?;
        counter!("api_balance_requests_total", "mode" => "all", "status" => "ok").increment(1);
        return Ok(HttpResponse::Ok().json(summary));
    }

    if let Some(limit) = params.limit {
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(ApiError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
    }

    let query = BalanceQuery {
        limit: params.limit,
        cursor: params.cursor.filter(|c| !c.is_empty()).map(Cursor::new),
        balance_type: utxo_only.then_some(BalanceType::Utxo),
        keying,
    };
    let page = state
        .client()
        .get_balances(&address, cpid, utxo_only, &query)
        .await?;
    let status = if page.degraded.is_some() { "degraded" } else { "ok" };
    counter!("api_balance_requests_total", "mode" => "page", "status" => status).increment(1);

    Ok(HttpResponse::Ok().json(page))
}

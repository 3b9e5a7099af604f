use actix_web::{web, HttpResponse};
use metrics::counter;

use crate::state::AppState;

use super::ApiError;

pub async fn asset_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let cpid = path.into_inner();
    let asset = state.client().get_asset(&cpid).await.inspect_err(|_| {
        counter!("api_asset_requests_total", "status" => "error").increment(1);
    })?;
    counter!("api_asset_requests_total", "status" => "ok").increment(1);
    Ok(HttpResponse::Ok().json(asset))
}

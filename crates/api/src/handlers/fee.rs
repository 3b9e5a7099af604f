use actix_web::{web, HttpResponse};
use stamps_domain::fee::{normalize_fee_rate, FeeRateInput};

use super::ApiError;

/// Accepts `{satsPerVB?, satsPerKB?}` and answers with both units.
pub async fn normalize_fee_handler(
    payload: web::Json<FeeRateInput>,
) -> Result<HttpResponse, ApiError> {
    let normalized = normalize_fee_rate(payload.into_inner())?;
    Ok(HttpResponse::Ok().json(normalized))
}

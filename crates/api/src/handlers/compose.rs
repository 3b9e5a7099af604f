use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use stamps_xcp::{AttachOptions, DetachOptions, DispenseOptions, IssuanceOptions, SendOptions};

use crate::state::AppState;

use super::ApiError;

/// Compose body: the signing address (or, for detach, the `txid:vout`
/// being detached) next to the operation's own options.
#[derive(Debug, Deserialize, Serialize)]
pub struct ComposeRequest<T> {
    pub source: String,
    #[serde(flatten)]
    pub options: T,
}

pub async fn compose_send_handler(
    state: web::Data<AppState>,
    payload: web::Json<ComposeRequest<SendOptions>>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let composed = state
        .client()
        .create_send(&request.source, &request.options)
        .await?;
    Ok(HttpResponse::Ok().json(composed))
}

pub async fn compose_dispense_handler(
    state: web::Data<AppState>,
    payload: web::Json<ComposeRequest<DispenseOptions>>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let composed = state
        .client()
        .create_dispense(&request.source, &request.options)
        .await?;
    Ok(HttpResponse::Ok().json(composed))
}

pub async fn compose_attach_handler(
    state: web::Data<AppState>,
    payload: web::Json<ComposeRequest<AttachOptions>>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let composed = state
        .client()
        .compose_attach(&request.source, &request.options)
        .await?;
    Ok(HttpResponse::Ok().json(composed))
}

pub async fn compose_detach_handler(
    state: web::Data<AppState>,
    payload: web::Json<ComposeRequest<DetachOptions>>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let composed = state
        .client()
        .compose_detach(&request.source, &request.options)
        .await?;
    Ok(HttpResponse::Ok().json(composed))
}

pub async fn compose_issuance_handler(
    state: web::Data<AppState>,
    payload: web::Json<ComposeRequest<IssuanceOptions>>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let composed = state
        .client()
        .create_issuance(&request.source, &request.options)
        .await?;
    Ok(HttpResponse::Ok().json(composed))
}

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use stamps_domain::config::{ApiConfig, ConfigError, XcpConfig};
use stamps_domain::services::{
    cache::MokaCacheService,
    telemetry::{init_telemetry, TelemetryConfig, TelemetryError},
};
use stamps_xcp::{HttpError, ReqwestHttpClient, XcpClient};
use thiserror::Error;
use tracing::info;

use crate::{
    handlers::{
        asset_handler, balances_handler, compose_attach_handler, compose_detach_handler,
        compose_dispense_handler, compose_issuance_handler, compose_send_handler, health_handler,
        metrics_handler, normalize_fee_handler,
    },
    state::AppState,
};

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let xcp_config = XcpConfig::load_from_env()?;

    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let cache = MokaCacheService::new();
    info!(
        nodes = xcp_config.nodes().len(),
        cache_ttl_secs = xcp_config.cache_ttl().as_secs(),
        "xcp client configured"
    );
    let client = XcpClient::new(
        xcp_config,
        Arc::new(ReqwestHttpClient::new()?),
        Arc::new(cache),
    );
    let state = AppState::new(Arc::new(client), telemetry);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(configure_routes)
    });

    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            if let Some(socket) = config.api_unix_socket() {
                cleanup_socket(socket)?;
                server = server.bind_uds(socket)?;
            } else {
                server = server.bind(config.api_bind_address())?;
            }
        } else {
            if let Some(socket) = config.api_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            server = server.bind(config.api_bind_address())?;
        }
    }

    server.run().await?;
    Ok(())
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v2/xcp/health", web::get().to(health_handler))
        .route(
            "/api/v2/xcp/balances/{address}",
            web::get().to(balances_handler),
        )
        .route("/api/v2/xcp/assets/{cpid}", web::get().to(asset_handler))
        .route(
            "/api/v2/xcp/compose/send",
            web::post().to(compose_send_handler),
        )
        .route(
            "/api/v2/xcp/compose/dispense",
            web::post().to(compose_dispense_handler),
        )
        .route(
            "/api/v2/xcp/compose/attach",
            web::post().to(compose_attach_handler),
        )
        .route(
            "/api/v2/xcp/compose/detach",
            web::post().to(compose_detach_handler),
        )
        .route(
            "/api/v2/xcp/compose/issuance",
            web::post().to(compose_issuance_handler),
        )
        .route("/api/v2/fee/normalize", web::post().to(normalize_fee_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("http client error: {0}")]
    Http(#[from] HttpError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A socket file left behind by an unclean shutdown makes `bind_uds` fail.
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = std::path::Path::new(path);
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    Ok(())
}

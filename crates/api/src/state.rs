use std::sync::Arc;

use stamps_domain::services::telemetry::TelemetryGuard;
use stamps_xcp::XcpClient;

#[derive(Clone)]
pub struct AppState {
    client: Arc<XcpClient>,
    telemetry: TelemetryGuard,
}

impl AppState {
    pub fn new(client: Arc<XcpClient>, telemetry: TelemetryGuard) -> Self {
        Self { client, telemetry }
    }

    pub fn client(&self) -> &XcpClient {
        self.client.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }
}

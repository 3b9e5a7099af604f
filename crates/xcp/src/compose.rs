//! Builders for Counterparty's compose endpoints. Compose calls go through
//! the node failover path but never through the cache: two calls with the
//! same arguments may select different UTXOs.

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stamps_domain::fee::{normalize_fee_rate, FeeRateInput};
use strum_macros::{AsRefStr, Display};
use tracing::{error, info};

use crate::{
    client::{path_segment, QueryParams, XcpClient},
    error::XcpError,
};

/// Dust output size Counterparty is asked to use for sends.
pub const DEFAULT_REGULAR_DUST_SIZE: u64 = 546;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComposeKind {
    Send,
    Dispense,
    Attach,
    Detach,
    Issuance,
}

/// Fee knobs accepted by every compose call. `sat_per_vbyte` supersedes
/// the deprecated `fee_per_kb`; only one of them reaches the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeFee {
    #[serde(default)]
    pub sat_per_vbyte: Option<f64>,
    #[serde(default)]
    pub fee_per_kb: Option<u64>,
}

impl ComposeFee {
    pub fn sat_per_vbyte(rate: f64) -> Self {
        Self {
            sat_per_vbyte: Some(rate),
            fee_per_kb: None,
        }
    }

    fn apply(&self, params: &mut QueryParams) -> Result<(), XcpError> {
        if let Some(rate) = self.sat_per_vbyte {
            let normalized = normalize_fee_rate(FeeRateInput::per_vbyte(rate))?;
            params.set("sat_per_vbyte", normalized.sats_per_vb);
        } else if let Some(fee_per_kb) = self.fee_per_kb {
            params.set("fee_per_kb", fee_per_kb);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    pub destination: String,
    pub asset: String,
    pub quantity: u64,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub memo_is_hex: Option<bool>,
    #[serde(default)]
    pub use_enhanced_send: Option<bool>,
    #[serde(default, flatten)]
    pub fee: ComposeFee,
    #[serde(default)]
    pub regular_dust_size: Option<u64>,
    #[serde(default)]
    pub return_psbt: Option<bool>,
    #[serde(default)]
    pub allow_unconfirmed_inputs: Option<bool>,
    #[serde(default)]
    pub exact_fee: Option<u64>,
    #[serde(default)]
    pub inputs_set: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispenseOptions {
    pub dispenser: String,
    pub quantity: u64,
    #[serde(default, flatten)]
    pub fee: ComposeFee,
    #[serde(default)]
    pub return_psbt: Option<bool>,
    #[serde(default)]
    pub allow_unconfirmed_inputs: Option<bool>,
    #[serde(default)]
    pub exact_fee: Option<u64>,
    #[serde(default)]
    pub inputs_set: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachOptions {
    pub asset: String,
    pub quantity: u64,
    #[serde(default)]
    pub destination_vout: Option<u32>,
    #[serde(default)]
    pub utxo_value: Option<u64>,
    #[serde(default, flatten)]
    pub fee: ComposeFee,
    #[serde(default)]
    pub return_psbt: Option<bool>,
    #[serde(default)]
    pub inputs_set: Option<String>,
    #[serde(default)]
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetachOptions {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default, flatten)]
    pub fee: ComposeFee,
    #[serde(default)]
    pub return_psbt: Option<bool>,
    #[serde(default)]
    pub inputs_set: Option<String>,
    #[serde(default)]
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuanceOptions {
    pub asset: String,
    pub quantity: u64,
    #[serde(default)]
    pub divisible: Option<bool>,
    #[serde(default)]
    pub lock: Option<bool>,
    #[serde(default)]
    pub reset: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transfer_destination: Option<String>,
    #[serde(default, flatten)]
    pub fee: ComposeFee,
    #[serde(default)]
    pub return_psbt: Option<bool>,
    #[serde(default)]
    pub allow_unconfirmed_inputs: Option<bool>,
    #[serde(default)]
    pub inputs_set: Option<String>,
}

fn require(value: &str, field: &str) -> Result<(), XcpError> {
    if value.trim().is_empty() {
        return Err(XcpError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

fn require_quantity(quantity: u64) -> Result<(), XcpError> {
    if quantity == 0 {
        return Err(XcpError::InvalidRequest(
            "quantity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

impl XcpClient {
    pub async fn create_send(&self, source: &str, options: &SendOptions) -> Result<Value, XcpError> {
        require(source, "source address")?;
        require(&options.destination, "destination")?;
        require(&options.asset, "asset")?;
        require_quantity(options.quantity)?;

        let mut params = QueryParams::new()
            .with("destination", &options.destination)
            .with("asset", &options.asset)
            .with("quantity", options.quantity);
        params.set_opt("memo", options.memo.as_ref());
        params.set_opt("memo_is_hex", options.memo_is_hex);
        params.set_opt("use_enhanced_send", options.use_enhanced_send);
        options.fee.apply(&mut params)?;
        params.set(
            "regular_dust_size",
            options.regular_dust_size.unwrap_or(DEFAULT_REGULAR_DUST_SIZE),
        );
        params.set("return_psbt", options.return_psbt.unwrap_or(false));
        params.set_opt("allow_unconfirmed_inputs", options.allow_unconfirmed_inputs);
        params.set_opt("exact_fee", options.exact_fee);
        params.set_opt("inputs_set", options.inputs_set.as_ref());

        self.compose(
            ComposeKind::Send,
            &format!("/addresses/{}/compose/send", path_segment(source)?),
            &params,
        )
        .await
    }

    pub async fn create_dispense(
        &self,
        buyer: &str,
        options: &DispenseOptions,
    ) -> Result<Value, XcpError> {
        require(buyer, "buyer address")?;
        require(&options.dispenser, "dispenser")?;
        require_quantity(options.quantity)?;

        let mut params = QueryParams::new()
            .with("dispenser", &options.dispenser)
            .with("quantity", options.quantity);
        options.fee.apply(&mut params)?;
        params.set("return_psbt", options.return_psbt.unwrap_or(false));
        params.set_opt("allow_unconfirmed_inputs", options.allow_unconfirmed_inputs);
        params.set_opt("exact_fee", options.exact_fee);
        params.set_opt("inputs_set", options.inputs_set.as_ref());

        self.compose(
            ComposeKind::Dispense,
            &format!("/addresses/{}/compose/dispense", path_segment(buyer)?),
            &params,
        )
        .await
    }

    /// Attaches `quantity` of `asset` held by `address` to a UTXO.
    pub async fn compose_attach(
        &self,
        address: &str,
        options: &AttachOptions,
    ) -> Result<Value, XcpError> {
        require(address, "address")?;
        require(&options.asset, "asset")?;
        require_quantity(options.quantity)?;

        let mut params = QueryParams::new()
            .with("asset", &options.asset)
            .with("quantity", options.quantity);
        params.set_opt("destination_vout", options.destination_vout);
        params.set_opt("utxo_value", options.utxo_value);
        options.fee.apply(&mut params)?;
        params.set("return_psbt", options.return_psbt.unwrap_or(false));
        params.set_opt("inputs_set", options.inputs_set.as_ref());
        params.set("verbose", options.verbose.unwrap_or(true));

        self.compose(
            ComposeKind::Attach,
            &format!("/addresses/{}/compose/attach", path_segment(address)?),
            &params,
        )
        .await
    }

    /// Detaches every asset sitting on `utxo` (`txid:vout`).
    pub async fn compose_detach(
        &self,
        utxo: &str,
        options: &DetachOptions,
    ) -> Result<Value, XcpError> {
        require(utxo, "utxo")?;
        if !utxo.contains(':') {
            return Err(XcpError::InvalidRequest(format!(
                "utxo `{utxo}` must be formatted as txid:vout"
            )));
        }

        let mut params = QueryParams::new();
        params.set_opt("destination", options.destination.as_ref());
        options.fee.apply(&mut params)?;
        params.set("return_psbt", options.return_psbt.unwrap_or(false));
        params.set_opt("inputs_set", options.inputs_set.as_ref());
        params.set("verbose", options.verbose.unwrap_or(true));

        self.compose(
            ComposeKind::Detach,
            &format!("/utxos/{}/compose/detach", path_segment(utxo)?),
            &params,
        )
        .await
    }

    pub async fn create_issuance(
        &self,
        source: &str,
        options: &IssuanceOptions,
    ) -> Result<Value, XcpError> {
        require(source, "source address")?;
        require(&options.asset, "asset")?;

        let mut params = QueryParams::new()
            .with("asset", &options.asset)
            .with("quantity", options.quantity);
        params.set_opt("divisible", options.divisible);
        params.set_opt("lock", options.lock);
        params.set_opt("reset", options.reset);
        params.set_opt("description", options.description.as_ref());
        params.set_opt("transfer_destination", options.transfer_destination.as_ref());
        options.fee.apply(&mut params)?;
        params.set("return_psbt", options.return_psbt.unwrap_or(false));
        params.set_opt("allow_unconfirmed_inputs", options.allow_unconfirmed_inputs);
        params.set_opt("inputs_set", options.inputs_set.as_ref());

        self.compose(
            ComposeKind::Issuance,
            &format!("/addresses/{}/compose/issuance", path_segment(source)?),
            &params,
        )
        .await
    }

    async fn compose(
        &self,
        kind: ComposeKind,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Value, XcpError> {
        match self.fetch_from_nodes(endpoint, &params.encode()).await {
            Ok(value) => {
                counter!("xcp_compose_requests_total", "kind" => kind.as_ref().to_string(), "result" => "ok")
                    .increment(1);
                info!(kind = %kind, endpoint, "transaction composed");
                Ok(value)
            }
            Err(failure) => {
                counter!("xcp_compose_requests_total", "kind" => kind.as_ref().to_string(), "result" => "error")
                    .increment(1);
                error!(kind = %kind, endpoint, error = %failure.message, "compose failed on every node");
                Err(XcpError::Compose {
                    kind,
                    message: failure.message,
                })
            }
        }
    }
}

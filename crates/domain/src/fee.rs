//! Fee-rate normalisation between sat/vB and sat/kB.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of sat/kB that make up one sat/vB.
pub const SATS_PER_KB_MULTIPLIER: f64 = 1000.0;

/// Lowest sat/vB rate accepted by the composer.
pub const MIN_SATS_PER_VB: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRateInput {
    #[serde(default, rename = "satsPerKB")]
    pub sats_per_kb: Option<f64>,
    #[serde(default, rename = "satsPerVB")]
    pub sats_per_vb: Option<f64>,
}

impl FeeRateInput {
    pub fn per_vbyte(rate: f64) -> Self {
        Self {
            sats_per_vb: Some(rate),
            sats_per_kb: None,
        }
    }

    pub fn per_kb(rate: f64) -> Self {
        Self {
            sats_per_vb: None,
            sats_per_kb: Some(rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFeeRate {
    #[serde(rename = "normalizedSatsPerVB")]
    pub sats_per_vb: f64,
    #[serde(rename = "normalizedSatsPerKB")]
    pub sats_per_kb: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeeRateError {
    #[error("either satsPerKB or satsPerVB must be provided")]
    Missing,
    #[error("fee rate {rate} sat/vB is below the minimum of {MIN_SATS_PER_VB} sat/vB")]
    BelowMinimum { rate: f64 },
}

/// Resolves a caller-supplied fee rate into both units.
///
/// A sat/vB value is authoritative. A sat/kB value smaller than
/// [`SATS_PER_KB_MULTIPLIER`] is assumed to already be expressed in sat/vB,
/// since no real sat/kB rate is that low.
pub fn normalize_fee_rate(input: FeeRateInput) -> Result<NormalizedFeeRate, FeeRateError> {
    let sats_per_vb = match (input.sats_per_vb, input.sats_per_kb) {
        (Some(vb), _) => vb,
        (None, Some(kb)) if kb < SATS_PER_KB_MULTIPLIER => kb,
        (None, Some(kb)) => kb / SATS_PER_KB_MULTIPLIER,
        (None, None) => return Err(FeeRateError::Missing),
    };

    // NaN fails this comparison as well.
    if !(sats_per_vb >= MIN_SATS_PER_VB) {
        return Err(FeeRateError::BelowMinimum { rate: sats_per_vb });
    }

    Ok(NormalizedFeeRate {
        sats_per_vb,
        sats_per_kb: sats_per_vb * SATS_PER_KB_MULTIPLIER,
    })
}

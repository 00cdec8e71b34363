use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::ValuationResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Rates expressed as percentages (5.00 = 5%). Always produced by the engine,
/// never consumed by it.
pub type Percent = Decimal;

/// A rate given either once for the whole horizon or year by year.
///
/// Serialised untagged, so `0.10` and `[0.12, 0.10, 0.08]` are both valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateSchedule {
    Scalar(Rate),
    PerYear(Vec<Rate>),
}

impl RateSchedule {
    /// Expand to exactly `years` entries. Scalars broadcast; per-year
    /// sequences must already have the right length.
    pub fn normalize(&self, field: &str, years: u32) -> ValuationResult<Vec<Rate>> {
        let expected = years as usize;
        match self {
            RateSchedule::Scalar(rate) => Ok(vec![*rate; expected]),
            RateSchedule::PerYear(rates) if rates.len() == expected => Ok(rates.clone()),
            RateSchedule::PerYear(rates) => Err(ValuationError::LengthMismatch {
                field: field.into(),
                expected,
                actual: rates.len(),
            }),
        }
    }

    /// Arithmetic mean of the schedule (the scalar itself for `Scalar`).
    pub fn average(&self) -> Option<Rate> {
        match self {
            RateSchedule::Scalar(rate) => Some(*rate),
            RateSchedule::PerYear(rates) if rates.is_empty() => None,
            RateSchedule::PerYear(rates) => {
                let sum: Decimal = rates.iter().sum();
                Some(sum / Decimal::from(rates.len() as u64))
            }
        }
    }
}

impl From<Rate> for RateSchedule {
    fn from(rate: Rate) -> Self {
        RateSchedule::Scalar(rate)
    }
}

impl From<Vec<Rate>> for RateSchedule {
    fn from(rates: Vec<Rate>) -> Self {
        RateSchedule::PerYear(rates)
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

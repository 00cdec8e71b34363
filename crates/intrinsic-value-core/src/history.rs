//! Trailing metrics derived from already-fetched annual financials.
//!
//! Series are ordered most recent first, the way statement providers return
//! them. Missing observations are `None` and propagate as `None` rather than
//! failing the whole analysis.

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::time_value::round_2dp;
use crate::types::{with_metadata, ComputationOutput, Money, Percent, Rate};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Annual statement lines, most recent year first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalFinancials {
    pub revenue: Vec<Option<Money>>,
    pub free_cash_flow: Vec<Option<Money>>,
    /// Diluted average shares; drives the dilution/buyback rates
    #[serde(default)]
    pub diluted_shares: Vec<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_pe: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peg_ratio: Option<Decimal>,
}

/// Trailing growth and margin metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalMetrics {
    /// Annualised revenue growth, longest horizon first (e.g. 3y, 2y, 1y)
    pub revenue_growth: Vec<Option<Rate>>,
    /// Annualised change in diluted shares: positive is dilution, negative buybacks
    pub share_change: Vec<Option<Rate>>,
    /// FCF / revenue, oldest first
    pub fcf_margins: Vec<Option<Rate>>,
    /// Most recent one-year revenue growth; the default growth assumption
    pub latest_revenue_growth: Option<Rate>,
    /// Most recent FCF margin; the default margin assumption
    pub latest_fcf_margin: Option<Rate>,
    /// Most recent revenue; the default base for projections
    pub latest_revenue: Option<Money>,
    /// Growth priced in by analysts (forward P/E over PEG), in percent
    pub analyst_growth: Option<Percent>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn analyze_history(
    input: &HistoricalFinancials,
) -> ValuationResult<ComputationOutput<HistoricalMetrics>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.revenue.len() < 2 {
        return Err(ValuationError::InsufficientData(
            "At least two years of revenue are needed for trailing growth".into(),
        ));
    }

    let revenue_growth = trailing_growth_rates(&input.revenue);
    let share_change = trailing_growth_rates(&input.diluted_shares);
    let fcf_margins = fcf_margins(&input.revenue, &input.free_cash_flow);

    let latest_revenue_growth = revenue_growth.last().copied().flatten();
    let latest_fcf_margin = fcf_margins.last().copied().flatten();

    if latest_revenue_growth.is_none() {
        warnings.push("Latest one-year revenue growth is unavailable".into());
    }
    if latest_fcf_margin.is_none() {
        warnings.push("Latest FCF margin is unavailable".into());
    }
    if input.diluted_shares.len() < 2 {
        warnings.push("Fewer than two years of share counts; dilution not computed".into());
    }

    let output = HistoricalMetrics {
        revenue_growth,
        share_change,
        fcf_margins,
        latest_revenue_growth,
        latest_fcf_margin,
        latest_revenue: input.revenue.first().copied().flatten(),
        analyst_growth: analyst_growth(input.forward_pe, input.peg_ratio),
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Trailing annualised growth and FCF margins",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// Annualised growth from each older observation to the latest one.
///
/// For a series `[s_0, .., s_{n-1}]` the k-th entry (k = n-1 down to 1) is
/// `(s_0 / s_k)^(1/k) - 1`, so the longest horizon comes first. Missing
/// values or a non-positive ratio yield `None`.
pub fn trailing_growth_rates(series: &[Option<Decimal>]) -> Vec<Option<Rate>> {
    let Some(&latest) = series.first() else {
        return Vec::new();
    };

    (1..series.len())
        .rev()
        .map(|k| {
            let (latest, past) = (latest?, series[k]?);
            if past.is_zero() {
                return None;
            }
            let ratio = latest / past;
            if ratio <= Decimal::ZERO {
                return None;
            }
            let root = if k == 1 {
                ratio
            } else {
                ratio.checked_powd(Decimal::ONE / Decimal::from(k as u64))?
            };
            Some(root - Decimal::ONE)
        })
        .collect()
}

/// FCF margin for every year but the oldest, returned oldest first.
pub fn fcf_margins(revenue: &[Option<Money>], fcf: &[Option<Money>]) -> Vec<Option<Rate>> {
    let n = revenue.len().min(fcf.len());
    let mut margins: Vec<Option<Rate>> = (0..n.saturating_sub(1))
        .map(|i| match (revenue[i], fcf[i]) {
            (Some(r), Some(f)) if !r.is_zero() => Some(f / r),
            _ => None,
        })
        .collect();
    margins.reverse();
    margins
}

/// Long-run growth implied by the forward P/E and the PEG ratio, in percent.
pub fn analyst_growth(forward_pe: Option<Decimal>, peg_ratio: Option<Decimal>) -> Option<Percent> {
    match (forward_pe, peg_ratio) {
        (Some(pe), Some(peg)) if !peg.is_zero() => Some(round_2dp(pe / peg)),
        _ => None,
    }
}

/// Format a rate the way the trailing tables show it, e.g. `5.73%`.
pub fn format_pct(rate: Option<Rate>) -> String {
    match rate {
        Some(r) => format!("{}%", round_2dp(r * dec!(100))),
        None => "-".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::time_value::{discount_factor, gordon_terminal_value, present_value, round_2dp};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, RateSchedule};
use crate::ValuationResult;

/// Terminal value share of EV above which a warning is emitted.
const TV_CONCENTRATION_WARNING: Decimal = dec!(0.75);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inputs shared by the forward DCF, the reverse solves and the full
/// valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationInputs {
    /// Revenue growth per year, or one rate for the whole horizon
    pub revenue_growth: RateSchedule,
    /// Free cash flow as a fraction of revenue, per year or uniform
    pub fcf_margin: RateSchedule,
    /// Explicit projection horizon in years
    pub years: u32,
    /// Base-year revenue
    pub latest_revenue: Money,
    /// Required annual return used to discount cash flows
    pub discount_rate: Rate,
    /// Perpetuity growth after the explicit horizon
    pub terminal_growth_rate: Rate,
    /// Shares outstanding
    pub total_shares: Decimal,
    /// Observed market price per share (needed by the reverse solves)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Money>,
}

/// Projection for a single year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfYearProjection {
    pub year: u32,
    pub revenue_growth: Rate,
    pub fcf_margin: Rate,
    pub revenue: Money,
    pub fcf: Money,
    /// `(1 + discount_rate)^year`
    pub discount_factor: Decimal,
    pub pv_fcf: Money,
}

/// Output of the forward DCF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfOutput {
    pub projections: Vec<DcfYearProjection>,
    /// Projected free cash flow, year 1 first
    pub fcf_path: Vec<Money>,
    /// Revenue in the final projection year
    pub terminal_revenue: Money,
    /// Sum of present values of the explicit-period FCFs
    pub pv_of_fcf: Money,
    /// Gordon growth terminal value at the end of the horizon
    pub terminal_value: Money,
    pub pv_of_terminal: Money,
    /// PV(FCF) + PV(TV)
    pub enterprise_value: Money,
    /// Terminal value as a fraction of enterprise value
    pub terminal_value_pct: Rate,
    /// Enterprise value per share, rounded to 2dp
    pub fair_value_per_share: Money,
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Validated, broadcast form of [`ValuationInputs`]. Every per-year vector
/// has exactly `years` entries.
#[derive(Debug, Clone)]
pub(crate) struct DcfModel {
    pub growth: Vec<Rate>,
    pub margins: Vec<Rate>,
    pub latest_revenue: Money,
    pub discount_rate: Rate,
    pub terminal_growth_rate: Rate,
    pub total_shares: Decimal,
}

/// Unrounded valuation of a [`DcfModel`].
#[derive(Debug, Clone)]
pub(crate) struct ModelValue {
    pub projections: Vec<DcfYearProjection>,
    pub pv_of_fcf: Money,
    pub terminal_value: Money,
    pub pv_of_terminal: Money,
    pub enterprise_value: Money,
    pub per_share: Money,
}

impl DcfModel {
    /// Normalise the schedules and check everything except the
    /// discount-rate / terminal-growth relation, which the discount-rate
    /// reverse solve replaces anyway.
    pub fn from_inputs(inputs: &ValuationInputs) -> ValuationResult<Self> {
        if inputs.years == 0 {
            return Err(ValuationError::invalid(
                "years",
                "Projection horizon must be at least one year",
            ));
        }
        if inputs.latest_revenue <= Decimal::ZERO {
            return Err(ValuationError::invalid(
                "latest_revenue",
                "Base revenue must be positive",
            ));
        }
        if inputs.total_shares <= Decimal::ZERO {
            return Err(ValuationError::invalid(
                "total_shares",
                "Share count must be positive",
            ));
        }
        if inputs.terminal_growth_rate <= dec!(-1) {
            return Err(ValuationError::invalid(
                "terminal_growth_rate",
                "Terminal growth must be greater than -100%",
            ));
        }

        Ok(Self {
            growth: inputs.revenue_growth.normalize("revenue_growth", inputs.years)?,
            margins: inputs.fcf_margin.normalize("fcf_margin", inputs.years)?,
            latest_revenue: inputs.latest_revenue,
            discount_rate: inputs.discount_rate,
            terminal_growth_rate: inputs.terminal_growth_rate,
            total_shares: inputs.total_shares,
        })
    }

    /// The Gordon growth model needs `discount_rate > terminal_growth_rate`.
    pub fn check_discount_rate(&self) -> ValuationResult<()> {
        if self.discount_rate <= dec!(-1) {
            return Err(ValuationError::invalid(
                "discount_rate",
                "Discount rate must be greater than -100%",
            ));
        }
        if self.discount_rate <= self.terminal_growth_rate {
            return Err(ValuationError::TerminalValueUndefined {
                discount_rate: self.discount_rate,
                terminal_growth_rate: self.terminal_growth_rate,
            });
        }
        Ok(())
    }

    pub fn years(&self) -> u32 {
        self.growth.len() as u32
    }

    pub fn project(&self) -> ValuationResult<Vec<DcfYearProjection>> {
        let mut projections = Vec::with_capacity(self.growth.len());
        let mut revenue = self.latest_revenue;

        for (idx, (&growth, &margin)) in self.growth.iter().zip(&self.margins).enumerate() {
            let year = idx as u32 + 1;
            revenue = revenue
                .checked_mul(Decimal::ONE + growth)
                .ok_or_else(|| ValuationError::overflow(format!("revenue in year {year}")))?;
            let fcf = revenue
                .checked_mul(margin)
                .ok_or_else(|| ValuationError::overflow(format!("FCF in year {year}")))?;
            let factor = discount_factor(self.discount_rate, year)?;
            let pv_fcf = present_value(fcf, self.discount_rate, year)?;

            projections.push(DcfYearProjection {
                year,
                revenue_growth: growth,
                fcf_margin: margin,
                revenue,
                fcf,
                discount_factor: factor,
                pv_fcf,
            });
        }

        Ok(projections)
    }

    pub fn value(&self) -> ValuationResult<ModelValue> {
        let projections = self.project()?;
        let last = projections.last().ok_or_else(|| {
            ValuationError::InsufficientData("No projection years generated".into())
        })?;

        let pv_of_fcf = projections
            .iter()
            .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.pv_fcf))
            .ok_or_else(|| ValuationError::overflow("sum of discounted FCF"))?;

        let terminal_value =
            gordon_terminal_value(last.fcf, self.discount_rate, self.terminal_growth_rate)?;
        let pv_of_terminal = present_value(terminal_value, self.discount_rate, last.year)?;

        let enterprise_value = pv_of_fcf
            .checked_add(pv_of_terminal)
            .ok_or_else(|| ValuationError::overflow("enterprise value"))?;
        let per_share = enterprise_value
            .checked_div(self.total_shares)
            .ok_or_else(|| ValuationError::DivisionByZero {
                context: "fair value per share".into(),
            })?;

        Ok(ModelValue {
            projections,
            pv_of_fcf,
            terminal_value,
            pv_of_terminal,
            enterprise_value,
            per_share,
        })
    }

    /// Unrounded enterprise value per share; the reverse-solve objective.
    pub fn per_share_value(&self) -> ValuationResult<Money> {
        self.value().map(|v| v.per_share)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the forward DCF: project FCF, discount it, add a Gordon growth
/// terminal value and divide by the share count.
pub fn forward_dcf(inputs: &ValuationInputs) -> ValuationResult<ComputationOutput<DcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let model = DcfModel::from_inputs(inputs)?;
    model.check_discount_rate()?;

    let output = build_output(model.value()?, &mut warnings);

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Perpetuity-growth FCF DCF (end-of-year discounting)",
        inputs,
        warnings,
        elapsed,
        output,
    ))
}

pub(crate) fn build_output(value: ModelValue, warnings: &mut Vec<String>) -> DcfOutput {
    let tv_pct = if value.enterprise_value.is_zero() {
        Decimal::ZERO
    } else {
        value.pv_of_terminal / value.enterprise_value
    };
    if tv_pct > TV_CONCENTRATION_WARNING {
        warnings.push(format!(
            "Terminal value represents {:.1}% of enterprise value; consider extending the explicit forecast period",
            tv_pct * dec!(100)
        ));
    }

    let fcf_path: Vec<Money> = value.projections.iter().map(|p| p.fcf).collect();
    let terminal_revenue = value
        .projections
        .last()
        .map(|p| p.revenue)
        .unwrap_or_default();

    if fcf_path.last().is_some_and(|fcf| *fcf < Decimal::ZERO) {
        warnings.push(
            "Final-year FCF is negative; the terminal value capitalises a perpetual loss".into(),
        );
    }
    if value.enterprise_value < Decimal::ZERO {
        warnings.push("Enterprise value is negative".into());
    }

    DcfOutput {
        fcf_path,
        terminal_revenue,
        pv_of_fcf: value.pv_of_fcf,
        terminal_value: value.terminal_value,
        pv_of_terminal: value.pv_of_terminal,
        enterprise_value: value.enterprise_value,
        terminal_value_pct: tv_pct,
        fair_value_per_share: round_2dp(value.per_share),
        projections: value.projections,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_inputs() -> ValuationInputs {
        ValuationInputs {
            revenue_growth: RateSchedule::Scalar(dec!(0.10)),
            fcf_margin: RateSchedule::Scalar(dec!(0.20)),
            years: 5,
            latest_revenue: dec!(1000000),
            discount_rate: dec!(0.10),
            terminal_growth_rate: dec!(0.025),
            total_shares: dec!(100000),
            current_price: Some(dec!(50)),
        }
    }

    #[test]
    fn test_golden_scenario() {
        // Growth equals the discount rate, so every year's PV is 200,000:
        // PV(FCF) = 1,000,000; PV(TV) = 200,000 * 1.025 / 0.075 = 2,733,333.33
        // EV / 100,000 shares = 37.33
        let result = forward_dcf(&sample_inputs()).unwrap();
        let out = &result.result;

        assert_eq!(out.fair_value_per_share, dec!(37.33));
        assert_eq!(out.pv_of_fcf, dec!(1000000));
        assert!((out.pv_of_terminal - dec!(2733333.33)).abs() < dec!(0.01));
        assert_eq!(out.projections.len(), 5);
    }

    #[test]
    fn test_year_one_projection() {
        let result = forward_dcf(&sample_inputs()).unwrap();
        let y1 = &result.result.projections[0];

        assert_eq!(y1.year, 1);
        assert_eq!(y1.revenue, dec!(1100000));
        assert_eq!(y1.fcf, dec!(220000));
        assert_eq!(y1.discount_factor, dec!(1.1));
        assert_eq!(y1.pv_fcf, dec!(200000));
    }

    #[test]
    fn test_fcf_path_and_terminal_revenue() {
        let result = forward_dcf(&sample_inputs()).unwrap();
        let out = &result.result;

        assert_eq!(
            out.fcf_path,
            vec![
                dec!(220000),
                dec!(242000),
                dec!(266200),
                dec!(292820),
                dec!(322102),
            ]
        );
        assert_eq!(out.terminal_revenue, dec!(1610510));
    }

    #[test]
    fn test_scalar_matches_per_year() {
        let scalar = forward_dcf(&sample_inputs()).unwrap();

        let mut inputs = sample_inputs();
        inputs.revenue_growth = RateSchedule::PerYear(vec![dec!(0.10); 5]);
        inputs.fcf_margin = RateSchedule::PerYear(vec![dec!(0.20); 5]);
        let per_year = forward_dcf(&inputs).unwrap();

        assert_eq!(
            scalar.result.enterprise_value,
            per_year.result.enterprise_value
        );
        assert_eq!(
            scalar.result.fair_value_per_share,
            per_year.result.fair_value_per_share
        );
    }

    #[test]
    fn test_per_year_schedule_used_in_order() {
        let mut inputs = sample_inputs();
        inputs.years = 2;
        inputs.revenue_growth = RateSchedule::PerYear(vec![dec!(0.50), dec!(0)]);
        inputs.fcf_margin = RateSchedule::PerYear(vec![dec!(0.10), dec!(0.30)]);

        let result = forward_dcf(&inputs).unwrap();
        let out = &result.result;
        assert_eq!(out.fcf_path, vec![dec!(150000), dec!(450000)]);
    }

    #[test]
    fn test_terminal_singularity_rejected() {
        let mut inputs = sample_inputs();
        inputs.terminal_growth_rate = dec!(0.10);

        let err = forward_dcf(&inputs).unwrap_err();
        assert!(matches!(err, ValuationError::TerminalValueUndefined { .. }));
        assert!(err.is_domain_error());
    }

    #[test]
    fn test_terminal_growth_above_discount_rate_rejected() {
        let mut inputs = sample_inputs();
        inputs.terminal_growth_rate = dec!(0.12);

        let err = forward_dcf(&inputs).unwrap_err();
        assert!(matches!(err, ValuationError::TerminalValueUndefined { .. }));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut inputs = sample_inputs();
        inputs.revenue_growth = RateSchedule::PerYear(vec![dec!(0.10); 4]);

        let err = forward_dcf(&inputs).unwrap_err();
        assert!(matches!(err, ValuationError::LengthMismatch { .. }));
    }

    #[test]
    fn test_non_positive_shares_rejected() {
        let mut inputs = sample_inputs();
        inputs.total_shares = Decimal::ZERO;
        assert!(forward_dcf(&inputs).is_err());
    }

    #[test]
    fn test_zero_years_rejected() {
        let mut inputs = sample_inputs();
        inputs.years = 0;
        assert!(forward_dcf(&inputs).is_err());
    }

    #[test]
    fn test_non_positive_revenue_rejected() {
        let mut inputs = sample_inputs();
        inputs.latest_revenue = dec!(-100);
        assert!(forward_dcf(&inputs).is_err());
    }

    #[test]
    fn test_tv_concentration_warning() {
        let result = forward_dcf(&sample_inputs()).unwrap();
        // PV(TV) / EV = 2.73m / 3.73m ≈ 73%, just under the threshold
        assert!(result.warnings.is_empty());

        let mut inputs = sample_inputs();
        inputs.terminal_growth_rate = dec!(0.05);
        let result = forward_dcf(&inputs).unwrap();
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("Terminal value represents")));
    }

    #[test]
    fn test_negative_terminal_fcf_warning() {
        let mut inputs = sample_inputs();
        inputs.fcf_margin = RateSchedule::Scalar(dec!(-0.05));

        let result = forward_dcf(&inputs).unwrap();
        assert!(result.result.fair_value_per_share < Decimal::ZERO);
        assert!(result.warnings.iter().any(|w| w.contains("negative")));
    }

    #[test]
    fn test_methodology() {
        let result = forward_dcf(&sample_inputs()).unwrap();
        assert_eq!(
            result.methodology,
            "Perpetuity-growth FCF DCF (end-of-year discounting)"
        );
    }
}

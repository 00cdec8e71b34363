use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{ErrorKind, ValuationError};
use crate::solver::SolverConfig;
use crate::time_value::round_2dp;
use crate::types::{with_metadata, ComputationOutput, Money, Percent};
use crate::ValuationResult;

use super::dcf::{build_output, DcfModel, DcfOutput, ValuationInputs};
use super::metrics::{cagr, upside_downside};
use super::reverse::{solve_axis, validate_target, ReverseDcfOutput, SolveAxis};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to a full valuation: the DCF assumptions plus optional solver
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueCompanyInput {
    #[serde(flatten)]
    pub inputs: ValuationInputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverConfig>,
}

/// Forward value, the three reverse solves and the derived percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationReport {
    /// Fair value per share, rounded to 2dp
    pub fair_value_per_share: Money,
    pub current_price: Money,
    /// (fair value - price) / price, in percent
    pub upside_downside: Percent,
    /// Uniform growth that justifies the current price, in percent. `None`
    /// when no growth rate in the search interval reproduces the price.
    pub required_revenue_growth: Option<Percent>,
    /// Discount rate (annualised return) implied by the current price, in percent
    pub required_discount_rate: Option<Percent>,
    /// Uniform FCF margin that justifies the current price, in percent
    pub required_fcf_margin: Option<Percent>,
    /// CAGR of the assumed growth path, in percent
    pub assumed_cagr: Percent,
    /// Mean of the assumed FCF margin schedule, in percent
    pub assumed_fcf_margin: Percent,
    /// Assumed discount rate, in percent
    pub assumed_discount_rate: Percent,
    /// Assumed terminal growth rate, in percent
    pub terminal_growth_rate: Percent,
    pub years: u32,
    /// Revenue in the final projection year
    pub terminal_revenue: Money,
    pub forward: DcfOutput,
    pub reverse: Vec<ReverseDcfOutput>,
}

/// One row per valuation run, in the column order of the batch export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRecord {
    pub label: String,
    pub fair_value: Money,
    pub current_price: Money,
    pub upside_downside: Percent,
    pub assumed_revenue_growth: Percent,
    pub assumed_fcf_margin: Percent,
    pub required_revenue_growth: Option<Percent>,
    pub required_fcf_margin: Option<Percent>,
    pub required_return: Option<Percent>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Full valuation: forward DCF, reverse solves for growth, margin and
/// discount rate against `inputs.current_price`, CAGR and upside.
///
/// A reverse solve that cannot reproduce the price leaves its required rate
/// as `None` and adds a warning; the forward value is still reported. Input
/// errors fail the whole valuation.
pub fn value_company(
    input: &ValueCompanyInput,
) -> ValuationResult<ComputationOutput<ValuationReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let inputs = &input.inputs;

    let current_price = inputs.current_price.ok_or_else(|| {
        ValuationError::invalid("current_price", "Required for the reverse solves")
    })?;
    validate_target(current_price)?;

    let config = input.solver.clone().unwrap_or_default();
    config.validate()?;

    let model = DcfModel::from_inputs(inputs)?;
    model.check_discount_rate()?;

    let forward = build_output(model.value()?, &mut warnings);

    let mut reverse = Vec::with_capacity(SolveAxis::ALL.len());
    for axis in SolveAxis::ALL {
        match solve_axis(axis, &model, current_price, &config, &mut warnings) {
            Ok(solved) => reverse.push(solved),
            Err(e) if e.kind() == ErrorKind::Convergence => {
                warnings.push(format!(
                    "No {axis} in the search interval reproduces the current price of {current_price}"
                ));
            }
            Err(e) => return Err(e),
        }
    }
    let required = |axis: SolveAxis| {
        reverse
            .iter()
            .find(|r| r.axis == axis)
            .map(|r| r.solved_pct)
    };

    let assumed_fcf_margin = inputs
        .fcf_margin
        .average()
        .map(|m| round_2dp(m * dec!(100)))
        .unwrap_or_default();

    let report = ValuationReport {
        fair_value_per_share: forward.fair_value_per_share,
        current_price: round_2dp(current_price),
        upside_downside: upside_downside(forward.fair_value_per_share, current_price)?,
        required_revenue_growth: required(SolveAxis::RevenueGrowth),
        required_discount_rate: required(SolveAxis::DiscountRate),
        required_fcf_margin: required(SolveAxis::FcfMargin),
        assumed_cagr: cagr(&inputs.revenue_growth, inputs.years)?,
        assumed_fcf_margin,
        assumed_discount_rate: round_2dp(inputs.discount_rate * dec!(100)),
        terminal_growth_rate: round_2dp(inputs.terminal_growth_rate * dec!(100)),
        years: inputs.years,
        terminal_revenue: forward.terminal_revenue,
        forward,
        reverse,
    };

    tracing::debug!(
        fair_value = %report.fair_value_per_share,
        upside = %report.upside_downside,
        "valuation complete"
    );

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Forward DCF with reverse solves for growth, FCF margin and discount rate",
        input,
        warnings,
        elapsed,
        report,
    ))
}

impl ValuationReport {
    /// Plain-language explanation of the valuation.
    pub fn narrative(&self, label: &str) -> Vec<String> {
        vec![
            format!(
                "Over the next {} years, assuming {}% average annual revenue growth, \
                 a {}% free cash flow margin and {}% terminal growth,",
                self.years, self.assumed_cagr, self.assumed_fcf_margin, self.terminal_growth_rate
            ),
            format!(
                "the fair value of {label} is {} per share for a {}% annualized return.",
                self.fair_value_per_share, self.assumed_discount_rate
            ),
            format!(
                "Against the current price of {}, the upside/downside is {}%.",
                self.current_price, self.upside_downside
            ),
            format!("To justify the current price, {label} would need to either:"),
            format!(
                "  grow revenue at {} a year for {} years,",
                describe(self.required_revenue_growth),
                self.years
            ),
            format!(
                "  or run a {} free cash flow margin,",
                describe(self.required_fcf_margin)
            ),
            format!(
                "  or leave a {} annualized return instead of {}%.",
                describe(self.required_discount_rate),
                self.assumed_discount_rate
            ),
        ]
    }

    pub fn record(&self, label: &str) -> ValuationRecord {
        ValuationRecord {
            label: label.to_string(),
            fair_value: self.fair_value_per_share,
            current_price: self.current_price,
            upside_downside: self.upside_downside,
            assumed_revenue_growth: self.assumed_cagr,
            assumed_fcf_margin: self.assumed_fcf_margin,
            required_revenue_growth: self.required_revenue_growth,
            required_fcf_margin: self.required_fcf_margin,
            required_return: self.required_discount_rate,
        }
    }
}

fn describe(required: Option<Percent>) -> String {
    match required {
        Some(pct) => format!("{pct}%"),
        None => "n/a (no solution in range)".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

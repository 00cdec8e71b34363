use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::error::ValuationError;
use crate::solver::{golden_section_minimize, Interval, SolverConfig};
use crate::time_value::round_2dp;
use crate::types::{with_metadata, ComputationOutput, Money, Percent, Rate};
use crate::ValuationResult;

use super::dcf::{DcfModel, ValuationInputs};

/// Distance from a search bound at which a solution is reported as pinned.
const BOUND_PROXIMITY: Decimal = dec!(0.000001);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The assumption solved for. Growth and margin are applied uniformly across
/// every projection year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveAxis {
    RevenueGrowth,
    FcfMargin,
    DiscountRate,
}

impl SolveAxis {
    pub const ALL: [SolveAxis; 3] = [
        SolveAxis::RevenueGrowth,
        SolveAxis::FcfMargin,
        SolveAxis::DiscountRate,
    ];

    fn solver_name(self) -> &'static str {
        match self {
            SolveAxis::RevenueGrowth => "reverse_dcf_revenue_growth",
            SolveAxis::FcfMargin => "reverse_dcf_fcf_margin",
            SolveAxis::DiscountRate => "reverse_dcf_discount_rate",
        }
    }
}

impl fmt::Display for SolveAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveAxis::RevenueGrowth => "revenue growth",
            SolveAxis::FcfMargin => "FCF margin",
            SolveAxis::DiscountRate => "discount rate",
        };
        f.write_str(s)
    }
}

/// Output of a single reverse solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseDcfOutput {
    pub axis: SolveAxis,
    /// Solved value as a rate (0.085 = 8.5%), ready to feed back into a DCF
    pub solved_rate: Rate,
    /// Solved value as a percentage, rounded to 2dp
    pub solved_pct: Percent,
    /// Price the solve targeted
    pub target_price: Money,
    /// Fair value per share at the solved rate, rounded to 2dp
    pub implied_fair_value: Money,
    /// `|implied - target|` before rounding
    pub residual: Money,
    pub iterations: u32,
    pub search_interval: Interval,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Find the uniform growth rate, uniform FCF margin or discount rate at
/// which the forward DCF reproduces `current_price`, all other inputs held
/// fixed. `inputs.current_price` is ignored in favour of the argument.
pub fn reverse_dcf(
    axis: SolveAxis,
    inputs: &ValuationInputs,
    current_price: Money,
    config: &SolverConfig,
) -> ValuationResult<ComputationOutput<ReverseDcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_target(current_price)?;
    config.validate()?;
    let model = DcfModel::from_inputs(inputs)?;

    let output = solve_axis(axis, &model, current_price, config, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Reverse DCF (golden-section search on |fair value - price|)",
        inputs,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

pub(crate) fn validate_target(current_price: Money) -> ValuationResult<()> {
    if current_price <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "current_price",
            "Current price must be positive",
        ));
    }
    Ok(())
}

/// Solve one axis against an already validated model.
pub(crate) fn solve_axis(
    axis: SolveAxis,
    model: &DcfModel,
    target_price: Money,
    config: &SolverConfig,
    warnings: &mut Vec<String>,
) -> ValuationResult<ReverseDcfOutput> {
    if axis != SolveAxis::DiscountRate {
        model.check_discount_rate()?;
    }

    let interval = search_interval(axis, model, config)?;
    let objective = |x: Decimal| -> ValuationResult<Decimal> {
        let value = substitute(model, axis, x).per_share_value()?;
        Ok((value - target_price).abs())
    };

    let minimum = golden_section_minimize(axis.solver_name(), objective, interval, config)?;

    if minimum.value > config.residual_tolerance * target_price {
        tracing::warn!(
            %axis,
            best = %minimum.x,
            residual = %minimum.value,
            "no value in the search interval reproduces the price"
        );
        return Err(ValuationError::ConvergenceFailure {
            function: axis.solver_name().into(),
            iterations: minimum.iterations,
            last_delta: minimum.value,
        });
    }

    if interval.touches_bound(minimum.x, BOUND_PROXIMITY) {
        warnings.push(format!(
            "Solved {axis} ({}) sits on the edge of the search interval [{}, {}]",
            minimum.x, interval.lower, interval.upper
        ));
    }

    let implied = substitute(model, axis, minimum.x).per_share_value()?;
    tracing::debug!(%axis, solved = %minimum.x, %implied, iterations = minimum.iterations, "reverse solve converged");

    Ok(ReverseDcfOutput {
        axis,
        solved_rate: minimum.x,
        solved_pct: round_2dp(minimum.x * dec!(100)),
        target_price,
        implied_fair_value: round_2dp(implied),
        residual: minimum.value,
        iterations: minimum.iterations,
        search_interval: interval,
    })
}

fn search_interval(
    axis: SolveAxis,
    model: &DcfModel,
    config: &SolverConfig,
) -> ValuationResult<Interval> {
    let bounds = &config.bounds;
    match axis {
        SolveAxis::RevenueGrowth => Ok(bounds.revenue_growth),
        SolveAxis::FcfMargin => Ok(bounds.fcf_margin),
        SolveAxis::DiscountRate => {
            // Staying above terminal growth keeps the Gordon denominator positive
            let lower = model.terminal_growth_rate + bounds.discount_rate_floor_spread;
            if lower >= bounds.discount_rate_ceiling {
                return Err(ValuationError::invalid(
                    "bounds.discount_rate_ceiling",
                    format!(
                        "Ceiling ({}) must exceed terminal growth plus floor spread ({lower})",
                        bounds.discount_rate_ceiling
                    ),
                ));
            }
            Ok(Interval::new(lower, bounds.discount_rate_ceiling))
        }
    }
}

fn substitute(model: &DcfModel, axis: SolveAxis, x: Decimal) -> DcfModel {
    let mut candidate = model.clone();
    let years = model.years() as usize;
    match axis {
        SolveAxis::RevenueGrowth => candidate.growth = vec![x; years],
        SolveAxis::FcfMargin => candidate.margins = vec![x; years],
        SolveAxis::DiscountRate => candidate.discount_rate = x,
    }
    candidate
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::RateSchedule;
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
            current_price: None,
        }
    }

    fn solve(axis: SolveAxis, price: Money) -> ValuationResult<ReverseDcfOutput> {
        reverse_dcf(axis, &sample_inputs(), price, &SolverConfig::default()).map(|o| o.result)
    }

    #[test]
    fn test_discount_rate_round_trip() {
        // Forward value of the sample is 37.33
        let out = solve(SolveAxis::DiscountRate, dec!(37.33)).unwrap();
        assert!(
            (out.solved_pct - dec!(10)).abs() <= dec!(0.05),
            "expected ~10%, got {}",
            out.solved_pct
        );
        assert_eq!(out.implied_fair_value, dec!(37.33));
    }

    #[test]
    fn test_growth_round_trip() {
        let out = solve(SolveAxis::RevenueGrowth, dec!(37.33)).unwrap();
        assert!(
            (out.solved_pct - dec!(10)).abs() <= dec!(0.05),
            "expected ~10%, got {}",
            out.solved_pct
        );
    }

    #[test]
    fn test_margin_round_trip() {
        // Value is linear in margin: 0.20 * 37.33 / 37.3333 = 0.19998
        let out = solve(SolveAxis::FcfMargin, dec!(37.33)).unwrap();
        assert_eq!(out.solved_pct, dec!(20.00));
    }

    #[test]
    fn test_higher_price_needs_more_growth_and_lower_return() {
        let growth = solve(SolveAxis::RevenueGrowth, dec!(50)).unwrap();
        let margin = solve(SolveAxis::FcfMargin, dec!(50)).unwrap();
        let rate = solve(SolveAxis::DiscountRate, dec!(50)).unwrap();

        assert!(growth.solved_rate > dec!(0.10));
        assert!(margin.solved_rate > dec!(0.20));
        assert!(rate.solved_rate < dec!(0.10));
        assert!(rate.solved_rate > dec!(0.025));
        assert!(growth.residual <= dec!(0.005));
    }

    #[test]
    fn test_rate_and_percentage_agree() {
        let out = solve(SolveAxis::FcfMargin, dec!(50)).unwrap();
        assert_eq!(out.solved_pct, round_2dp(out.solved_rate * dec!(100)));
    }

    #[test]
    fn test_discount_solve_stays_above_terminal_growth() {
        // An extreme price pushes the solution towards the singularity
        let out = solve(SolveAxis::DiscountRate, dec!(5000)).unwrap();
        assert!(out.solved_rate > dec!(0.025));
        assert!(out.search_interval.lower > dec!(0.025));
    }

    #[test]
    fn test_unreachable_price_fails_to_converge() {
        // Margin would have to be ~2,700% which is outside the search domain
        let err = solve(SolveAxis::FcfMargin, dec!(500000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Convergence);
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let err = solve(SolveAxis::RevenueGrowth, Decimal::ZERO).unwrap_err();
        assert!(err.is_domain_error());
        assert!(solve(SolveAxis::DiscountRate, dec!(-1)).is_err());
    }

    #[test]
    fn test_discount_solve_ignores_fixed_rate() {
        // The fixed discount rate is replaced, so a rate below terminal growth
        // does not block the discount-rate solve
        let mut inputs = sample_inputs();
        inputs.discount_rate = dec!(0.01);
        let out = reverse_dcf(
            SolveAxis::DiscountRate,
            &inputs,
            dec!(37.33),
            &SolverConfig::default(),
        )
        .unwrap();
        assert!((out.result.solved_pct - dec!(10)).abs() <= dec!(0.05));

        let err = reverse_dcf(
            SolveAxis::RevenueGrowth,
            &inputs,
            dec!(37.33),
            &SolverConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ValuationError::TerminalValueUndefined { .. }));
    }

    #[test]
    fn test_axis_serde_names() {
        let json = serde_json::to_string(&SolveAxis::DiscountRate).unwrap();
        assert_eq!(json, "\"discount_rate\"");
        let axis: SolveAxis = serde_json::from_str("\"fcf_margin\"").unwrap();
        assert_eq!(axis, SolveAxis::FcfMargin);
    }
}

//! Derivative-free scalar minimisation.
//!
//! Golden-section search over a closed interval, carried out entirely in
//! `Decimal`. The objective is evaluated fallibly: points where it errors
//! (overflow, undefined terminal value) are treated as arbitrarily bad so
//! the bracket moves away from them.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::Rate;
use crate::ValuationResult;

/// 1 / golden ratio.
const INV_PHI: Decimal = dec!(0.6180339887498948482045868344);

const DEFAULT_MAX_ITERATIONS: u32 = 200;
const DEFAULT_X_TOLERANCE: Decimal = dec!(0.000000000001);
const DEFAULT_RESIDUAL_TOLERANCE: Decimal = dec!(0.0001);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Closed search interval for one reverse-solve axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: Decimal,
    pub upper: Decimal,
}

impl Interval {
    pub fn new(lower: Decimal, upper: Decimal) -> Self {
        Self { lower, upper }
    }

    /// True when `x` sits within `tolerance` of either end.
    pub fn touches_bound(&self, x: Decimal, tolerance: Decimal) -> bool {
        (x - self.lower).abs() <= tolerance || (self.upper - x).abs() <= tolerance
    }
}

/// Search domains for the reverse solves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchBounds {
    /// Uniform revenue growth rate.
    pub revenue_growth: Interval,
    /// Uniform FCF margin.
    pub fcf_margin: Interval,
    /// Offset added to the terminal growth rate to form the lowest
    /// discount rate searched. Must be positive.
    pub discount_rate_floor_spread: Rate,
    /// Highest discount rate searched.
    pub discount_rate_ceiling: Rate,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            revenue_growth: Interval::new(dec!(-0.99), dec!(5.0)),
            fcf_margin: Interval::new(dec!(-1.0), dec!(5.0)),
            discount_rate_floor_spread: dec!(0.0001),
            discount_rate_ceiling: dec!(2.0),
        }
    }
}

/// Tuning knobs for the reverse solves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Iteration budget for the golden-section search.
    pub max_iterations: u32,
    /// Bracket width at which the search stops.
    pub x_tolerance: Decimal,
    /// Largest accepted `|value - target| / target` at the solution.
    pub residual_tolerance: Decimal,
    pub bounds: SearchBounds,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            x_tolerance: DEFAULT_X_TOLERANCE,
            residual_tolerance: DEFAULT_RESIDUAL_TOLERANCE,
            bounds: SearchBounds::default(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> ValuationResult<()> {
        if self.max_iterations == 0 {
            return Err(ValuationError::invalid(
                "max_iterations",
                "Iteration budget must be at least 1",
            ));
        }
        if self.x_tolerance <= Decimal::ZERO {
            return Err(ValuationError::invalid(
                "x_tolerance",
                "Tolerance must be positive",
            ));
        }
        if self.residual_tolerance <= Decimal::ZERO {
            return Err(ValuationError::invalid(
                "residual_tolerance",
                "Tolerance must be positive",
            ));
        }
        for (field, interval) in [
            ("bounds.revenue_growth", self.bounds.revenue_growth),
            ("bounds.fcf_margin", self.bounds.fcf_margin),
        ] {
            if interval.lower >= interval.upper {
                return Err(ValuationError::invalid(
                    field,
                    "Lower bound must be below upper bound",
                ));
            }
        }
        if self.bounds.revenue_growth.lower <= dec!(-1) {
            return Err(ValuationError::invalid(
                "bounds.revenue_growth",
                "Growth cannot fall to -100% or below",
            ));
        }
        if self.bounds.discount_rate_floor_spread <= Decimal::ZERO {
            return Err(ValuationError::invalid(
                "bounds.discount_rate_floor_spread",
                "Spread over terminal growth must be positive",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Minimiser
// ---------------------------------------------------------------------------

/// Result of a golden-section search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: Decimal,
    pub value: Decimal,
    pub iterations: u32,
}

/// Minimise a unimodal `objective` over `interval`.
///
/// Returns the best point evaluated. Fails with `ConvergenceFailure` if the
/// bracket is still wider than `config.x_tolerance` once the iteration
/// budget is spent, or if the objective failed at every point tried.
pub fn golden_section_minimize<F>(
    function: &str,
    mut objective: F,
    interval: Interval,
    config: &SolverConfig,
) -> ValuationResult<Minimum>
where
    F: FnMut(Decimal) -> ValuationResult<Decimal>,
{
    if interval.lower >= interval.upper {
        return Err(ValuationError::invalid(
            function,
            format!(
                "Empty search interval [{}, {}]",
                interval.lower, interval.upper
            ),
        ));
    }

    let mut best = (interval.lower, Decimal::MAX);
    let mut eval = |x: Decimal| {
        let fx = objective(x).unwrap_or(Decimal::MAX);
        if fx < best.1 {
            best = (x, fx);
        }
        fx
    };

    let mut a = interval.lower;
    let mut b = interval.upper;
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = eval(c);
    let mut fd = eval(d);

    let mut iterations = 0;
    while (b - a) > config.x_tolerance {
        if iterations >= config.max_iterations {
            return Err(ValuationError::ConvergenceFailure {
                function: function.into(),
                iterations,
                last_delta: fc.min(fd),
            });
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = eval(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = eval(d);
        }
        iterations += 1;
    }

    let (x, value) = best;
    if value == Decimal::MAX {
        return Err(ValuationError::ConvergenceFailure {
            function: function.into(),
            iterations,
            last_delta: value,
        });
    }
    tracing::debug!(function, %x, %value, iterations, "golden-section search finished");

    Ok(Minimum {
        x,
        value,
        iterations,
    })
}

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

use crate::error::ValuationError;
use crate::time_value::round_2dp;
use crate::types::{Money, Percent, RateSchedule};
use crate::ValuationResult;

/// Constant annual growth rate, in percent, equivalent to a growth path.
///
/// A uniform `Scalar` rate is returned as-is (×100). For a per-year path the
/// compounded multiplier `m = Π(1 + r_i)` is converted back to an annual rate
/// as `sign(m) * 100 * (|m|^(1/years) - 1)`. Taking the root of `|m|` and
/// re-applying the sign keeps the result real when cumulative growth below
/// -100% drives the multiplier negative.
pub fn cagr(growth_path: &RateSchedule, years: u32) -> ValuationResult<Percent> {
    if years == 0 {
        return Err(ValuationError::invalid(
            "years",
            "CAGR needs a horizon of at least one year",
        ));
    }

    let rates = match growth_path {
        RateSchedule::Scalar(rate) => return Ok(round_2dp(*rate * dec!(100))),
        RateSchedule::PerYear(_) => growth_path.normalize("revenue_growth", years)?,
    };

    let multiplier = rates
        .iter()
        .try_fold(Decimal::ONE, |acc, r| acc.checked_mul(Decimal::ONE + *r))
        .ok_or_else(|| ValuationError::overflow("compounded growth multiplier"))?;

    if multiplier.is_zero() {
        return Ok(Decimal::ZERO);
    }

    let root = multiplier
        .abs()
        .checked_powd(Decimal::ONE / Decimal::from(years))
        .ok_or_else(|| ValuationError::overflow("annualised growth root"))?;

    let annual = dec!(100) * (root - Decimal::ONE);
    if multiplier.is_sign_negative() {
        Ok(round_2dp(-annual))
    } else {
        Ok(round_2dp(annual))
    }
}

/// Percentage by which `fair_value` exceeds (positive) or falls short of
/// (negative) `current_price`.
pub fn upside_downside(fair_value: Money, current_price: Money) -> ValuationResult<Percent> {
    if current_price <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "current_price",
            "Current price must be positive",
        ));
    }
    Ok(round_2dp(
        (fair_value - current_price) / current_price * dec!(100),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cagr_scalar_identity() {
        for years in [1, 5, 30] {
            assert_eq!(
                cagr(&RateSchedule::Scalar(dec!(0.0725)), years).unwrap(),
                dec!(7.25)
            );
        }
        assert_eq!(
            cagr(&RateSchedule::Scalar(dec!(-0.031)), 7).unwrap(),
            dec!(-3.10)
        );
    }

    #[test]
    fn test_cagr_uniform_sequence_collapses() {
        let path = RateSchedule::PerYear(vec![dec!(0.1); 3]);
        assert_eq!(cagr(&path, 3).unwrap(), dec!(10.00));
    }

    #[test]
    fn test_cagr_mixed_sequence() {
        // 1.2 * 0.9 = 1.08; sqrt(1.08) - 1 = 3.923%
        let path = RateSchedule::PerYear(vec![dec!(0.2), dec!(-0.1)]);
        assert_eq!(cagr(&path, 2).unwrap(), dec!(3.92));
    }

    #[test]
    fn test_cagr_negative_multiplier_stays_real() {
        // (1 - 1.5) * 1.1 = -0.55; -(sqrt(0.55) - 1) * 100 = 25.84
        let path = RateSchedule::PerYear(vec![dec!(-1.5), dec!(0.1)]);
        assert_eq!(cagr(&path, 2).unwrap(), dec!(25.84));
    }

    #[test]
    fn test_cagr_negative_multiplier_three_years() {
        // (1 - 2) * 1.1 * 1.1 = -1.21; -(1.21^(1/3) - 1) * 100 = -6.56
        let path = RateSchedule::PerYear(vec![dec!(-2.0), dec!(0.1), dec!(0.1)]);
        assert_eq!(cagr(&path, 3).unwrap(), dec!(-6.56));
    }

    #[test]
    fn test_cagr_uniform_decline() {
        let path = RateSchedule::PerYear(vec![dec!(-0.9); 3]);
        assert_eq!(cagr(&path, 3).unwrap(), dec!(-90.00));
    }

    #[test]
    fn test_cagr_uneven_path() {
        // 1.5 * 0.8 * 1.3 * 1.1 * 1.05 = 1.8018; ^(1/5) - 1 = 12.497%
        let path = RateSchedule::PerYear(vec![
            dec!(0.5),
            dec!(-0.2),
            dec!(0.3),
            dec!(0.1),
            dec!(0.05),
        ]);
        assert_eq!(cagr(&path, 5).unwrap(), dec!(12.50));
    }

    #[test]
    fn test_cagr_zero_multiplier() {
        let path = RateSchedule::PerYear(vec![dec!(-1), dec!(0.1)]);
        assert_eq!(cagr(&path, 2).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_cagr_rejects_bad_horizon() {
        assert!(cagr(&RateSchedule::Scalar(dec!(0.1)), 0).is_err());
        let path = RateSchedule::PerYear(vec![dec!(0.1); 2]);
        assert!(matches!(
            cagr(&path, 3),
            Err(ValuationError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_upside() {
        assert_eq!(upside_downside(dec!(120), dec!(100)).unwrap(), dec!(20.00));
    }

    #[test]
    fn test_downside() {
        assert_eq!(upside_downside(dec!(80), dec!(100)).unwrap(), dec!(-20.00));
    }

    #[test]
    fn test_upside_rounding() {
        // 37.33 / 50 - 1 = -25.34%
        assert_eq!(
            upside_downside(dec!(37.33), dec!(50)).unwrap(),
            dec!(-25.34)
        );
    }

    #[test]
    fn test_upside_rejects_non_positive_price() {
        assert!(upside_downside(dec!(10), Decimal::ZERO).is_err());
        assert!(upside_downside(dec!(10), dec!(-5)).is_err());
    }
}

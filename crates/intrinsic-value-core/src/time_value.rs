use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::ValuationResult;

/// Compounding factor `(1 + rate)^period` for an integral period.
pub fn discount_factor(rate: Rate, period: u32) -> ValuationResult<Decimal> {
    if rate <= dec!(-1) {
        return Err(ValuationError::invalid(
            "discount_rate",
            "Discount rate must be greater than -100%",
        ));
    }
    (Decimal::ONE + rate)
        .checked_powi(i64::from(period))
        .ok_or_else(|| ValuationError::overflow(format!("discount factor for period {period}")))
}

/// Present value of `amount` received at the end of `period`.
pub fn present_value(amount: Money, rate: Rate, period: u32) -> ValuationResult<Money> {
    let factor = discount_factor(rate, period)?;
    amount
        .checked_div(factor)
        .ok_or_else(|| ValuationError::DivisionByZero {
            context: format!("present value at period {period}"),
        })
}

/// Gordon growth perpetuity valued at the final projection year:
/// `CF * (1 + g) / (r - g)`.
pub fn gordon_terminal_value(
    final_cash_flow: Money,
    discount_rate: Rate,
    terminal_growth_rate: Rate,
) -> ValuationResult<Money> {
    let spread = discount_rate - terminal_growth_rate;
    if spread <= Decimal::ZERO {
        return Err(ValuationError::TerminalValueUndefined {
            discount_rate,
            terminal_growth_rate,
        });
    }
    final_cash_flow
        .checked_mul(Decimal::ONE + terminal_growth_rate)
        .and_then(|grown| grown.checked_div(spread))
        .ok_or_else(|| ValuationError::overflow("terminal value"))
}

/// Round to cents / hundredths of a percent, half away from zero. The
/// result always carries a scale of 2, so `20` prints as `20.00`.
pub fn round_2dp(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

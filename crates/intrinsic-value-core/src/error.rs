use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Terminal value undefined: discount rate ({discount_rate}) must exceed terminal growth rate ({terminal_growth_rate})")]
    TerminalValueUndefined {
        discount_rate: Decimal,
        terminal_growth_rate: Decimal,
    },

    #[error("Length mismatch: {field} has {actual} entries but the projection covers {expected} years")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Arithmetic overflow in {context}")]
    Overflow { context: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Broad class of a [`ValuationError`], for callers that only need to know
/// whether the inputs were mathematically invalid or the solver gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A mathematical precondition on the inputs does not hold.
    Domain,
    /// A reverse solve could not reproduce the target price.
    Convergence,
    /// Missing or malformed data.
    Data,
}

impl ValuationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValuationError::InvalidInput { .. }
            | ValuationError::TerminalValueUndefined { .. }
            | ValuationError::LengthMismatch { .. }
            | ValuationError::DivisionByZero { .. }
            | ValuationError::Overflow { .. } => ErrorKind::Domain,
            ValuationError::ConvergenceFailure { .. } => ErrorKind::Convergence,
            ValuationError::InsufficientData(_) | ValuationError::SerializationError(_) => {
                ErrorKind::Data
            }
        }
    }

    pub fn is_domain_error(&self) -> bool {
        self.kind() == ErrorKind::Domain
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValuationError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn overflow(context: impl Into<String>) -> Self {
        ValuationError::Overflow {
            context: context.into(),
        }
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::SerializationError(e.to_string())
    }
}

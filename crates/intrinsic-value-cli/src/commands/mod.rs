pub mod history;
pub mod valuation;

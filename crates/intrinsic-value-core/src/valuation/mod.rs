pub mod dcf;
pub mod metrics;
pub mod report;
pub mod reverse;

pub use dcf::{forward_dcf, DcfOutput, DcfYearProjection, ValuationInputs};
pub use metrics::{cagr, upside_downside};
pub use report::{value_company, ValuationRecord, ValuationReport, ValueCompanyInput};
pub use reverse::{reverse_dcf, ReverseDcfOutput, SolveAxis};

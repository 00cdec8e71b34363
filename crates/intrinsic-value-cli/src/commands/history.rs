use clap::Args;
use serde_json::{json, Value};

use intrinsic_value_core::history::{self, format_pct, HistoricalFinancials};

use crate::input;

/// Arguments for trailing growth and margin metrics
#[derive(Args)]
pub struct HistoryArgs {
    /// Path to JSON or YAML file with annual revenue, FCF and share counts
    /// (most recent year first)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_history(args: HistoryArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let financials: HistoricalFinancials = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input file (or piped JSON) is required for history".into());
    };

    let result = history::analyze_history(&financials)?;
    let summary = json!({
        "revenue_growth": result.result.revenue_growth.iter().copied().map(format_pct).collect::<Vec<_>>(),
        "share_change": result.result.share_change.iter().copied().map(format_pct).collect::<Vec<_>>(),
        "fcf_margins": result.result.fcf_margins.iter().copied().map(format_pct).collect::<Vec<_>>(),
    });

    let mut value = serde_json::to_value(&result)?;
    if let Value::Object(ref mut map) = value {
        map.insert("formatted".into(), summary);
    }
    Ok(value)
}

use chrono::Local;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use intrinsic_value_core::valuation::{
    self, SolveAxis, ValuationInputs, ValuationRecord, ValueCompanyInput,
};
use intrinsic_value_core::RateSchedule;

use crate::input;

/// Horizon used when neither `--years` nor a per-year list fixes it.
const DEFAULT_YEARS: u32 = 5;

/// Valuation assumptions shared by `dcf`, `reverse` and `value`
#[derive(Args)]
pub struct ValuationFlags {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Revenue growth: one rate (0.10) or a per-year list (0.12,0.10,0.08)
    #[arg(long, alias = "growth", value_delimiter = ',', allow_hyphen_values = true)]
    pub revenue_growth: Vec<Decimal>,

    /// FCF margin: one rate (0.20) or a per-year list
    #[arg(long, alias = "margin", value_delimiter = ',', allow_hyphen_values = true)]
    pub fcf_margin: Vec<Decimal>,

    /// Projection years (defaults to the per-year list length, else 5)
    #[arg(long)]
    pub years: Option<u32>,

    /// Base-year revenue
    #[arg(long)]
    pub latest_revenue: Option<Decimal>,

    /// Discount rate / required annual return (e.g. 0.10 for 10%)
    #[arg(long, allow_hyphen_values = true)]
    pub discount_rate: Option<Decimal>,

    /// Perpetuity growth after the explicit horizon
    #[arg(long, alias = "terminal-growth", allow_hyphen_values = true)]
    pub terminal_growth_rate: Option<Decimal>,

    /// Shares outstanding
    #[arg(long, alias = "shares")]
    pub total_shares: Option<Decimal>,

    /// Current market price per share (also overrides the input file)
    #[arg(long, alias = "price")]
    pub current_price: Option<Decimal>,
}

/// Arguments for the forward DCF
#[derive(Args)]
pub struct DcfArgs {
    #[command(flatten)]
    pub flags: ValuationFlags,
}

/// Arguments for a single reverse solve
#[derive(Args)]
pub struct ReverseArgs {
    #[command(flatten)]
    pub flags: ValuationFlags,

    /// Assumption to solve for
    #[arg(long, value_enum)]
    pub solve_for: SolveFor,

    /// Iteration budget for the search
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

/// Arguments for the full valuation
#[derive(Args)]
pub struct ValueArgs {
    #[command(flatten)]
    pub flags: ValuationFlags,

    /// Company name or ticker used in the summary
    #[arg(long)]
    pub label: Option<String>,
}

/// Arguments for CAGR of a growth path
#[derive(Args)]
pub struct CagrArgs {
    /// One growth rate or a comma-separated per-year list
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub growth: Vec<Decimal>,

    /// Horizon in years (defaults to the list length)
    #[arg(long)]
    pub years: Option<u32>,
}

/// Arguments for upside/downside
#[derive(Args)]
pub struct UpsideArgs {
    /// Fair value per share
    #[arg(long, allow_hyphen_values = true)]
    pub fair_value: Decimal,

    /// Current market price per share
    #[arg(long, alias = "price")]
    pub current_price: Decimal,
}

/// Arguments for batch valuation
#[derive(Args)]
pub struct BatchArgs {
    /// JSON or YAML file holding a list of labelled valuation inputs
    #[arg(long)]
    pub input: String,

    /// Also write the records to `<out-dir>/<YYYYmmdd-HHMMSS>_<name>.csv`
    #[arg(long)]
    pub out_dir: Option<String>,

    /// Base name of the CSV file
    #[arg(long, default_value = "valuations.csv")]
    pub name: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SolveFor {
    Growth,
    Margin,
    DiscountRate,
}

impl From<SolveFor> for SolveAxis {
    fn from(s: SolveFor) -> Self {
        match s {
            SolveFor::Growth => SolveAxis::RevenueGrowth,
            SolveFor::Margin => SolveAxis::FcfMargin,
            SolveFor::DiscountRate => SolveAxis::DiscountRate,
        }
    }
}

/// One entry of a batch file.
#[derive(Debug, Deserialize)]
struct BatchEntry {
    label: String,
    #[serde(flatten)]
    input: ValueCompanyInput,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn run_dcf(args: DcfArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let loaded = args.flags.load()?;
    let result = valuation::forward_dcf(&loaded.inputs)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_reverse(args: ReverseArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let loaded = args.flags.load()?;
    let current_price = loaded
        .inputs
        .current_price
        .ok_or("--current-price is required (or provide it in --input)")?;

    let mut config = loaded.solver.unwrap_or_default();
    if let Some(n) = args.max_iterations {
        config.max_iterations = n;
    }

    let result =
        valuation::reverse_dcf(args.solve_for.into(), &loaded.inputs, current_price, &config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_value(args: ValueArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let loaded = args.flags.load()?;
    let result = valuation::value_company(&loaded)?;

    let label = args.label.as_deref().unwrap_or("the company");
    let narrative = result.result.narrative(label);

    let mut value = serde_json::to_value(&result)?;
    if let Value::Object(ref mut map) = value {
        map.insert("narrative".into(), json!(narrative));
    }
    Ok(value)
}

pub fn run_cagr(args: CagrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let schedule = to_schedule(&args.growth, "--growth")?;
    let years = args
        .years
        .unwrap_or_else(|| args.growth.len().max(1) as u32);
    let cagr = valuation::cagr(&schedule, years)?;
    Ok(json!({ "cagr": cagr, "years": years }))
}

pub fn run_upside(args: UpsideArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let upside = valuation::upside_downside(args.fair_value, args.current_price)?;
    Ok(json!({
        "upside_downside": upside,
        "fair_value": args.fair_value,
        "current_price": args.current_price,
    }))
}

pub fn run_batch(args: BatchArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let entries: Vec<BatchEntry> = input::file::read_input(&args.input)?;
    if entries.is_empty() {
        return Err(format!("'{}' holds no valuation entries", args.input).into());
    }

    let mut records: Vec<ValuationRecord> = Vec::with_capacity(entries.len());
    let mut failures: Vec<Value> = Vec::new();

    for entry in &entries {
        match valuation::value_company(&entry.input) {
            Ok(output) => records.push(output.result.record(&entry.label)),
            Err(e) => {
                tracing::warn!(label = %entry.label, error = %e, "valuation failed");
                failures.push(json!({ "label": entry.label, "error": e.to_string() }));
            }
        }
    }

    let mut output = json!({ "records": records, "failures": failures });

    if let Some(ref dir) = args.out_dir {
        let path = write_records(Path::new(dir), &args.name, &records)?;
        output["csv_path"] = json!(path);
    }

    Ok(output)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ValuationFlags {
    /// Input file first, then piped stdin, then individual flags.
    fn load(&self) -> Result<ValueCompanyInput, Box<dyn std::error::Error>> {
        let mut loaded: ValueCompanyInput = if let Some(ref path) = self.input {
            input::file::read_input(path)?
        } else if let Some(data) = input::stdin::read_stdin()? {
            serde_json::from_value(data)?
        } else {
            ValueCompanyInput {
                inputs: self.inputs_from_flags()?,
                solver: None,
            }
        };

        if let Some(price) = self.current_price {
            loaded.inputs.current_price = Some(price);
        }
        Ok(loaded)
    }

    fn inputs_from_flags(&self) -> Result<ValuationInputs, Box<dyn std::error::Error>> {
        let revenue_growth = to_schedule(&self.revenue_growth, "--revenue-growth")?;
        let fcf_margin = to_schedule(&self.fcf_margin, "--fcf-margin")?;
        let years = self
            .years
            .unwrap_or_else(|| default_years(&revenue_growth, &fcf_margin));

        Ok(ValuationInputs {
            revenue_growth,
            fcf_margin,
            years,
            latest_revenue: self
                .latest_revenue
                .ok_or("--latest-revenue is required (or provide --input)")?,
            discount_rate: self
                .discount_rate
                .ok_or("--discount-rate is required (or provide --input)")?,
            terminal_growth_rate: self
                .terminal_growth_rate
                .ok_or("--terminal-growth-rate is required (or provide --input)")?,
            total_shares: self
                .total_shares
                .ok_or("--total-shares is required (or provide --input)")?,
            current_price: self.current_price,
        })
    }
}

fn to_schedule(values: &[Decimal], flag: &str) -> Result<RateSchedule, String> {
    match values {
        [] => Err(format!("{flag} is required (or provide --input)")),
        [rate] => Ok(RateSchedule::Scalar(*rate)),
        rates => Ok(RateSchedule::PerYear(rates.to_vec())),
    }
}

fn default_years(growth: &RateSchedule, margin: &RateSchedule) -> u32 {
    [growth, margin]
        .into_iter()
        .find_map(|s| match s {
            RateSchedule::PerYear(rates) => Some(rates.len() as u32),
            RateSchedule::Scalar(_) => None,
        })
        .unwrap_or(DEFAULT_YEARS)
}

fn write_records(
    dir: &Path,
    name: &str,
    records: &[ValuationRecord],
) -> Result<String, Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create '{}': {}", dir.display(), e))?;
    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let path = dir.join(timestamped_name(&stamp, name));

    let mut wtr = csv::Writer::from_path(&path)
        .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;

    tracing::info!(path = %path.display(), rows = records.len(), "batch results written");
    Ok(path.display().to_string())
}

fn timestamped_name(stamp: &str, name: &str) -> String {
    format!("{stamp}_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_single_value_is_scalar() {
        let schedule = to_schedule(&[dec!(0.1)], "--growth").unwrap();
        assert_eq!(schedule, RateSchedule::Scalar(dec!(0.1)));

        let schedule = to_schedule(&[dec!(0.12), dec!(0.1)], "--growth").unwrap();
        assert_eq!(schedule, RateSchedule::PerYear(vec![dec!(0.12), dec!(0.1)]));

        assert!(to_schedule(&[], "--growth").is_err());
    }

    #[test]
    fn test_years_follow_per_year_list() {
        let scalar = RateSchedule::Scalar(dec!(0.2));
        let list = RateSchedule::PerYear(vec![dec!(0.1); 3]);
        assert_eq!(default_years(&list, &scalar), 3);
        assert_eq!(default_years(&scalar, &list), 3);
        assert_eq!(default_years(&scalar, &scalar), DEFAULT_YEARS);
    }

    #[test]
    fn test_timestamped_name() {
        assert_eq!(
            timestamped_name("20240131-093000", "tech.csv"),
            "20240131-093000_tech.csv"
        );
    }

    #[test]
    fn test_batch_entry_deserialises() {
        let json = r#"{
            "label": "ACME",
            "revenue_growth": 0.10,
            "fcf_margin": 0.20,
            "years": 5,
            "latest_revenue": 1000000,
            "discount_rate": 0.10,
            "terminal_growth_rate": 0.025,
            "total_shares": 100000,
            "current_price": 50
        }"#;
        let entry: BatchEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.label, "ACME");

        let report = valuation::value_company(&entry.input).unwrap().result;
        let record = report.record(&entry.label);
        assert_eq!(record.fair_value, dec!(37.33));
    }

    #[test]
    fn test_batch_csv_uses_two_decimals() {
        let entry: BatchEntry = serde_json::from_value(json!({
            "label": "ACME",
            "revenue_growth": 0.10,
            "fcf_margin": 0.2,
            "years": 5,
            "latest_revenue": 1000000,
            "discount_rate": 0.10,
            "terminal_growth_rate": 0.025,
            "total_shares": 100000,
            "current_price": 30
        }))
        .unwrap();
        let report = valuation::value_company(&entry.input).unwrap().result;

        let dir = std::env::temp_dir().join(format!("intrinsic-batch-{}", std::process::id()));
        let path = write_records(&dir, "scale.csv", &[report.record(&entry.label)]).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("label,fair_value,current_price"));
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row[0], "ACME");
        assert_eq!(row[2], "30.00");
        assert_eq!(row[5], "20.00");
    }

}

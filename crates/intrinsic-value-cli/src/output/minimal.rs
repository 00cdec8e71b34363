use serde_json::Value;

/// Headline field of each command's result, in priority order.
const PRIORITY_KEYS: [&str; 7] = [
    "fair_value_per_share",
    "solved_pct",
    "cagr",
    "upside_downside",
    "latest_revenue_growth",
    "records",
    "enterprise_value",
];

/// Print just the key answer value from the output.
///
/// Looks for the headline field of each command first, then falls back to
/// the first field in the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    println!("{}", minimal_line(result_obj));
}

fn minimal_line(result: &Value) -> String {
    if let Value::Object(map) = result {
        for key in PRIORITY_KEYS {
            match map.get(key) {
                Some(Value::Null) | None => continue,
                Some(Value::Array(rows)) => return rows.len().to_string(),
                Some(val) => return format_minimal(val),
            }
        }

        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_minimal(val));
        }
    }

    format_minimal(result)
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fair_value_wins() {
        let result = json!({
            "upside_downside": "-25.34",
            "fair_value_per_share": "37.33",
        });
        assert_eq!(minimal_line(&result), "37.33");
    }

    #[test]
    fn test_batch_prints_row_count() {
        let result = json!({ "records": [{}, {}, {}] });
        assert_eq!(minimal_line(&result), "3");
    }

    #[test]
    fn test_fallback_to_first_field() {
        let result = json!({ "years": 5 });
        assert_eq!(minimal_line(&result), "years: 5");
    }
}

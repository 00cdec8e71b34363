use serde_json::Value;
use std::io;

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    if let Err(e) = write_csv(value, stdout.lock()) {
        tracing::error!(error = %e, "failed to write CSV");
    }
}

/// Write output as CSV to any writer.
///
/// Batch output (`records`) becomes one row per record. Any other result
/// object becomes a two-column field/value listing of its scalar fields.
pub fn write_csv<W: io::Write>(value: &Value, writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result {
        Value::Object(map) => {
            if let Some(Value::Array(records)) = map.get("records") {
                write_rows(&mut wtr, records)?;
            } else {
                wtr.write_record(["field", "value"])?;
                for (key, val) in map {
                    if is_scalar(val) {
                        wtr.write_record([key.as_str(), &format_csv_value(val)])?;
                    }
                }
            }
        }
        Value::Array(rows) => write_rows(&mut wtr, rows)?,
        _ => wtr.write_record([&format_csv_value(result)])?,
    }

    wtr.flush()?;
    Ok(())
}

fn write_rows<W: io::Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) -> csv::Result<()> {
    let Some(Value::Object(first)) = rows.first() else {
        for item in rows {
            wtr.write_record([&format_csv_value(item)])?;
        }
        return Ok(());
    };

    let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
    wtr.write_record(&headers)?;

    for item in rows {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                .collect();
            wtr.write_record(&row)?;
        }
    }
    Ok(())
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(value: &Value) -> String {
        let mut buf = Vec::new();
        write_csv(value, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_records_become_rows() {
        let value = json!({
            "result": {
                "records": [
                    { "label": "ACME", "fair_value": "37.33" },
                    { "label": "INITECH", "fair_value": "12.10" }
                ]
            }
        });
        assert_eq!(
            render(&value),
            "label,fair_value\nACME,37.33\nINITECH,12.10\n"
        );
    }

    #[test]
    fn test_nested_fields_skipped() {
        let value = json!({
            "result": {
                "fair_value_per_share": "37.33",
                "projections": [{ "year": 1 }]
            }
        });
        assert_eq!(render(&value), "field,value\nfair_value_per_share,37.33\n");
    }
}

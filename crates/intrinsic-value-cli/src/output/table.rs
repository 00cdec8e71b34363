use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as tables using the tabled crate.
///
/// Scalar result fields go into a Field/Value table; arrays of objects
/// (projections, reverse solves, batch records) get a table of their own,
/// and nested objects are printed under their own heading.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => {
                print_object("Result", result);
                print_envelope(map);
            }
            _ => print_object("Result", map),
        },
        Value::Array(arr) => print_rows(arr),
        _ => println!("{}", value),
    }
}

fn print_object(heading: &str, map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if is_nested(val) {
            continue;
        }
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", heading);
    println!("{}", Table::from(builder));

    for (key, val) in map {
        match val {
            Value::Object(inner) => {
                println!();
                print_object(key, inner);
            }
            Value::Array(rows) if rows.iter().any(Value::is_object) => {
                println!("\n{}", key);
                print_rows(rows);
            }
            _ => {}
        }
    }
}

fn print_envelope(envelope: &Map<String, Value>) {
    if let Some(Value::Array(lines)) = envelope.get("narrative") {
        println!();
        for line in lines.iter().filter_map(Value::as_str) {
            println!("{}", line);
        }
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_rows(arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        if arr.is_empty() {
            println!("(empty)");
        }
        for item in arr {
            println!("{}", format_value(item));
        }
        return;
    };

    let headers: Vec<String> = first
        .iter()
        .filter(|(_, v)| !is_nested(v))
        .map(|(k, _)| k.clone())
        .collect();
    let mut builder = Builder::default();
    builder.push_record(headers.clone());

    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                .collect();
            builder.push_record(row);
        }
    }

    println!("{}", Table::from(builder));
}

/// Objects and arrays of objects are rendered separately, not inline.
fn is_nested(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_detection() {
        assert!(is_nested(&json!({ "a": 1 })));
        assert!(is_nested(&json!([{ "year": 1 }])));
        assert!(!is_nested(&json!(["0.1", "0.2"])));
        assert!(!is_nested(&json!("37.33")));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!(["0.1", "0.2"])), "0.1, 0.2");
        assert_eq!(format_value(&Value::Null), "-");
        assert_eq!(format_value(&json!(5)), "5");
    }
}

use serde_json::{json, Value};
use stamps_domain::model::{Balance, Cursor};

/// The `{result, next_cursor, result_count, error}` envelope every v2
/// endpoint answers with, normalised so `result` is always a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub result: Vec<Value>,
    pub next_cursor: Option<Cursor>,
    pub result_count: Option<u64>,
    pub error: Option<String>,
}

impl Envelope {
    pub fn parse(value: &Value) -> Self {
        let result = match value.get("result") {
            Some(Value::Array(rows)) => rows.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![single.clone()],
        };
        let next_cursor = value.get("next_cursor").and_then(Cursor::from_json);
        let result_count = value.get("result_count").and_then(Value::as_u64);
        let error = match value.get("error") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        Self {
            result,
            next_cursor,
            result_count,
            error,
        }
    }
}

/// Payload handed back by the cached read path when every node failed.
pub fn degraded_payload(message: &str) -> Value {
    json!({
        "result": [],
        "next_cursor": null,
        "result_count": 0,
        "error": message,
    })
}

/// Pulls a human readable message out of an error body: the JSON `error`
/// field when there is one, the trimmed raw text otherwise.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        match parsed.get("error") {
            Some(Value::String(message)) => return message.clone(),
            Some(Value::Null) | None => {}
            Some(other) => return other.to_string(),
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Reads an integral base-unit quantity. Rows with non-positive or
/// unreadable quantities yield `None`.
fn positive_quantity(value: &Value) -> Option<u64> {
    let quantity = match value {
        Value::Number(number) => {
            if let Some(q) = number.as_u64() {
                Some(q)
            } else if let Some(f) = number.as_f64() {
                (f.is_finite() && f >= 1.0).then_some(f as u64)
            } else {
                None
            }
        }
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    quantity.filter(|q| *q > 0)
}

fn string_field(row: &Value, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Converts one raw balance row into a [`Balance`]. Zero-quantity rows and
/// rows without an asset are dropped.
pub fn normalize_balance_row(default_address: &str, row: &Value) -> Option<Balance> {
    let cpid = string_field(row, "asset")?;
    let quantity = positive_quantity(row.get("quantity")?)?;
    let utxo = string_field(row, "utxo").unwrap_or_default();
    let utxo_address = string_field(row, "utxo_address").unwrap_or_default();
    let address = string_field(row, "address")
        .or_else(|| (!utxo_address.is_empty()).then(|| utxo_address.clone()))
        .unwrap_or_else(|| default_address.to_string());
    let divisible = row
        .get("asset_info")
        .and_then(|info| info.get("divisible"))
        .or_else(|| row.get("divisible"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(Balance {
        address,
        cpid,
        quantity,
        utxo,
        utxo_address,
        divisible,
    })
}

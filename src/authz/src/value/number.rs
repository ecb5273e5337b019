//! Decimal arithmetic over JSON numbers

use bigdecimal::{BigDecimal, ToPrimitive};
use serde_json::{Number, Value};
use std::str::FromStr;

use super::Val;

/// Exact decimal view of a JSON number
pub fn to_decimal(number: &Number) -> Option<BigDecimal> {
    BigDecimal::from_str(&number.to_string()).ok()
}

/// Convert a decimal result back into a JSON value
///
/// Integral results stay integral. Fractional results keep their decimal
/// digits (`serde_json` is built with `arbitrary_precision`).
pub fn decimal_to_val(decimal: BigDecimal) -> Val {
    let decimal = decimal.normalized();
    if decimal.is_integer() {
        if let Some(i) = decimal.to_i64() {
            return Val::of(Value::Number(i.into()));
        }
        if let Some(u) = decimal.to_u64() {
            return Val::of(Value::Number(u.into()));
        }
    }
    if let Ok(exact) = Number::from_str(&decimal.to_plain_string()) {
        return Val::of(Value::Number(exact));
    }
    match decimal.to_f64().and_then(Number::from_f64) {
        Some(n) => Val::of(Value::Number(n)),
        None => Val::error(format!("Number out of range: {decimal}")),
    }
}

/// Structural JSON equality where numbers compare by decimal value
pub fn json_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (to_decimal(a), to_decimal(b)) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equals(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| json_equals(v, other)))
        }
        _ => left == right,
    }
}

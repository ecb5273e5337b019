//! Strict operators over already evaluated operands

use bigdecimal::{BigDecimal, Zero};
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::value::{decimal_to_val, json_equals, Val};

pub(crate) const DIVISION_BY_ZERO: &str = "Division by zero";

const MAX_CACHED_PATTERNS: usize = 1024;

/// Compiled `=~` patterns keyed by source text
fn pattern_cache() -> &'static DashMap<String, Regex> {
    static PATTERNS: OnceLock<DashMap<String, Regex>> = OnceLock::new();
    PATTERNS.get_or_init(DashMap::new)
}

/// Anchored regex for a pattern, compiled once and shared across evaluations
fn compiled_pattern(pattern: &str) -> Result<Regex, Val> {
    let cache = pattern_cache();
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| Val::error(format!("Invalid regular expression: {e}")))?;
    if cache.len() >= MAX_CACHED_PATTERNS {
        cache.clear();
    }
    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

pub(crate) fn type_mismatch(expected: &str, actual: &Val) -> Val {
    Val::error(format!(
        "Type mismatch. Expected {expected}, but got {}",
        actual.type_name()
    ))
}

pub(crate) fn require_boolean(value: &Val) -> Result<bool, Val> {
    if value.is_error() {
        return Err(value.clone());
    }
    value.as_bool().ok_or_else(|| type_mismatch("a boolean", value))
}

fn require_number(value: &Val) -> Result<BigDecimal, Val> {
    if value.is_error() {
        return Err(value.clone());
    }
    value.as_decimal().ok_or_else(|| type_mismatch("a number", value))
}

fn require_text(value: &Val) -> Result<&str, Val> {
    if value.is_error() {
        return Err(value.clone());
    }
    value.as_str().ok_or_else(|| type_mismatch("a string", value))
}

/// Apply a unary operator; errors pass through unchanged
pub fn apply_unary(op: UnaryOperator, operand: &Val) -> Val {
    let result = match op {
        UnaryOperator::Not => require_boolean(operand).map(|b| Val::boolean(!b)),
        UnaryOperator::Negate => require_number(operand).map(|n| decimal_to_val(-n)),
        UnaryOperator::Plus => require_number(operand).map(|_| operand.clone()),
    };
    result
        .unwrap_or_else(|error| error)
        .with_trace(op.symbol(), &[operand])
}

/// Apply a strict binary operator
///
/// The left error wins when both operands are errors. Lazy operators reaching
/// this point are evaluated eagerly.
pub fn apply_binary(op: BinaryOperator, left: &Val, right: &Val) -> Val {
    let result = if left.is_error() {
        left.clone()
    } else if right.is_error() {
        right.clone()
    } else {
        compute(op, left, right).unwrap_or_else(|error| error)
    };
    result.with_trace(op.symbol(), &[left, right])
}

fn compute(op: BinaryOperator, left: &Val, right: &Val) -> Result<Val, Val> {
    Ok(match op {
        BinaryOperator::Add => {
            if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
                return Ok(Val::text(format!("{a}{b}")));
            }
            decimal_to_val(require_number(left)? + require_number(right)?)
        }
        BinaryOperator::Subtract => decimal_to_val(require_number(left)? - require_number(right)?),
        BinaryOperator::Multiply => decimal_to_val(require_number(left)? * require_number(right)?),
        BinaryOperator::Divide => {
            let (dividend, divisor) = (require_number(left)?, require_number(right)?);
            if divisor.is_zero() {
                return Err(Val::error(DIVISION_BY_ZERO));
            }
            decimal_to_val(dividend / divisor)
        }
        BinaryOperator::Modulo => {
            let (dividend, divisor) = (require_number(left)?, require_number(right)?);
            if divisor.is_zero() {
                return Err(Val::error(DIVISION_BY_ZERO));
            }
            decimal_to_val(dividend % divisor)
        }
        BinaryOperator::Less => Val::boolean(require_number(left)? < require_number(right)?),
        BinaryOperator::LessEquals => Val::boolean(require_number(left)? <= require_number(right)?),
        BinaryOperator::Greater => Val::boolean(require_number(left)? > require_number(right)?),
        BinaryOperator::GreaterEquals => Val::boolean(require_number(left)? >= require_number(right)?),
        BinaryOperator::Equals => Val::boolean(values_equal(left, right)),
        BinaryOperator::NotEquals => Val::boolean(!values_equal(left, right)),
        BinaryOperator::Regex => {
            let text = require_text(left)?;
            let pattern = require_text(right)?;
            Val::boolean(compiled_pattern(pattern)?.is_match(text))
        }
        BinaryOperator::ElementOf => match right.get() {
            Some(Value::Array(items)) => Val::boolean(
                left.get()
                    .is_some_and(|needle| items.iter().any(|item| json_equals(needle, item))),
            ),
            _ => return Err(type_mismatch("an array", right)),
        },
        BinaryOperator::LazyAnd | BinaryOperator::EagerAnd => Val::boolean(require_boolean(left)? & require_boolean(right)?),
        BinaryOperator::LazyOr | BinaryOperator::EagerOr => Val::boolean(require_boolean(left)? | require_boolean(right)?),
        BinaryOperator::Xor => Val::boolean(require_boolean(left)? ^ require_boolean(right)?),
    })
}

/// Structural equality where both undefined operands are equal
pub fn values_equal(left: &Val, right: &Val) -> bool {
    match (left.get(), right.get()) {
        (Some(a), Some(b)) => json_equals(a, b),
        (None, None) => left.is_undefined() && right.is_undefined(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn num(n: serde_json::Value) -> Val {
        Val::of(n)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(apply_binary(BinaryOperator::Add, &num(json!(1)), &num(json!(2))), num(json!(3)));
        assert_eq!(
            apply_binary(BinaryOperator::Subtract, &num(json!(1.5)), &num(json!(0.5))),
            num(json!(1))
        );
        assert_eq!(
            apply_binary(BinaryOperator::Multiply, &num(json!(4)), &num(json!(2.5))),
            num(json!(10))
        );
        assert_eq!(
            apply_binary(BinaryOperator::Divide, &num(json!(1)), &num(json!(4))),
            num(json!(0.25))
        );
        assert_eq!(
            apply_binary(BinaryOperator::Modulo, &num(json!(7)), &num(json!(3))),
            num(json!(1))
        );
    }

    #[test]
    fn test_division_by_zero() {
        for dividend in [json!(0), json!(1), json!(-2.5)] {
            let result = apply_binary(BinaryOperator::Divide, &num(dividend), &num(json!(0.0)));
            assert_eq!(result.error_message(), Some(DIVISION_BY_ZERO));
        }
        let result = apply_binary(BinaryOperator::Modulo, &num(json!(3)), &num(json!(0)));
        assert_eq!(result.error_message(), Some(DIVISION_BY_ZERO));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            apply_binary(BinaryOperator::Add, &Val::text("ab"), &Val::text("cd")),
            Val::text("abcd")
        );
        assert!(apply_binary(BinaryOperator::Add, &Val::text("ab"), &num(json!(1))).is_error());
    }

    #[test]
    fn test_errors_propagate_left_first() {
        let left = Val::error("left");
        let right = Val::error("right");
        assert_eq!(apply_binary(BinaryOperator::Add, &left, &right), left);
        assert_eq!(apply_binary(BinaryOperator::Equals, &num(json!(1)), &right), right);
        assert_eq!(apply_binary(BinaryOperator::ElementOf, &left, &num(json!([]))), left);
    }

    #[test]
    fn test_undefined_operands_are_type_errors() {
        let result = apply_binary(BinaryOperator::Less, &Val::undefined(), &num(json!(1)));
        assert_eq!(
            result.error_message(),
            Some("Type mismatch. Expected a number, but got undefined")
        );
        let result = apply_binary(BinaryOperator::EagerAnd, &Val::boolean(true), &Val::undefined());
        assert_eq!(
            result.error_message(),
            Some("Type mismatch. Expected a boolean, but got undefined")
        );
    }

    #[test]
    fn test_equality() {
        assert_eq!(
            apply_binary(BinaryOperator::Equals, &Val::undefined(), &Val::undefined()),
            Val::boolean(true)
        );
        assert_eq!(
            apply_binary(BinaryOperator::Equals, &Val::undefined(), &num(json!(null))),
            Val::boolean(false)
        );
        assert_eq!(
            apply_binary(BinaryOperator::Equals, &num(json!([1.0])), &num(json!([1]))),
            Val::boolean(true)
        );
        assert_eq!(
            apply_binary(BinaryOperator::NotEquals, &Val::text("a"), &Val::text("b")),
            Val::boolean(true)
        );
    }

    #[test]
    fn test_regex_and_membership() {
        assert_eq!(
            apply_binary(BinaryOperator::Regex, &Val::text("alice@example.com"), &Val::text(".*@example\\.com")),
            Val::boolean(true)
        );
        assert_eq!(
            apply_binary(BinaryOperator::Regex, &Val::text("xalice"), &Val::text("alice")),
            Val::boolean(false)
        );
        assert!(apply_binary(BinaryOperator::Regex, &Val::text("a"), &Val::text("(")).is_error());
        assert_eq!(
            apply_binary(BinaryOperator::ElementOf, &num(json!(2)), &num(json!([1, 2.0]))),
            Val::boolean(true)
        );
        assert_eq!(
            apply_binary(BinaryOperator::ElementOf, &Val::undefined(), &num(json!([1]))),
            Val::boolean(false)
        );
        assert!(apply_binary(BinaryOperator::ElementOf, &num(json!(2)), &num(json!({}))).is_error());
    }

    #[test]
    fn test_regex_patterns_compile_once() {
        let pattern = "user-[0-9]+@cache\\.test";
        for text in ["user-1@cache.test", "user-22@cache.test", "admin@cache.test"] {
            apply_binary(BinaryOperator::Regex, &Val::text(text), &Val::text(pattern));
        }
        assert!(pattern_cache().contains_key(pattern));
        assert_eq!(
            apply_binary(BinaryOperator::Regex, &Val::text("user-7@cache.test"), &Val::text(pattern)),
            Val::boolean(true)
        );

        let invalid = "(unclosed-cache-test";
        assert!(apply_binary(BinaryOperator::Regex, &Val::text("a"), &Val::text(invalid)).is_error());
        assert!(!pattern_cache().contains_key(invalid));
    }

    #[test]
    fn test_unary() {
        assert_eq!(apply_unary(UnaryOperator::Not, &Val::boolean(true)), Val::boolean(false));
        assert_eq!(apply_unary(UnaryOperator::Negate, &num(json!(2))), num(json!(-2)));
        assert_eq!(apply_unary(UnaryOperator::Plus, &num(json!(2))), num(json!(2)));
        assert!(apply_unary(UnaryOperator::Negate, &Val::text("x")).is_error());
        assert!(apply_unary(UnaryOperator::Not, &num(json!(1))).is_error());
    }

    #[test]
    fn test_results_carry_trace() {
        let result = apply_binary(BinaryOperator::Add, &num(json!(1)), &num(json!(2)));
        let trace = result.trace().unwrap();
        assert_eq!(trace.operator, "+");
        assert_eq!(trace.arguments, vec![num(json!(1)), num(json!(2))]);
    }
}

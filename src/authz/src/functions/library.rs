//! Built-in `standard` and `filter` functions

use serde_json::Value;

use super::{expect_arity, FunctionError, FunctionRegistry, FunctionResult};
use crate::value::Val;

pub(super) fn register(registry: &FunctionRegistry) {
    registry.register("standard.length", length);
    registry.register("standard.toString", to_string);
    registry.register("standard.append", append);
    registry.register("filter.blacken", blacken);
    registry.register("filter.replace", replace);
}

fn length(arguments: &[Val]) -> FunctionResult {
    expect_arity(arguments, 1)?;
    let size = match arguments[0].get() {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(a)) => a.len(),
        Some(Value::Object(o)) => o.len(),
        _ => {
            return Err(FunctionError::Argument {
                position: 0,
                message: format!(
                    "expected a string, array or object, got {}",
                    arguments[0].type_name()
                ),
            })
        }
    };
    Ok(Val::of(Value::from(size)))
}

fn to_string(arguments: &[Val]) -> FunctionResult {
    expect_arity(arguments, 1)?;
    Ok(Val::text(render(&arguments[0], 0)?))
}

fn append(arguments: &[Val]) -> FunctionResult {
    let mut result = String::new();
    for (position, argument) in arguments.iter().enumerate() {
        result.push_str(&render(argument, position)?);
    }
    Ok(Val::text(result))
}

/// Strings render without quotes, everything else as JSON
fn render(argument: &Val, position: usize) -> Result<String, FunctionError> {
    match argument.get() {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(FunctionError::Argument {
            position,
            message: format!("cannot render {}", argument.type_name()),
        }),
    }
}

/// `blacken(text[, disclose_left[, disclose_right[, replacement]]])`
///
/// Masks the text except for the disclosed characters at either end.
fn blacken(arguments: &[Val]) -> FunctionResult {
    if arguments.is_empty() || arguments.len() > 4 {
        return Err(FunctionError::Arity {
            expected: "1 to 4".to_string(),
            actual: arguments.len(),
        });
    }

    let text = string_argument(arguments, 0)?;
    let disclose_left = count_argument(arguments, 1)?;
    let disclose_right = count_argument(arguments, 2)?;
    let replacement = match arguments.get(3) {
        Some(_) => string_argument(arguments, 3)?,
        None => "X",
    };

    let chars: Vec<char> = text.chars().collect();
    if disclose_left + disclose_right >= chars.len() {
        return Ok(Val::text(text));
    }

    let mut result: String = chars[..disclose_left].iter().collect();
    result.push_str(&replacement.repeat(chars.len() - disclose_left - disclose_right));
    result.extend(&chars[chars.len() - disclose_right..]);
    Ok(Val::text(result))
}

/// `replace(original, replacement)`: swaps in the replacement value
fn replace(arguments: &[Val]) -> FunctionResult {
    expect_arity(arguments, 2)?;
    if arguments[0].is_error() {
        return Ok(arguments[0].clone());
    }
    Ok(arguments[1].clone())
}

fn string_argument(arguments: &[Val], position: usize) -> Result<&str, FunctionError> {
    arguments[position]
        .as_str()
        .ok_or_else(|| FunctionError::Argument {
            position,
            message: format!("expected a string, got {}", arguments[position].type_name()),
        })
}

fn count_argument(arguments: &[Val], position: usize) -> Result<usize, FunctionError> {
    let Some(argument) = arguments.get(position) else {
        return Ok(0);
    };
    argument
        .get()
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| FunctionError::Argument {
            position,
            message: "expected a non-negative integer".to_string(),
        })
}

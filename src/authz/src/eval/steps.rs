//! Path steps
//!
//! Absence is not failure: a key step on anything that has no such key yields
//! undefined. Index-like steps on a non-array, and direct index steps out of
//! bounds, are errors. Recursive steps collect whatever they find, so a
//! recursive index that matches nothing yields an empty array.

use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::operators::type_mismatch;
use super::{evaluate, evaluate_all, first_error};
use crate::ast::{Expression, Step};
use crate::context::EvaluationContext;
use crate::stream::{combine_latest, just, LatestStreamExt, ValStream};
use crate::value::Val;

pub(crate) const ATTRIBUTE_IN_TARGET: &str =
    "Attribute finders are not allowed in target expressions";

pub(super) fn evaluate_path(
    base: &Expression,
    steps: Arc<[Step]>,
    ctx: &EvaluationContext,
) -> ValStream {
    let mut values = evaluate(base, ctx);
    for position in 0..steps.len() {
        let steps = steps.clone();
        let ctx = ctx.clone();
        values = values
            .switch_map(move |parent| apply_step(&steps[position], parent, &ctx))
            .boxed();
    }
    values.distinct_until_changed().boxed()
}

fn apply_step(step: &Step, parent: Val, ctx: &EvaluationContext) -> ValStream {
    if parent.is_error() {
        return just(parent);
    }
    match step {
        Step::Expression(expression) => expression_step(expression, parent, ctx),
        Step::Condition(condition) => condition_step(condition, parent, ctx),
        Step::Attribute {
            name,
            arguments,
            head,
        } => attribute_finder(parent, name, arguments, *head, ctx),
        _ => just(apply_pure_step(step, &parent)),
    }
}

/// Steps that need no evaluation of their own
pub(crate) fn apply_pure_step(step: &Step, parent: &Val) -> Val {
    if parent.is_error() {
        return parent.clone();
    }
    match step {
        Step::Key(key) => key_step(parent, key),
        Step::Index(index) => index_step(parent, *index),
        Step::Slice { from, to, step } => match parent.get() {
            Some(Value::Array(items)) => match slice_indices(items.len(), *from, *to, *step) {
                Ok(indices) => Val::of(Value::Array(
                    indices.into_iter().map(|i| items[i].clone()).collect(),
                )),
                Err(error) => error,
            },
            _ => type_mismatch("an array", parent),
        },
        Step::Wildcard => match parent.get() {
            Some(Value::Array(items)) => Val::of(Value::Array(items.clone())),
            Some(Value::Object(map)) => Val::of(Value::Array(map.values().cloned().collect())),
            _ => type_mismatch("an object or array", parent),
        },
        Step::RecursiveKey(key) => match parent.get() {
            Some(value) => {
                let mut found = Vec::new();
                collect_key(value, key, &mut found);
                Val::of(Value::Array(found))
            }
            None => Val::undefined(),
        },
        Step::RecursiveIndex(index) => match parent.get() {
            Some(value) => {
                let mut found = Vec::new();
                collect_index(value, *index, &mut found);
                Val::of(Value::Array(found))
            }
            None => Val::undefined(),
        },
        Step::RecursiveWildcard => match parent.get() {
            Some(value) => {
                let mut found = Vec::new();
                collect_all(value, &mut found);
                Val::of(Value::Array(found))
            }
            None => Val::undefined(),
        },
        Step::IndexUnion(indices) => match parent.get() {
            Some(Value::Array(items)) => {
                let selected: BTreeSet<usize> = indices
                    .iter()
                    .filter_map(|i| normalize_index(*i, items.len()))
                    .collect();
                Val::of(Value::Array(
                    selected.into_iter().map(|i| items[i].clone()).collect(),
                ))
            }
            _ => type_mismatch("an array", parent),
        },
        Step::KeyUnion(keys) => match parent.get() {
            Some(Value::Object(map)) => Val::of(Value::Array(
                keys.iter().filter_map(|k| map.get(k).cloned()).collect(),
            )),
            _ => type_mismatch("an object", parent),
        },
        Step::Expression(_) | Step::Condition(_) | Step::Attribute { .. } => {
            Val::error(format!("Step {step} requires evaluation"))
        }
    }
}

/// Key lookup; arrays project the key over their object elements
fn key_step(parent: &Val, key: &str) -> Val {
    match parent.get() {
        Some(Value::Object(map)) => map
            .get(key)
            .map(|v| Val::of(v.clone()))
            .unwrap_or_else(Val::undefined),
        Some(Value::Array(items)) => Val::of(Value::Array(
            items
                .iter()
                .filter_map(|item| item.as_object().and_then(|o| o.get(key)).cloned())
                .collect(),
        )),
        _ => Val::undefined(),
    }
}

fn index_step(parent: &Val, index: i64) -> Val {
    match parent.get() {
        Some(Value::Array(items)) => match normalize_index(index, items.len()) {
            Some(i) => Val::of(items[i].clone()),
            None => index_out_of_bounds(index, items.len()),
        },
        _ => type_mismatch("an array", parent),
    }
}

pub(crate) fn index_out_of_bounds(index: i64, len: usize) -> Val {
    Val::error(format!(
        "Index out of bounds. Index must be between 0 and {len} (exclusive), was: {index}"
    ))
}

/// Resolve a possibly negative index against an array length
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

/// Indices selected by `[from:to:step]`, with negative positions counting from
/// the end
pub(crate) fn slice_indices(
    len: usize,
    from: Option<i64>,
    to: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, Val> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Val::error("Step must not be zero"));
    }
    let len = i64::try_from(len).map_err(|_| Val::error("Array too large to slice"))?;
    let resolve = |position: i64, low: i64, high: i64| {
        let position = if position < 0 { position + len } else { position };
        position.clamp(low, high)
    };

    let mut indices = Vec::new();
    if step > 0 {
        let mut i = from.map_or(0, |f| resolve(f, 0, len));
        let end = to.map_or(len, |t| resolve(t, 0, len));
        while i < end {
            indices.push(i as usize);
            let Some(next) = i.checked_add(step) else {
                break;
            };
            i = next;
        }
    } else {
        let mut i = from.map_or(len - 1, |f| resolve(f, -1, len - 1));
        let end = to.map_or(-1, |t| resolve(t, -1, len - 1));
        while i > end {
            indices.push(i as usize);
            let Some(next) = i.checked_add(step) else {
                break;
            };
            i = next;
        }
    }
    Ok(indices)
}

fn collect_key(value: &Value, key: &str, found: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            if let Some(hit) = map.get(key) {
                found.push(hit.clone());
            }
            map.values().for_each(|child| collect_key(child, key, found));
        }
        Value::Array(items) => items.iter().for_each(|child| collect_key(child, key, found)),
        _ => {}
    }
}

fn collect_index(value: &Value, index: i64, found: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            if let Some(i) = normalize_index(index, items.len()) {
                found.push(items[i].clone());
            }
            items.iter().for_each(|child| collect_index(child, index, found));
        }
        Value::Object(map) => map.values().for_each(|child| collect_index(child, index, found)),
        _ => {}
    }
}

fn collect_all(value: &Value, found: &mut Vec<Value>) {
    let children: Box<dyn Iterator<Item = &Value>> = match value {
        Value::Array(items) => Box::new(items.iter()),
        Value::Object(map) => Box::new(map.values()),
        _ => return,
    };
    for child in children {
        found.push(child.clone());
        collect_all(child, found);
    }
}

/// `[(expr)]`: a computed key or index
fn expression_step(expression: &Expression, parent: Val, ctx: &EvaluationContext) -> ValStream {
    let child_ctx = ctx.clone().with_relative(parent.clone());
    evaluate(expression, &child_ctx)
        .map(move |selector| match selector.get() {
            Some(Value::String(key)) => key_step(&parent, key),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(index) => index_step(&parent, index),
                None => Val::error(format!("Index must be an integer, was: {n}")),
            },
            None if selector.is_error() => selector.clone(),
            _ => type_mismatch("a string or an integer", &selector),
        })
        .boxed()
}

/// `[?(expr)]`: elements (or member values) for which the condition holds
fn condition_step(condition: &Expression, parent: Val, ctx: &EvaluationContext) -> ValStream {
    let elements: Vec<Value> = match parent.get() {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => map.values().cloned().collect(),
        _ => return just(type_mismatch("an object or array", &parent)),
    };

    let checks = elements
        .iter()
        .map(|element| evaluate(condition, &ctx.clone().with_relative(Val::of(element.clone()))))
        .collect();

    combine_latest(checks)
        .map(move |results| {
            let mut kept = Vec::new();
            for (element, result) in elements.iter().zip(&results) {
                if result.is_error() {
                    return result.clone();
                }
                match result.as_bool() {
                    Some(true) => kept.push(element.clone()),
                    Some(false) => {}
                    None => return type_mismatch("a boolean condition result", result),
                }
            }
            Val::of(Value::Array(kept))
        })
        .boxed()
}

/// Subscribe to an attribute source with `subject` as the left-hand value
pub(super) fn attribute_finder(
    subject: Val,
    name: &str,
    arguments: &[Arc<Expression>],
    head: bool,
    ctx: &EvaluationContext,
) -> ValStream {
    if ctx.is_target_mode() {
        return just(Val::error(ATTRIBUTE_IN_TARGET));
    }

    let name = ctx.resolve(name);
    let lookup_ctx = ctx.clone();
    let values = evaluate_all(arguments, ctx)
        .switch_map(move |arguments| {
            if let Some(error) = first_error(&arguments) {
                return just(error.clone());
            }
            lookup_ctx.attributes().evaluate(
                &name,
                subject.clone(),
                arguments,
                lookup_ctx.variables(),
            )
        })
        .boxed();

    if head {
        values.take(1).boxed()
    } else {
        values
    }
}

/// Rebuild an object from `(key, value)` pairs, dropping undefined values
pub(crate) fn object_of(entries: impl IntoIterator<Item = (String, Val)>) -> Result<Val, Val> {
    let mut object = Map::new();
    for (key, value) in entries {
        if value.is_error() {
            return Err(value);
        }
        if let Some(v) = value.get() {
            object.insert(key, v.clone());
        }
    }
    Ok(Val::of(Value::Object(object)))
}

//! Filter and transformation statements
//!
//! Statements are applied in order, each to the output of the previous one.
//! A statement descends through its target path and rebuilds every container
//! it passed through; an action yielding undefined removes the addressed
//! member.

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

use super::operators::{require_boolean, type_mismatch};
use super::steps::{index_out_of_bounds, normalize_index, object_of, slice_indices};
use super::{evaluate, evaluate_all, first_error};
use crate::ast::{Expression, FilterAction, FilterStatement, Step};
use crate::context::EvaluationContext;
use crate::stream::{combine_latest, just, LatestStreamExt, ValStream};
use crate::value::Val;

pub(crate) const FILTER_ON_UNDEFINED: &str = "Filters cannot be applied to undefined values";
const EACH_ON_NON_ARRAY: &str = "Cannot filter non array values with each keyword";

pub(super) fn evaluate_filter(
    base: &Expression,
    statements: Arc<[FilterStatement]>,
    ctx: &EvaluationContext,
) -> ValStream {
    let ctx = ctx.clone();
    evaluate(base, &ctx)
        .switch_map(move |value| apply_filters(value, statements.clone(), &ctx))
        .distinct_until_changed()
        .boxed()
}

/// Apply filter statements to a value, in order
pub fn apply_filters(
    value: Val,
    statements: Arc<[FilterStatement]>,
    ctx: &EvaluationContext,
) -> ValStream {
    if value.is_error() {
        return just(value);
    }
    if value.is_undefined() {
        return just(Val::error(FILTER_ON_UNDEFINED));
    }

    let mut values = just(value);
    for position in 0..statements.len() {
        let statements = statements.clone();
        let ctx = ctx.clone();
        values = values
            .switch_map(move |current| match current.get() {
                Some(root) => apply_statement(
                    root.clone(),
                    Arc::new(statements[position].clone()),
                    &ctx,
                ),
                None => just(current),
            })
            .boxed();
    }
    values
}

fn apply_statement(
    root: Value,
    statement: Arc<FilterStatement>,
    ctx: &EvaluationContext,
) -> ValStream {
    if !statement.each {
        return descend(Val::of(root.clone()), root, statement, 0, ctx);
    }
    match root {
        Value::Array(items) => assemble_array(
            items
                .into_iter()
                .map(|item| descend(Val::of(item.clone()), item, statement.clone(), 0, ctx))
                .collect(),
        ),
        _ => just(Val::error(EACH_ON_NON_ARRAY)),
    }
}

/// Walk `statement.target[depth..]` below `value`
///
/// `root` is what `@` refers to in the action's arguments.
fn descend(
    root: Val,
    value: Value,
    statement: Arc<FilterStatement>,
    depth: usize,
    ctx: &EvaluationContext,
) -> ValStream {
    let Some(step) = statement.target.get(depth) else {
        return apply_action(root, value, &statement, ctx);
    };

    let next = |child: Value| descend(root.clone(), child, statement.clone(), depth + 1, ctx);
    let same = |child: Value| descend(root.clone(), child, statement.clone(), depth, ctx);

    match (step, value) {
        (Step::Key(key), Value::Object(map)) => {
            if !map.contains_key(key) {
                return just(Val::of(Value::Object(map)));
            }
            assemble_object(
                map.into_iter()
                    .map(|(k, v)| {
                        let child = if &k == key { next(v) } else { just(Val::of(v)) };
                        (k, child)
                    })
                    .collect(),
            )
        }
        (Step::Key(_), Value::Array(items)) => {
            assemble_array(items.into_iter().map(same).collect())
        }
        (Step::Key(_), other) => just(Val::of(other)),

        (Step::Index(index), Value::Array(items)) => match normalize_index(*index, items.len()) {
            Some(selected) => rebuild_array(items, |i| i == selected, next),
            None => just(index_out_of_bounds(*index, items.len())),
        },
        (Step::Slice { from, to, step }, Value::Array(items)) => {
            match slice_indices(items.len(), *from, *to, *step) {
                Ok(indices) => rebuild_array(items, |i| indices.contains(&i), next),
                Err(error) => just(error),
            }
        }
        (Step::IndexUnion(indices), Value::Array(items)) => {
            let len = items.len();
            let selected: Vec<usize> = indices
                .iter()
                .filter_map(|i| normalize_index(*i, len))
                .collect();
            rebuild_array(items, |i| selected.contains(&i), next)
        }
        (Step::Wildcard, Value::Array(items)) => rebuild_array(items, |_| true, next),
        (Step::Wildcard, Value::Object(map)) => {
            assemble_object(map.into_iter().map(|(k, v)| (k, next(v))).collect())
        }
        (Step::KeyUnion(keys), Value::Object(map)) => assemble_object(
            map.into_iter()
                .map(|(k, v)| {
                    let child = if keys.contains(&k) { next(v) } else { just(Val::of(v)) };
                    (k, child)
                })
                .collect(),
        ),
        (Step::RecursiveKey(key), Value::Object(map)) => assemble_object(
            map.into_iter()
                .map(|(k, v)| {
                    let child = if &k == key { next(v) } else { same(v) };
                    (k, child)
                })
                .collect(),
        ),
        (Step::RecursiveKey(_), Value::Array(items)) => {
            assemble_array(items.into_iter().map(same).collect())
        }
        (Step::RecursiveKey(_), other) => just(Val::of(other)),

        (Step::Condition(condition), Value::Array(items)) => assemble_array(
            items
                .into_iter()
                .map(|item| conditional(condition, item, &root, &statement, depth, ctx))
                .collect(),
        ),
        (Step::Condition(condition), Value::Object(map)) => assemble_object(
            map.into_iter()
                .map(|(k, v)| (k, conditional(condition, v, &root, &statement, depth, ctx)))
                .collect(),
        ),

        (
            Step::Index(_) | Step::Slice { .. } | Step::IndexUnion(_),
            other,
        ) => just(type_mismatch("an array", &Val::of(other))),
        (Step::Wildcard | Step::Condition(_), other) => {
            just(type_mismatch("an object or array", &Val::of(other)))
        }
        (Step::KeyUnion(_), other) => just(type_mismatch("an object", &Val::of(other))),
        (step, _) => just(Val::error(format!(
            "Step {step} is not supported in filter targets"
        ))),
    }
}

/// Descend into `element` only while `condition` holds for it
fn conditional(
    condition: &Arc<Expression>,
    element: Value,
    root: &Val,
    statement: &Arc<FilterStatement>,
    depth: usize,
    ctx: &EvaluationContext,
) -> ValStream {
    let (root, statement, inner_ctx) = (root.clone(), statement.clone(), ctx.clone());
    evaluate(condition, &ctx.clone().with_relative(Val::of(element.clone())))
        .switch_map(move |check| match require_boolean(&check) {
            Ok(true) => descend(
                root.clone(),
                element.clone(),
                statement.clone(),
                depth + 1,
                &inner_ctx,
            ),
            Ok(false) => just(Val::of(element.clone())),
            Err(error) => just(error),
        })
        .boxed()
}

fn rebuild_array<S, N>(items: Vec<Value>, selected: S, next: N) -> ValStream
where
    S: Fn(usize) -> bool,
    N: Fn(Value) -> ValStream,
{
    assemble_array(
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| if selected(i) { next(item) } else { just(Val::of(item)) })
            .collect(),
    )
}

/// Combine element streams into an array, removing undefined elements
fn assemble_array(elements: Vec<ValStream>) -> ValStream {
    combine_latest(elements)
        .map(|elements| {
            if let Some(error) = first_error(&elements) {
                return error.clone();
            }
            Val::of(Value::Array(
                elements.iter().filter_map(|e| e.get().cloned()).collect(),
            ))
        })
        .boxed()
}

/// Combine member streams into an object, removing undefined members
fn assemble_object(members: Vec<(String, ValStream)>) -> ValStream {
    let (keys, values): (Vec<String>, Vec<ValStream>) = members.into_iter().unzip();
    combine_latest(values)
        .map(move |values| object_of(keys.iter().cloned().zip(values)).unwrap_or_else(|e| e))
        .boxed()
}

fn apply_action(
    root: Val,
    value: Value,
    statement: &FilterStatement,
    ctx: &EvaluationContext,
) -> ValStream {
    let (name, arguments) = match &statement.action {
        FilterAction::Remove => return just(Val::undefined()),
        FilterAction::Function { name, arguments } => (ctx.resolve(name), arguments),
    };
    let functions = ctx.functions().clone();
    let target = Val::of(value);

    evaluate_all(arguments, &ctx.clone().with_relative(root))
        .map(move |arguments| {
            if let Some(error) = first_error(&arguments) {
                return error.clone();
            }
            let mut call = Vec::with_capacity(arguments.len() + 1);
            call.push(target.clone());
            call.extend(arguments);
            functions.evaluate(&name, &call)
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::attributes::AttributeRegistry;
    use crate::functions::FunctionRegistry;
    use serde_json::json;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(
            Arc::new(FunctionRegistry::with_standard_library()),
            Arc::new(AttributeRegistry::new()),
        )
    }

    async fn run(value: Val, statements: Vec<FilterStatement>) -> Val {
        apply_filters(value, statements.into(), &ctx())
            .next()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_filter_on_undefined_is_error() {
        let result = run(Val::undefined(), vec![remove(vec![])]).await;
        assert_eq!(result.error_message(), Some(FILTER_ON_UNDEFINED));
        let result = run(Val::undefined(), vec![]).await;
        assert_eq!(result.error_message(), Some(FILTER_ON_UNDEFINED));
    }

    #[tokio::test]
    async fn test_filter_on_error_passes_through() {
        let error = Val::error("upstream");
        assert_eq!(run(error.clone(), vec![remove(vec![])]).await, error);
    }

    #[tokio::test]
    async fn test_no_statements_returns_value() {
        let value = Val::of(json!({"a": [1, 2]}));
        assert_eq!(run(value.clone(), vec![]).await, value);
    }

    #[tokio::test]
    async fn test_remove_key_and_blacken() {
        let value = Val::of(json!({"name": "alice", "ssn": "123-45-6789", "age": 30}));
        let result = run(
            value,
            vec![
                remove(vec![Step::Key("age".into())]),
                apply(vec![Step::Key("ssn".into())], "filter.blacken", vec![val(json!(0)), val(json!(4))]),
            ],
        )
        .await;
        assert_eq!(result, Val::of(json!({"name": "alice", "ssn": "XXXXXXX6789"})));
    }

    #[tokio::test]
    async fn test_missing_key_leaves_value_unchanged() {
        let value = Val::of(json!({"name": "alice"}));
        let result = run(value.clone(), vec![remove(vec![Step::Key("ssn".into())])]).await;
        assert_eq!(result, value);
    }

    #[tokio::test]
    async fn test_each_applies_per_element() {
        let value = Val::of(json!([{"id": 1, "secret": "x"}, {"id": 2, "secret": "y"}]));
        let result = run(value, vec![remove(vec![Step::Key("secret".into())]).each()]).await;
        assert_eq!(result, Val::of(json!([{"id": 1}, {"id": 2}])));

        let result = run(Val::of(json!({"a": 1})), vec![remove(vec![]).each()]).await;
        assert_eq!(result.error_message(), Some(EACH_ON_NON_ARRAY));
    }

    #[tokio::test]
    async fn test_index_and_slice_targets() {
        let value = Val::of(json!([1, 2, 3, 4]));
        let result = run(value.clone(), vec![remove(vec![Step::Index(-1)])]).await;
        assert_eq!(result, Val::of(json!([1, 2, 3])));

        let slice = Step::Slice { from: Some(0), to: Some(2), step: None };
        let result = run(value.clone(), vec![apply(vec![slice], "filter.replace", vec![val(json!(0))])]).await;
        assert_eq!(result, Val::of(json!([0, 0, 3, 4])));

        assert!(run(value, vec![remove(vec![Step::Index(9)])]).await.is_error());
    }

    #[tokio::test]
    async fn test_slice_target_with_huge_step() {
        let value = Val::of(json!([1, 2, 3, 4]));
        let slice = Step::Slice { from: Some(1), to: None, step: Some(i64::MAX) };
        let result = run(value, vec![remove(vec![slice])]).await;
        assert_eq!(result, Val::of(json!([1, 3, 4])));
    }

    #[tokio::test]
    async fn test_recursive_key_target() {
        let value = Val::of(json!({"password": "a", "nested": {"password": "b", "keep": 1}}));
        let result = run(value, vec![remove(vec![Step::RecursiveKey("password".into())])]).await;
        assert_eq!(result, Val::of(json!({"nested": {"keep": 1}})));
    }

    #[tokio::test]
    async fn test_condition_target() {
        let value = Val::of(json!([{"v": 1}, {"v": 5}, {"v": 10}]));
        let condition = Step::Condition(gt(key(relative(), "v"), val(json!(3))));
        let result = run(value, vec![remove(vec![condition])]).await;
        assert_eq!(result, Val::of(json!([{"v": 1}])));
    }

    #[tokio::test]
    async fn test_arguments_see_statement_root() {
        let value = Val::of(json!({"name": "alice", "alias": "x"}));
        let result = run(
            value,
            vec![apply(vec![Step::Key("alias".into())], "filter.replace", vec![key(relative(), "name")])],
        )
        .await;
        assert_eq!(result, Val::of(json!({"name": "alice", "alias": "alice"})));
    }

    #[tokio::test]
    async fn test_unsupported_target_step() {
        let value = Val::of(json!({"a": 1}));
        let step = Step::Attribute { name: "pip.x".into(), arguments: vec![], head: false };
        assert!(run(value, vec![remove(vec![step])]).await.is_error());
    }

    #[tokio::test]
    async fn test_remove_root() {
        assert_eq!(run(Val::of(json!(1)), vec![remove(vec![])]).await, Val::undefined());
    }
}

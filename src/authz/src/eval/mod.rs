//! Reactive expression evaluator
//!
//! [`evaluate`] turns an expression into a stream of values. Leaves emit once;
//! attribute finders may emit indefinitely. Strict operators recompute on every
//! operand update and suppress consecutive duplicates. Lazy boolean operators
//! only subscribe to their right operand while the left one does not already
//! decide the result.

mod filters;
mod operators;
mod steps;

pub use filters::apply_filters;
pub use operators::{apply_binary, apply_unary, values_equal};

use futures::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ast::{BinaryOperator, Expression, JsonLiteral};
use crate::context::EvaluationContext;
use crate::stream::{combine_latest, just, LatestStreamExt, ValStream};
use crate::value::Val;

use operators::require_boolean;

pub(crate) const UNDEFINED_IN_ARRAY: &str = "Undefined values cannot be added to arrays";

/// Evaluate an expression into a stream of values
pub fn evaluate(expression: &Expression, ctx: &EvaluationContext) -> ValStream {
    match expression {
        Expression::Value(JsonLiteral(value)) => just(Val::of(value.clone())),
        Expression::Undefined => just(Val::undefined()),
        Expression::Variable(name) => just(match ctx.variable(name) {
            Some(value) => value.clone(),
            None => Val::error(format!("Unbound variable {name}")),
        }),
        Expression::Relative => just(match ctx.relative() {
            Some(value) => value.clone(),
            None => Val::error("@ is not bound in this context"),
        }),
        Expression::Object(members) => construct_object(members, ctx),
        Expression::Array(items) => construct_array(items, ctx),
        Expression::Unary(op, operand) => {
            let op = *op;
            evaluate(operand, ctx)
                .map(move |value| apply_unary(op, &value))
                .distinct_until_changed()
                .boxed()
        }
        Expression::Binary(op, left, right) if op.is_lazy() => {
            lazy_boolean(*op, left, right.clone(), ctx)
        }
        Expression::Binary(op, left, right) => {
            let op = *op;
            combine_latest(vec![evaluate(left, ctx), evaluate(right, ctx)])
                .map(move |operands| apply_binary(op, &operands[0], &operands[1]))
                .distinct_until_changed()
                .boxed()
        }
        Expression::FunctionCall { name, arguments } => function_call(name, arguments, ctx),
        Expression::Attribute {
            name,
            arguments,
            head,
        } => steps::attribute_finder(Val::undefined(), name, arguments, *head, ctx),
        Expression::Path { base, steps } => steps::evaluate_path(base, steps.clone(), ctx),
        Expression::Filter { base, statements } => {
            filters::evaluate_filter(base, statements.clone(), ctx)
        }
        Expression::SubTemplate { base, template } => sub_template(base, template.clone(), ctx),
    }
}

/// Evaluate all expressions and combine their latest values
pub(crate) fn evaluate_all(expressions: &[Arc<Expression>], ctx: &EvaluationContext) -> ValStreamVec {
    combine_latest(expressions.iter().map(|e| evaluate(e, ctx)).collect()).boxed()
}

pub(crate) type ValStreamVec = futures::stream::BoxStream<'static, Vec<Val>>;

/// First error among already evaluated values
pub(crate) fn first_error(values: &[Val]) -> Option<&Val> {
    values.iter().find(|v| v.is_error())
}

fn construct_object(members: &[(String, Arc<Expression>)], ctx: &EvaluationContext) -> ValStream {
    let keys: Vec<String> = members.iter().map(|(k, _)| k.clone()).collect();
    let values: Vec<ValStream> = members.iter().map(|(_, e)| evaluate(e, ctx)).collect();

    combine_latest(values)
        .map(move |values| {
            if let Some(error) = first_error(&values) {
                return error.clone();
            }
            let object: Map<String, Value> = keys
                .iter()
                .zip(values)
                .filter_map(|(k, v)| v.get().cloned().map(|v| (k.clone(), v)))
                .collect();
            Val::of(Value::Object(object))
        })
        .distinct_until_changed()
        .boxed()
}

fn construct_array(items: &[Arc<Expression>], ctx: &EvaluationContext) -> ValStream {
    evaluate_all(items, ctx)
        .map(|values| {
            if let Some(error) = first_error(&values) {
                return error.clone();
            }
            let mut array = Vec::with_capacity(values.len());
            for value in values {
                match value.get() {
                    Some(v) => array.push(v.clone()),
                    None => return Val::error(UNDEFINED_IN_ARRAY),
                }
            }
            Val::of(Value::Array(array))
        })
        .distinct_until_changed()
        .boxed()
}

/// `&&` / `||`: the right operand is only subscribed to when the left one
/// does not decide the result
fn lazy_boolean(
    op: BinaryOperator,
    left: &Expression,
    right: Arc<Expression>,
    ctx: &EvaluationContext,
) -> ValStream {
    let (label, decisive) = match op {
        BinaryOperator::LazyOr => ("OR", true),
        _ => ("AND", false),
    };
    if ctx.is_target_mode() {
        return just(Val::error(format!(
            "Lazy {label} operator is not allowed in the target"
        )));
    }

    let ctx = ctx.clone();
    evaluate(left, &ctx)
        .switch_map(move |left_value| match require_boolean(&left_value) {
            Err(error) => just(error.with_trace(op.symbol(), &[&left_value])),
            Ok(b) if b == decisive => just(Val::boolean(b).with_trace(op.symbol(), &[&left_value])),
            Ok(_) => evaluate(&right, &ctx)
                .map(move |right_value| {
                    let result = match require_boolean(&right_value) {
                        Ok(b) => Val::boolean(b),
                        Err(error) => error,
                    };
                    result.with_trace(op.symbol(), &[&left_value, &right_value])
                })
                .boxed(),
        })
        .distinct_until_changed()
        .boxed()
}

fn function_call(name: &str, arguments: &[Arc<Expression>], ctx: &EvaluationContext) -> ValStream {
    let name = ctx.resolve(name);
    let functions = ctx.functions().clone();

    evaluate_all(arguments, ctx)
        .map(move |arguments| match first_error(&arguments) {
            Some(error) => error.clone(),
            None => functions.evaluate(&name, &arguments),
        })
        .distinct_until_changed()
        .boxed()
}

/// `base :: template`, with `@` bound to the base (or to each element of an
/// array base)
fn sub_template(base: &Expression, template: Arc<Expression>, ctx: &EvaluationContext) -> ValStream {
    let ctx = ctx.clone();
    evaluate(base, &ctx)
        .switch_map(move |value| {
            let items = match value.get() {
                Some(Value::Array(items)) => items.clone(),
                Some(_) => return evaluate(&template, &ctx.clone().with_relative(value)),
                None => return just(value),
            };
            let streams = items
                .into_iter()
                .map(|item| evaluate(&template, &ctx.clone().with_relative(Val::of(item))))
                .collect();
            combine_latest(streams)
                .map(|results| {
                    if let Some(error) = first_error(&results) {
                        return error.clone();
                    }
                    Val::of(Value::Array(
                        results.iter().filter_map(|v| v.get().cloned()).collect(),
                    ))
                })
                .boxed()
        })
        .distinct_until_changed()
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::build::sub_template;
    use crate::attributes::AttributeRegistry;
    use crate::context::EvaluationMode;
    use crate::functions::FunctionRegistry;
    use serde_json::json;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(
            Arc::new(FunctionRegistry::with_standard_library()),
            Arc::new(AttributeRegistry::new()),
        )
    }

    async fn first(expression: &Expression, ctx: &EvaluationContext) -> Val {
        evaluate(expression, ctx).next().await.unwrap()
    }

    #[tokio::test]
    async fn test_literals_and_variables() {
        let ctx = ctx().with_variable("x", Val::of(json!(5)));
        assert_eq!(first(&val(json!("a")), &ctx).await, Val::text("a"));
        assert_eq!(first(&var("x"), &ctx).await, Val::of(json!(5)));
        assert_eq!(first(&undefined(), &ctx).await, Val::undefined());
        assert_eq!(
            first(&var("y"), &ctx).await.error_message(),
            Some("Unbound variable y")
        );
    }

    #[tokio::test]
    async fn test_object_construction_drops_undefined_members() {
        let expr = object(vec![("a", val(json!(1))), ("b", undefined())]);
        assert_eq!(first(&expr, &ctx()).await, Val::of(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_array_construction_rejects_undefined() {
        let expr = array(vec![val(json!(1)), undefined()]);
        assert_eq!(
            first(&expr, &ctx()).await.error_message(),
            Some(UNDEFINED_IN_ARRAY)
        );
        let expr = array(vec![val(json!(1)), val(json!("two"))]);
        assert_eq!(first(&expr, &ctx()).await, Val::of(json!([1, "two"])));
    }

    #[tokio::test]
    async fn test_lazy_and_eager_operators() {
        let ctx = ctx();
        assert_eq!(
            first(&lazy_or(val(json!(true)), div(val(json!(1)), val(json!(0)))), &ctx).await,
            Val::boolean(true)
        );
        assert!(first(&or(val(json!(true)), div(val(json!(1)), val(json!(0)))), &ctx)
            .await
            .is_error());
        assert_eq!(
            first(&lazy_and(val(json!(true)), val(json!(false))), &ctx).await,
            Val::boolean(false)
        );
        assert!(first(&lazy_and(val(json!(1)), val(json!(true))), &ctx)
            .await
            .is_error());
    }

    #[tokio::test]
    async fn test_lazy_operator_rejected_in_target() {
        let ctx = ctx().with_mode(EvaluationMode::Target);
        let result = first(&lazy_or(val(json!(true)), val(json!(false))), &ctx).await;
        assert_eq!(
            result.error_message(),
            Some("Lazy OR operator is not allowed in the target")
        );
    }

    #[tokio::test]
    async fn test_function_call_resolves_imports() {
        let imports = [("length".to_string(), "standard.length".to_string())].into();
        let ctx = ctx().with_imports(Arc::new(imports));
        let expr = call("length", vec![val(json!([1, 2, 3]))]);
        assert_eq!(first(&expr, &ctx).await, Val::of(json!(3)));
    }

    #[tokio::test]
    async fn test_function_call_propagates_argument_error() {
        let expr = call("standard.length", vec![div(val(json!(1)), val(json!(0)))]);
        assert_eq!(
            first(&expr, &ctx()).await.error_message(),
            Some("Division by zero")
        );
    }

    #[tokio::test]
    async fn test_sub_template() {
        let ctx = ctx();
        let expr = sub_template(
            val(json!([{"name": "a"}, {"name": "b"}])),
            key(relative(), "name"),
        );
        assert_eq!(first(&expr, &ctx).await, Val::of(json!(["a", "b"])));

        let expr = sub_template(val(json!({"id": 1})), object(vec![("ref", key(relative(), "id"))]));
        assert_eq!(first(&expr, &ctx).await, Val::of(json!({"ref": 1})));
    }

    #[tokio::test]
    async fn test_strict_stream_completes() {
        let values: Vec<Val> = evaluate(&add(val(json!(1)), val(json!(2))), &ctx())
            .collect()
            .await;
        assert_eq!(values, vec![Val::of(json!(3))]);
    }
}

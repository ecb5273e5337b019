//! Single policy decision stream

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::ast::{Entitlement, Expression, Policy, Statement};
use crate::context::{EvaluationContext, EvaluationMode};
use crate::decision::{AuthorizationDecision, Decision};
use crate::eval::evaluate;
use crate::stream::{combine_latest, LatestStreamExt};
use crate::value::Val;

use super::DecisionStream;

pub(crate) const UNDEFINED_ASSIGNMENT: &str = "Cannot assign undefined to a variable";

/// Where a body evaluation ended up
enum BodyOutcome {
    /// Every condition holds; carries the scope extended by all definitions
    Holds(EvaluationContext),
    NotApplicable,
    Indeterminate(Val),
}

fn once<T: Send + 'static>(item: T) -> BoxStream<'static, T> {
    stream::iter(std::iter::once(item)).boxed()
}

/// Evaluate a policy whose target already matched
pub fn evaluate_policy(policy: &Policy, ctx: &EvaluationContext) -> DecisionStream {
    let body: Arc<[Statement]> = policy.body.clone().into();
    let constraints = Arc::new(Constraints {
        entitlement: policy.entitlement,
        obligations: policy.obligations.clone(),
        advice: policy.advice.clone(),
        transformation: policy.transformation.clone(),
    });
    let name = policy.name.clone();

    body_from(body, 0, ctx.clone().with_mode(EvaluationMode::Body))
        .switch_map(move |outcome| match outcome {
            BodyOutcome::Holds(scope) => constraints.evaluate(&scope),
            BodyOutcome::NotApplicable => once(AuthorizationDecision::not_applicable()),
            BodyOutcome::Indeterminate(error) => {
                debug!(policy = %name, error = %error, "Policy body is indeterminate");
                once(AuthorizationDecision::indeterminate())
            }
        })
        .distinct_until_changed()
        .boxed()
}

/// Evaluate `body[position..]`; a newer value of an earlier statement
/// re-evaluates everything after it
fn body_from(
    body: Arc<[Statement]>,
    position: usize,
    ctx: EvaluationContext,
) -> BoxStream<'static, BodyOutcome> {
    let Some(statement) = body.get(position) else {
        return once(BodyOutcome::Holds(ctx));
    };

    match statement {
        Statement::Condition(condition) => {
            let values = evaluate(condition, &ctx);
            values
                .switch_map(move |value| match value.as_bool() {
                    Some(true) => body_from(body.clone(), position + 1, ctx.clone()),
                    Some(false) => once(BodyOutcome::NotApplicable),
                    None if value.is_error() => once(BodyOutcome::Indeterminate(value)),
                    None => once(BodyOutcome::Indeterminate(Val::error(format!(
                        "Type mismatch. Condition must be a boolean, but got {}",
                        value.type_name()
                    )))),
                })
                .boxed()
        }
        Statement::Definition { name, value } => {
            let name = name.clone();
            let values = evaluate(value, &ctx);
            values
                .switch_map(move |value| {
                    if value.is_error() {
                        return once(BodyOutcome::Indeterminate(value));
                    }
                    if value.is_undefined() {
                        return once(BodyOutcome::Indeterminate(Val::error(UNDEFINED_ASSIGNMENT)));
                    }
                    let scope = ctx.clone().with_variable(name.clone(), value);
                    body_from(body.clone(), position + 1, scope)
                })
                .boxed()
        }
    }
}

/// Everything a policy contributes once its body holds
struct Constraints {
    entitlement: Entitlement,
    obligations: Vec<Arc<Expression>>,
    advice: Vec<Arc<Expression>>,
    transformation: Option<Arc<Expression>>,
}

impl Constraints {
    fn evaluate(&self, ctx: &EvaluationContext) -> DecisionStream {
        let obligation_count = self.obligations.len();
        let advice_count = self.advice.len();
        let has_transformation = self.transformation.is_some();
        let decision = match self.entitlement {
            Entitlement::Permit => Decision::Permit,
            Entitlement::Deny => Decision::Deny,
        };

        let streams = self
            .obligations
            .iter()
            .chain(&self.advice)
            .chain(&self.transformation)
            .map(|e| evaluate(e, ctx))
            .collect();

        combine_latest(streams)
            .map(move |values| {
                let mut payloads: Vec<Value> = Vec::with_capacity(values.len());
                for value in &values {
                    match value.get() {
                        Some(v) => payloads.push(v.clone()),
                        None => {
                            debug!(value = %value, "Constraint did not evaluate to a value");
                            return AuthorizationDecision::indeterminate();
                        }
                    }
                }

                let mut payloads = payloads.into_iter();
                let obligations: Vec<Value> = payloads.by_ref().take(obligation_count).collect();
                let advice: Vec<Value> = payloads.by_ref().take(advice_count).collect();
                let mut result = AuthorizationDecision::new(decision)
                    .with_obligations(obligations)
                    .with_advice(advice);
                if has_transformation {
                    if let Some(resource) = payloads.next() {
                        result = result.with_resource(resource);
                    }
                }
                result
            })
            .boxed()
    }
}

//! Target matching and decision streams for policies and policy sets
//!
//! A document is first matched by evaluating its target in target mode. Only
//! a target that evaluates to `true` leads to the body being evaluated; an
//! error while matching is indeterminate, never a silent non-match.

mod body;
mod set;
mod validate;

pub use body::evaluate_policy;
pub use set::{combine_decisions, evaluate_set, CombiningAlgorithm, CombiningAlgorithms};
pub use validate::{validate_document, validate_target};

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::ast::{Document, Expression, Policy, PolicyElement};
use crate::context::{EvaluationContext, EvaluationMode};
use crate::decision::AuthorizationDecision;
use crate::eval::evaluate;
use crate::stream::{just, LatestStreamExt, ValStream};
use crate::value::Val;

/// Evolving decision of one document
pub type DecisionStream = BoxStream<'static, AuthorizationDecision>;

const TARGET_WITHOUT_VALUE: &str = "Target expression produced no value";

/// Evaluate a target to a single value: `true`, `false` or an error
///
/// A missing target matches. Non-boolean results are type errors.
pub fn target_stream(target: Option<&Arc<Expression>>, ctx: &EvaluationContext) -> ValStream {
    let Some(target) = target else {
        return just(Val::boolean(true));
    };
    let ctx = ctx.clone().with_mode(EvaluationMode::Target);
    evaluate(target, &ctx)
        .chain(stream::iter(std::iter::once(Val::error(TARGET_WITHOUT_VALUE))))
        .take(1)
        .map(|value| {
            if value.is_error() || value.is_boolean() {
                value
            } else {
                Val::error(format!(
                    "Type mismatch. Target expression must return a boolean, but got {}",
                    value.type_name()
                ))
            }
        })
        .boxed()
}

/// Match a target against the context
pub async fn evaluate_target(target: Option<&Arc<Expression>>, ctx: &EvaluationContext) -> Val {
    target_stream(target, ctx)
        .next()
        .await
        .unwrap_or_else(|| Val::error(TARGET_WITHOUT_VALUE))
}

/// Whether a document applies to the subscription bound in `ctx`
pub async fn matches(document: &Document, ctx: &EvaluationContext) -> Val {
    let ctx = ctx.clone().with_imports(document.imports.clone());
    evaluate_target(document.target(), &ctx).await
}

/// Match a policy's target, then evaluate it
pub fn decide_policy(policy: &Policy, ctx: &EvaluationContext) -> DecisionStream {
    let policy = Arc::new(policy.clone());
    let body_ctx = ctx.clone();
    target_stream(policy.target.as_ref(), ctx)
        .switch_map(move |matched| match matched.as_bool() {
            Some(true) => evaluate_policy(&policy, &body_ctx),
            Some(false) => one(AuthorizationDecision::not_applicable()),
            None => {
                debug!(policy = %policy.name, error = %matched, "Target is indeterminate");
                one(AuthorizationDecision::indeterminate())
            }
        })
        .boxed()
}

/// Match a document's target, then evaluate the policy or policy set
pub fn decide(document: &Arc<Document>, ctx: &EvaluationContext) -> DecisionStream {
    let ctx = ctx.clone().with_imports(document.imports.clone());
    let document = document.clone();
    let body_ctx = ctx.clone();
    target_stream(document.target(), &ctx)
        .switch_map(move |matched| match matched.as_bool() {
            Some(true) => evaluate_matched(&document, &body_ctx),
            Some(false) => one(AuthorizationDecision::not_applicable()),
            None => {
                debug!(document = %document.name(), error = %matched, "Target is indeterminate");
                one(AuthorizationDecision::indeterminate())
            }
        })
        .distinct_until_changed()
        .boxed()
}

/// Evaluate a document whose target is already known to match
pub fn evaluate_matched(document: &Document, ctx: &EvaluationContext) -> DecisionStream {
    let ctx = ctx.clone().with_imports(document.imports.clone());
    match &document.element {
        PolicyElement::Policy(policy) => evaluate_policy(policy, &ctx),
        PolicyElement::Set(set) => evaluate_set(set, &ctx),
    }
}

fn one(decision: AuthorizationDecision) -> DecisionStream {
    stream::iter(std::iter::once(decision)).boxed()
}

//! Policy sets and the combining algorithm contract

use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ast::{Expression, PolicySet};
use crate::context::{EvaluationContext, EvaluationMode};
use crate::decision::AuthorizationDecision;
use crate::eval::evaluate;
use crate::stream::{combine_latest, LatestStreamExt};
use crate::value::Val;

use super::body::UNDEFINED_ASSIGNMENT;
use super::{decide_policy, DecisionStream};

/// Combines the latest decisions of several policies into one
///
/// Decisions arrive in document order. Algorithms are supplied by the host;
/// none are built in.
pub trait CombiningAlgorithm: Send + Sync {
    fn combine(&self, decisions: &[AuthorizationDecision]) -> AuthorizationDecision;
}

impl<F> CombiningAlgorithm for F
where
    F: Fn(&[AuthorizationDecision]) -> AuthorizationDecision + Send + Sync,
{
    fn combine(&self, decisions: &[AuthorizationDecision]) -> AuthorizationDecision {
        self(decisions)
    }
}

/// Combining algorithms by identifier
#[derive(Default)]
pub struct CombiningAlgorithms {
    algorithms: DashMap<String, Arc<dyn CombiningAlgorithm>>,
}

impl CombiningAlgorithms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A>(&self, id: impl Into<String>, algorithm: A)
    where
        A: CombiningAlgorithm + 'static,
    {
        self.algorithms.insert(id.into(), Arc::new(algorithm));
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn CombiningAlgorithm>> {
        self.algorithms.get(id).map(|a| a.value().clone())
    }
}

/// Combine decision streams with `algorithm`, re-emitting whenever any of
/// them changes
pub fn combine_decisions(
    streams: Vec<DecisionStream>,
    algorithm: Arc<dyn CombiningAlgorithm>,
) -> DecisionStream {
    combine_latest(streams)
        .map(move |decisions| algorithm.combine(&decisions))
        .distinct_until_changed()
        .boxed()
}

/// Evaluate a policy set whose target already matched
pub fn evaluate_set(set: &PolicySet, ctx: &EvaluationContext) -> DecisionStream {
    let Some(algorithm) = ctx.algorithms().get(&set.algorithm) else {
        warn!(set = %set.name, algorithm = %set.algorithm, "Unknown combining algorithm");
        return just_decision(AuthorizationDecision::indeterminate());
    };

    let definitions: Arc<[(String, Arc<Expression>)]> = set.definitions.clone().into();
    let policies = Arc::new(set.policies.clone());
    let name = set.name.clone();

    define_from(definitions, 0, ctx.clone().with_mode(EvaluationMode::Body))
        .switch_map(move |scope| match scope {
            Ok(scope) => combine_decisions(
                policies
                    .iter()
                    .map(|policy| decide_policy(policy, &scope))
                    .collect(),
                algorithm.clone(),
            ),
            Err(error) => {
                debug!(set = %name, error = %error, "Policy set definitions are indeterminate");
                just_decision(AuthorizationDecision::indeterminate())
            }
        })
        .distinct_until_changed()
        .boxed()
}

/// Evaluate set-level definitions in order, each visible to the next
fn define_from(
    definitions: Arc<[(String, Arc<Expression>)]>,
    position: usize,
    ctx: EvaluationContext,
) -> BoxStream<'static, Result<EvaluationContext, Val>> {
    let Some((name, value)) = definitions.get(position) else {
        return stream::iter(std::iter::once(Ok(ctx))).boxed();
    };
    let name = name.clone();
    let values = evaluate(value, &ctx);

    values
        .switch_map(move |value| {
            let result = if value.is_error() {
                Err(value)
            } else if value.is_undefined() {
                Err(Val::error(UNDEFINED_ASSIGNMENT))
            } else {
                return define_from(
                    definitions.clone(),
                    position + 1,
                    ctx.clone().with_variable(name.clone(), value),
                );
            };
            stream::iter(std::iter::once(result)).boxed()
        })
        .boxed()
}

fn just_decision(decision: AuthorizationDecision) -> DecisionStream {
    stream::iter(std::iter::once(decision)).boxed()
}

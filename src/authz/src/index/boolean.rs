//! Boolean sub-predicates extracted from target expressions

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::ast::Expression;
use crate::context::EvaluationContext;
use crate::policy::evaluate_target;
use crate::value::Val;

/// A boolean predicate stored once in the index
///
/// Two bools are interchangeable iff they are structurally equal. The imports
/// take part in equality because `f(x)` means different functions in
/// documents that import `f` differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bool {
    /// Known truth value; never stored in a clause after normalization
    Constant(bool),

    /// Expression evaluated in target mode against each request
    Expression {
        expression: Arc<Expression>,
        imports: Arc<BTreeMap<String, String>>,
    },
}

impl Bool {
    pub fn expression(expression: Arc<Expression>, imports: Arc<BTreeMap<String, String>>) -> Self {
        Self::Expression {
            expression,
            imports,
        }
    }

    /// Whether the value is known without a request
    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    pub fn constant(&self) -> Option<bool> {
        match self {
            Self::Constant(value) => Some(*value),
            Self::Expression { .. } => None,
        }
    }

    /// Evaluate against the request bound in `ctx`: a boolean or an error
    pub async fn evaluate(&self, ctx: &EvaluationContext) -> Val {
        match self {
            Self::Constant(value) => Val::boolean(*value),
            Self::Expression {
                expression,
                imports,
            } => {
                let ctx = ctx.clone().with_imports(imports.clone());
                evaluate_target(Some(expression), &ctx).await
            }
        }
    }
}

impl fmt::Display for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "{value}"),
            Self::Expression { expression, .. } => write!(f, "{expression}"),
        }
    }
}

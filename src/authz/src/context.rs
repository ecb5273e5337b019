//! Evaluation environment

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::attributes::AttributeContext;
use crate::decision::AuthorizationSubscription;
use crate::functions::FunctionContext;
use crate::policy::CombiningAlgorithms;
use crate::value::Val;

/// Variable bindings visible to an expression
pub type Variables = HashMap<String, Val>;

/// Whether an expression is evaluated as a target or inside a body
///
/// Target expressions must not reach external attribute sources and must not
/// use the lazy boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    Target,
    Body,
}

/// Immutable bundle of everything an evaluation can see
///
/// Every `with_*` method returns an extended copy; the original is never
/// mutated, so child scopes cannot leak bindings into their parents.
#[derive(Clone)]
pub struct EvaluationContext {
    variables: Arc<Variables>,
    relative: Option<Val>,
    functions: Arc<dyn FunctionContext>,
    attributes: Arc<dyn AttributeContext>,
    algorithms: Arc<CombiningAlgorithms>,
    imports: Arc<BTreeMap<String, String>>,
    mode: EvaluationMode,
}

impl EvaluationContext {
    /// Create a body-mode context with no variables bound
    pub fn new(functions: Arc<dyn FunctionContext>, attributes: Arc<dyn AttributeContext>) -> Self {
        Self {
            variables: Arc::default(),
            relative: None,
            functions,
            attributes,
            algorithms: Arc::default(),
            imports: Arc::default(),
            mode: EvaluationMode::Body,
        }
    }

    pub fn with_algorithms(mut self, algorithms: Arc<CombiningAlgorithms>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Bind `subject`, `action`, `resource` and `environment`
    pub fn with_subscription(self, subscription: &AuthorizationSubscription) -> Self {
        let bind = |value: &Value| Val::of(value.clone());
        self.with_variable("subject", bind(&subscription.subject))
            .with_variable("action", bind(&subscription.action))
            .with_variable("resource", bind(&subscription.resource))
            .with_variable("environment", bind(&subscription.environment))
    }

    /// Bind (or shadow) a variable
    pub fn with_variable(mut self, name: impl Into<String>, value: Val) -> Self {
        Arc::make_mut(&mut self.variables).insert(name.into(), value);
        self
    }

    pub fn with_variables(mut self, variables: &Variables) -> Self {
        let own = Arc::make_mut(&mut self.variables);
        for (name, value) in variables {
            own.insert(name.clone(), value.clone());
        }
        self
    }

    /// Bind `@`
    pub fn with_relative(mut self, value: Val) -> Self {
        self.relative = Some(value);
        self
    }

    pub fn with_imports(mut self, imports: Arc<BTreeMap<String, String>>) -> Self {
        self.imports = imports;
        self
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn variable(&self, name: &str) -> Option<&Val> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn relative(&self) -> Option<&Val> {
        self.relative.as_ref()
    }

    pub fn functions(&self) -> &Arc<dyn FunctionContext> {
        &self.functions
    }

    pub fn attributes(&self) -> &Arc<dyn AttributeContext> {
        &self.attributes
    }

    pub fn algorithms(&self) -> &CombiningAlgorithms {
        &self.algorithms
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn is_target_mode(&self) -> bool {
        self.mode == EvaluationMode::Target
    }

    /// Resolve a function or attribute name through the document imports
    pub fn resolve(&self, name: &str) -> String {
        self.imports
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeRegistry;
    use crate::functions::FunctionRegistry;
    use serde_json::json;

    fn context() -> EvaluationContext {
        EvaluationContext::new(
            Arc::new(FunctionRegistry::new()),
            Arc::new(AttributeRegistry::new()),
        )
    }

    #[test]
    fn test_child_scope_does_not_touch_parent() {
        let parent = context().with_variable("x", Val::of(json!(1)));
        let child = parent.clone().with_variable("x", Val::of(json!(2)));

        assert_eq!(parent.variable("x"), Some(&Val::of(json!(1))));
        assert_eq!(child.variable("x"), Some(&Val::of(json!(2))));
    }

    #[test]
    fn test_subscription_binding() {
        let subscription = AuthorizationSubscription::new(json!("alice"), json!("read"), json!({"id": 7}));
        let ctx = context().with_subscription(&subscription);

        assert_eq!(ctx.variable("subject"), Some(&Val::text("alice")));
        assert_eq!(ctx.variable("resource"), Some(&Val::of(json!({"id": 7}))));
        assert_eq!(ctx.variable("environment"), Some(&Val::of(json!(null))));
    }

    #[test]
    fn test_import_resolution() {
        let imports: BTreeMap<String, String> =
            [("length".to_string(), "standard.length".to_string())].into();
        let ctx = context().with_imports(Arc::new(imports));

        assert_eq!(ctx.resolve("length"), "standard.length");
        assert_eq!(ctx.resolve("filter.blacken"), "filter.blacken");
    }
}

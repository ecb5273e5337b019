//! Policy documents

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::Expression;

/// Decision a policy grants when its body holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entitlement {
    Permit,
    Deny,
}

/// Where-clause statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `var name = value;`
    Definition {
        name: String,
        value: Arc<Expression>,
    },
    /// Boolean condition that must hold
    Condition(Arc<Expression>),
}

/// A single policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub entitlement: Entitlement,
    /// Missing target matches every subscription
    pub target: Option<Arc<Expression>>,
    pub body: Vec<Statement>,
    pub obligations: Vec<Arc<Expression>>,
    pub advice: Vec<Arc<Expression>>,
    pub transformation: Option<Arc<Expression>>,
}

impl Policy {
    pub fn new(name: impl Into<String>, entitlement: Entitlement) -> Self {
        Self {
            name: name.into(),
            entitlement,
            target: None,
            body: Vec::new(),
            obligations: Vec::new(),
            advice: Vec::new(),
            transformation: None,
        }
    }

    pub fn permit(name: impl Into<String>) -> Self {
        Self::new(name, Entitlement::Permit)
    }

    pub fn deny(name: impl Into<String>) -> Self {
        Self::new(name, Entitlement::Deny)
    }

    pub fn with_target(mut self, target: Arc<Expression>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_condition(mut self, condition: Arc<Expression>) -> Self {
        self.body.push(Statement::Condition(condition));
        self
    }

    pub fn with_definition(mut self, name: impl Into<String>, value: Arc<Expression>) -> Self {
        self.body.push(Statement::Definition {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_obligation(mut self, obligation: Arc<Expression>) -> Self {
        self.obligations.push(obligation);
        self
    }

    pub fn with_advice(mut self, advice: Arc<Expression>) -> Self {
        self.advice.push(advice);
        self
    }

    pub fn with_transformation(mut self, transformation: Arc<Expression>) -> Self {
        self.transformation = Some(transformation);
        self
    }
}

/// A named group of policies combined by an algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySet {
    pub name: String,
    /// Identifier of the combining algorithm, resolved at evaluation time
    pub algorithm: String,
    pub target: Option<Arc<Expression>>,
    /// Set-level `var` definitions, visible to every contained policy
    pub definitions: Vec<(String, Arc<Expression>)>,
    pub policies: Vec<Policy>,
}

impl PolicySet {
    pub fn new(name: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            algorithm: algorithm.into(),
            target: None,
            definitions: Vec::new(),
            policies: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: Arc<Expression>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_definition(mut self, name: impl Into<String>, value: Arc<Expression>) -> Self {
        self.definitions.push((name.into(), value));
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyElement {
    Policy(Policy),
    Set(PolicySet),
}

/// A compiled document as handed over by the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Short name to fully qualified function / attribute name
    pub imports: Arc<BTreeMap<String, String>>,
    pub element: PolicyElement,
}

impl Document {
    pub fn policy(policy: Policy) -> Self {
        Self {
            imports: Arc::default(),
            element: PolicyElement::Policy(policy),
        }
    }

    pub fn set(set: PolicySet) -> Self {
        Self {
            imports: Arc::default(),
            element: PolicyElement::Set(set),
        }
    }

    pub fn with_import(mut self, short: impl Into<String>, qualified: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.imports).insert(short.into(), qualified.into());
        self
    }

    /// Unique name within a retrieval point
    pub fn name(&self) -> &str {
        match &self.element {
            PolicyElement::Policy(p) => &p.name,
            PolicyElement::Set(s) => &s.name,
        }
    }

    pub fn target(&self) -> Option<&Arc<Expression>> {
        match &self.element {
            PolicyElement::Policy(p) => p.target.as_ref(),
            PolicyElement::Set(s) => s.target.as_ref(),
        }
    }
}

/// A document that failed to parse or validate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDocument {
    pub name: String,
    pub error: String,
}

/// Parser output: either a usable document or the reason it is not
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDocument {
    Valid(Arc<Document>),
    Invalid(InvalidDocument),
}

impl ParsedDocument {
    pub fn invalid(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Invalid(InvalidDocument {
            name: name.into(),
            error: error.into(),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Valid(document) => document.name(),
            Self::Invalid(invalid) => &invalid.name,
        }
    }
}

impl From<Document> for ParsedDocument {
    fn from(document: Document) -> Self {
        Self::Valid(Arc::new(document))
    }
}

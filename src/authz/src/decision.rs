//! Authorization subscription and decision types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Authorization subscription: who wants to do what to which resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationSubscription {
    /// Subject making the request
    pub subject: Value,

    /// Action being performed
    pub action: Value,

    /// Resource being accessed
    pub resource: Value,

    /// Additional environment (time, location, ...)
    #[serde(default)]
    pub environment: Value,
}

impl AuthorizationSubscription {
    pub fn new(subject: Value, action: Value, resource: Value) -> Self {
        Self {
            subject,
            action,
            resource,
            environment: Value::Null,
        }
    }

    pub fn with_environment(mut self, environment: Value) -> Self {
        self.environment = environment;
        self
    }
}

/// Outcome of evaluating a policy or policy set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Permit,
    Deny,
    NotApplicable,
    /// Evaluation could not be completed without error
    Indeterminate,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Permit => "PERMIT",
            Self::Deny => "DENY",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::Indeterminate => "INDETERMINATE",
        };
        f.write_str(text)
    }
}

/// Decision with the payloads the caller must (obligations) or may (advice) act on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDecision {
    pub decision: Decision,

    /// Transformed resource, when the policy carries a transformation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obligations: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advice: Vec<Value>,
}

impl AuthorizationDecision {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            resource: None,
            obligations: Vec::new(),
            advice: Vec::new(),
        }
    }

    pub fn permit() -> Self {
        Self::new(Decision::Permit)
    }

    pub fn deny() -> Self {
        Self::new(Decision::Deny)
    }

    pub fn not_applicable() -> Self {
        Self::new(Decision::NotApplicable)
    }

    pub fn indeterminate() -> Self {
        Self::new(Decision::Indeterminate)
    }

    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_obligations(mut self, obligations: Vec<Value>) -> Self {
        self.obligations = obligations;
        self
    }

    pub fn with_advice(mut self, advice: Vec<Value>) -> Self {
        self.advice = advice;
        self
    }
}

//! Three-valued evaluation results
//!
//! Every expression evaluates to a [`Val`]: a defined JSON value, `undefined`
//! (absence of a value), or an error. Errors are terminal: operators pass them
//! through unchanged instead of inspecting their payload.

mod number;
mod trace;

pub use number::{decimal_to_val, json_equals, to_decimal};
pub use trace::Trace;

use bigdecimal::BigDecimal;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error payload of [`ValKind::Error`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    /// Human readable description
    pub message: String,

    /// Error this one was derived from, if any
    pub cause: Option<Arc<EvalError>>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Iterate over this error and its causes, outermost first
    pub fn chain(&self) -> impl Iterator<Item = &EvalError> {
        std::iter::successors(Some(self), |e| e.cause.as_deref())
    }
}

/// The three states a value can be in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValKind {
    Defined(Value),
    Undefined,
    Error(EvalError),
}

/// An evaluation result with an optional diagnostic trace
///
/// Equality ignores the trace.
#[derive(Clone)]
pub struct Val {
    kind: ValKind,
    trace: Option<Arc<Trace>>,
}

impl Val {
    pub fn of(value: Value) -> Self {
        Self {
            kind: ValKind::Defined(value),
            trace: None,
        }
    }

    pub fn undefined() -> Self {
        Self {
            kind: ValKind::Undefined,
            trace: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::from_error(EvalError::new(message))
    }

    /// Error wrapping another error as its cause
    pub fn error_caused_by(message: impl Into<String>, cause: &EvalError) -> Self {
        Self::from_error(EvalError {
            message: message.into(),
            cause: Some(Arc::new(cause.clone())),
        })
    }

    pub fn from_error(error: EvalError) -> Self {
        Self {
            kind: ValKind::Error(error),
            trace: None,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::of(Value::Bool(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::of(Value::String(value.into()))
    }

    pub fn kind(&self) -> &ValKind {
        &self.kind
    }

    pub fn into_kind(self) -> ValKind {
        self.kind
    }

    pub fn is_defined(&self) -> bool {
        matches!(self.kind, ValKind::Defined(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.kind, ValKind::Undefined)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ValKind::Error(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.kind, ValKind::Defined(Value::Bool(_)))
    }

    /// The JSON payload of a defined value
    pub fn get(&self) -> Option<&Value> {
        match &self.kind {
            ValKind::Defined(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.get().and_then(Value::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.get().and_then(Value::as_str)
    }

    /// Decimal view of a numeric value
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self.get() {
            Some(Value::Number(n)) => to_decimal(n),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&EvalError> {
        match &self.kind {
            ValKind::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.as_error().map(|e| e.message.as_str())
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValKind::Undefined => "undefined",
            ValKind::Error(_) => "error",
            ValKind::Defined(Value::Null) => "null",
            ValKind::Defined(Value::Bool(_)) => "boolean",
            ValKind::Defined(Value::Number(_)) => "number",
            ValKind::Defined(Value::String(_)) => "string",
            ValKind::Defined(Value::Array(_)) => "array",
            ValKind::Defined(Value::Object(_)) => "object",
        }
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_deref()
    }

    /// Attach a trace recording the operator and operands that produced this value
    pub fn with_trace(mut self, operator: &'static str, arguments: &[&Val]) -> Self {
        self.trace = Some(Arc::new(Trace::new(
            operator,
            arguments.iter().map(|v| (*v).clone()).collect(),
        )));
        self
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Val {}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValKind::Defined(value) => write!(f, "{value}"),
            ValKind::Undefined => f.write_str("undefined"),
            ValKind::Error(e) => write!(f, "ERROR[{}]", e.message),
        }
    }
}

impl From<Value> for Val {
    fn from(value: Value) -> Self {
        Self::of(value)
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Self::boolean(value)
    }
}

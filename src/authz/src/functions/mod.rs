//! Function context
//!
//! Native functions are synchronous and side-effect free. Whatever a function
//! does wrong (returning an error, or panicking) surfaces as an error value; it
//! never unwinds into the evaluator.

mod library;

use dashmap::DashMap;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::value::Val;

/// Failure reported by a native function
#[derive(Debug, Clone, Error)]
pub enum FunctionError {
    #[error("Illegal number of arguments. Expected {expected}, got {actual}")]
    Arity { expected: String, actual: usize },

    #[error("Illegal argument {position}: {message}")]
    Argument { position: usize, message: String },

    #[error("{0}")]
    Failed(String),
}

pub type FunctionResult = std::result::Result<Val, FunctionError>;

/// Native function signature
pub type NativeFunction = Arc<dyn Fn(&[Val]) -> FunctionResult + Send + Sync>;

/// Lookup and invocation of native functions by qualified name
pub trait FunctionContext: Send + Sync {
    fn is_provided(&self, name: &str) -> bool;

    /// Invoke a function; every failure comes back as an error value
    fn evaluate(&self, name: &str, arguments: &[Val]) -> Val;
}

/// Registry of native functions
pub struct FunctionRegistry {
    functions: DashMap<String, NativeFunction>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            functions: DashMap::new(),
        }
    }

    /// Create a registry preloaded with the `standard` and `filter` libraries
    pub fn with_standard_library() -> Self {
        let registry = Self::new();
        library::register(&registry);
        debug!(functions = registry.functions.len(), "Function registry created");
        registry
    }

    /// Register (or replace) a function under its fully qualified name
    pub fn register<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Val]) -> FunctionResult + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionContext for FunctionRegistry {
    fn is_provided(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn evaluate(&self, name: &str, arguments: &[Val]) -> Val {
        // clone out of the map so no shard lock is held while the function runs
        let Some(function) = self.functions.get(name).map(|f| f.value().clone()) else {
            warn!(function = %name, "Unknown function");
            return Val::error(format!("Unknown function {name}"));
        };

        match catch_unwind(AssertUnwindSafe(|| function(arguments))) {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => Val::error(format!("Function {name} failed: {error}")),
            Err(panic) => {
                warn!(function = %name, "Function panicked");
                Val::error(format!("Function {name} panicked: {}", panic_message(panic.as_ref())))
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Check the argument count of a fixed-arity function
pub fn expect_arity(arguments: &[Val], expected: usize) -> Result<(), FunctionError> {
    if arguments.len() != expected {
        return Err(FunctionError::Arity {
            expected: expected.to_string(),
            actual: arguments.len(),
        });
    }
    Ok(())
}

//! Attribute context (policy information points)
//!
//! An attribute source turns a subject value and arguments into a possibly
//! unbounded stream of values. The evaluator subscribes where an attribute
//! finder occurs in a body and drops the stream when the enclosing expression
//! switches to a newer value, which releases the source.

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::Variables;
use crate::functions::panic_message;
use crate::stream::{just, ValStream};
use crate::value::Val;

/// A single external attribute provider
pub trait AttributeSource: Send + Sync {
    fn stream(&self, subject: Val, arguments: Vec<Val>, variables: &Variables) -> ValStream;
}

impl<F> AttributeSource for F
where
    F: Fn(Val, Vec<Val>, &Variables) -> ValStream + Send + Sync,
{
    fn stream(&self, subject: Val, arguments: Vec<Val>, variables: &Variables) -> ValStream {
        self(subject, arguments, variables)
    }
}

/// Lookup of attribute sources by qualified name
pub trait AttributeContext: Send + Sync {
    fn is_provided(&self, name: &str) -> bool;

    /// Stream the attribute; failures are delivered as error values
    fn evaluate(
        &self,
        name: &str,
        subject: Val,
        arguments: Vec<Val>,
        variables: &Variables,
    ) -> ValStream;
}

/// Registry populated explicitly at startup
pub struct AttributeRegistry {
    sources: DashMap<String, Arc<dyn AttributeSource>>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self {
            sources: DashMap::new(),
        }
    }

    /// Register (or replace) a source under its fully qualified name
    pub fn register<S>(&self, name: impl Into<String>, source: S)
    where
        S: AttributeSource + 'static,
    {
        let name = name.into();
        debug!(attribute = %name, "Registering attribute source");
        self.sources.insert(name, Arc::new(source));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeContext for AttributeRegistry {
    fn is_provided(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    fn evaluate(
        &self,
        name: &str,
        subject: Val,
        arguments: Vec<Val>,
        variables: &Variables,
    ) -> ValStream {
        let Some(source) = self.sources.get(name).map(|s| s.value().clone()) else {
            warn!(attribute = %name, "Unknown attribute finder");
            return just(Val::error(format!("Unknown attribute finder {name}")));
        };

        let created = catch_unwind(AssertUnwindSafe(|| {
            source.stream(subject, arguments, variables)
        }));
        let name = name.to_string();
        match created {
            Ok(values) => AssertUnwindSafe(values)
                .catch_unwind()
                .map(move |polled| match polled {
                    Ok(value) => value,
                    Err(panic) => {
                        warn!(attribute = %name, "Attribute stream panicked");
                        Val::error(format!(
                            "Attribute finder {name} panicked: {}",
                            panic_message(panic.as_ref())
                        ))
                    }
                })
                .boxed(),
            Err(panic) => {
                warn!(attribute = %name, "Attribute source panicked");
                stream::iter(std::iter::once(Val::error(format!(
                    "Attribute finder {name} panicked: {}",
                    panic_message(panic.as_ref())
                ))))
                .boxed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constant(value: serde_json::Value) -> impl AttributeSource {
        move |_: Val, _: Vec<Val>, _: &Variables| just(Val::of(value.clone()))
    }

    #[tokio::test]
    async fn test_registered_source() {
        let registry = AttributeRegistry::new();
        registry.register("test.constant", constant(json!(42)));

        let values: Vec<Val> = registry
            .evaluate("test.constant", Val::undefined(), vec![], &Variables::new())
            .collect()
            .await;
        assert_eq!(values, vec![Val::of(json!(42))]);
        assert!(registry.is_provided("test.constant"));
    }

    #[tokio::test]
    async fn test_unknown_source_is_error_value() {
        let registry = AttributeRegistry::new();
        let values: Vec<Val> = registry
            .evaluate("test.missing", Val::undefined(), vec![], &Variables::new())
            .collect()
            .await;
        assert_eq!(values, vec![Val::error("Unknown attribute finder test.missing")]);
    }

    #[tokio::test]
    async fn test_panicking_stream_is_error_value() {
        let registry = AttributeRegistry::new();
        registry.register(
            "test.flaky",
            |_: Val, _: Vec<Val>, _: &Variables| -> ValStream {
                stream::iter(vec![1, 2])
                    .map(|n| {
                        if n == 2 {
                            panic!("sensor offline");
                        }
                        Val::of(json!(n))
                    })
                    .boxed()
            },
        );

        let values: Vec<Val> = registry
            .evaluate("test.flaky", Val::undefined(), vec![], &Variables::new())
            .collect()
            .await;
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], Val::of(json!(1)));
        assert!(values[1].error_message().unwrap().contains("sensor offline"));
    }
}

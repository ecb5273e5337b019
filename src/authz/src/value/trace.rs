//! Evaluation traces for diagnostics

use serde_json::{json, Value};

use super::Val;

/// Records which operator produced a value and from which operands
#[derive(Debug, Clone)]
pub struct Trace {
    pub operator: &'static str,
    pub arguments: Vec<Val>,
}

impl Trace {
    pub fn new(operator: &'static str, arguments: Vec<Val>) -> Self {
        Self {
            operator,
            arguments,
        }
    }

    /// Render the trace tree as JSON
    pub fn to_json(&self) -> Value {
        let arguments: Vec<Value> = self
            .arguments
            .iter()
            .map(|arg| {
                let mut node = json!({ "value": arg.to_string() });
                if let Some(trace) = arg.trace() {
                    node["trace"] = trace.to_json();
                }
                node
            })
            .collect();

        json!({
            "operator": self.operator,
            "arguments": arguments,
        })
    }
}

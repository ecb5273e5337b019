//! # Authorization Engine
//!
//! Attribute-based policy evaluation with an indexed policy retrieval point.
//!
//! ## Features
//!
//! - **Three-valued evaluation**: every expression yields a defined value,
//!   `undefined` or an error; errors propagate and end up as `Indeterminate`
//! - **Streaming attributes**: body expressions subscribe to attribute finders
//!   and re-evaluate whenever an attribute changes
//! - **Canonical literal index**: shared sub-predicates of all targets are
//!   evaluated at most once per request, and only when needed
//! - **Atomic updates**: publish/unpublish batches become visible all at once
//!
//! ## Example
//!
//! ```rust
//! use authz_engine::ast::build::*;
//! use authz_engine::ast::{Document, Policy};
//! use authz_engine::functions::FunctionRegistry;
//! use authz_engine::prp::{PolicyRetrievalPoint, RetrievalPoint};
//! use authz_engine::{AuthorizationSubscription, PrpConfig, Variables};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let prp = RetrievalPoint::new(PrpConfig::default());
//!     let policy = Policy::permit("admins")
//!         .with_target(eq(key(var("subject"), "role"), val(json!("admin"))));
//!     prp.publish(Document::policy(policy).into()).await;
//!
//!     let subscription =
//!         AuthorizationSubscription::new(json!({"role": "admin"}), json!("read"), json!("file"));
//!     let result = prp
//!         .retrieve_policies(
//!             &subscription,
//!             Arc::new(FunctionRegistry::with_standard_library()),
//!             &Variables::new(),
//!         )
//!         .await;
//!
//!     assert!(result.is_valid);
//!     assert_eq!(result.names(), vec!["admins"]);
//! }
//! ```

pub mod ast;
pub mod attributes;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod eval;
pub mod functions;
pub mod index;
pub mod metrics;
pub mod policy;
pub mod prp;
pub mod stream;
pub mod value;

// Re-export commonly used types
pub use config::{IndexKind, PrpConfig};
pub use context::{EvaluationContext, EvaluationMode, Variables};
pub use decision::{AuthorizationDecision, AuthorizationSubscription, Decision};
pub use error::{AuthzError, Result};
pub use eval::evaluate;
pub use index::PolicyRetrievalResult;
pub use prp::{PolicyRetrievalPoint, PrpState, PrpUpdateEvent, RetrievalPoint, Update};
pub use value::{EvalError, Val, ValKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

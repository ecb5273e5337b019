//! Document indexes used by the policy retrieval point
//!
//! An index answers one question per request: which published documents have
//! a target that evaluates to `true`. Any target error makes the answer
//! invalid instead of silently dropping the document.
//!
//! - [`CanonicalIndex`]: shared literals, lazy memoized evaluation
//! - [`NaiveIndex`]: evaluates every target, used as a reference

mod boolean;
mod canonical;
mod clause;
mod literal;
mod naive;
mod normalize;

pub use boolean::Bool;
pub use canonical::{BoolId, CanonicalIndex};
pub use clause::{ConjunctiveClause, DisjunctiveFormula};
pub use literal::Literal;
pub use naive::NaiveIndex;
pub use normalize::normalize;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::ast::Document;
use crate::config::IndexKind;
use crate::context::EvaluationContext;
use crate::decision::AuthorizationDecision;
use crate::policy::{combine_decisions, evaluate_matched, CombiningAlgorithm, DecisionStream};

/// Storage and target matching for published documents
///
/// Mutation happens on a private copy (`boxed_clone`) that the retrieval point
/// swaps in once the whole update is applied.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Add a document, replacing any document with the same name
    fn insert(&mut self, document: Arc<Document>);

    /// Remove a document and every index entry only it referenced
    fn remove(&mut self, name: &str) -> Option<Arc<Document>>;

    fn get(&self, name: &str) -> Option<Arc<Document>>;

    /// All documents in name order
    fn documents(&self) -> Vec<Arc<Document>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Documents whose target matches the request bound in `ctx`
    async fn retrieve(&self, ctx: &EvaluationContext) -> Retrieval;

    fn boxed_clone(&self) -> Box<dyn DocumentIndex>;
}

/// Create an empty index of the configured kind
pub fn new_index(kind: IndexKind, max_clauses: usize) -> Box<dyn DocumentIndex> {
    match kind {
        IndexKind::Canonical => Box::new(CanonicalIndex::new(max_clauses)),
        IndexKind::Naive => Box::new(NaiveIndex::new()),
    }
}

/// Matched documents for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRetrievalResult {
    /// Documents whose target evaluated to `true`, in name order
    pub matches: Vec<Arc<Document>>,

    /// `false` if any target evaluation failed or the retrieval point is
    /// inconsistent
    pub is_valid: bool,
}

impl Default for PolicyRetrievalResult {
    fn default() -> Self {
        Self {
            matches: Vec::new(),
            is_valid: true,
        }
    }
}

impl PolicyRetrievalResult {
    /// Empty result that must be treated as indeterminate
    pub fn invalid() -> Self {
        Self {
            matches: Vec::new(),
            is_valid: false,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.matches.iter().map(|d| d.name()).collect()
    }

    /// One evolving decision stream per matched document
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Vec<DecisionStream> {
        self.matches
            .iter()
            .map(|document| evaluate_matched(document, ctx))
            .collect()
    }

    /// Combine the decisions of all matches; invalid results are indeterminate
    pub fn combined(
        &self,
        ctx: &EvaluationContext,
        algorithm: Arc<dyn CombiningAlgorithm>,
    ) -> DecisionStream {
        if !self.is_valid {
            return stream::iter(std::iter::once(AuthorizationDecision::indeterminate())).boxed();
        }
        combine_decisions(self.evaluate(ctx), algorithm)
    }
}

/// Retrieval outcome plus evaluation counters
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub result: PolicyRetrievalResult,

    /// Literals (or, for the naive index, whole targets) evaluated
    pub literal_evaluations: usize,
    pub literal_errors: usize,
}

impl Retrieval {
    pub(crate) fn invalid() -> Self {
        Self {
            result: PolicyRetrievalResult::invalid(),
            ..Self::default()
        }
    }
}

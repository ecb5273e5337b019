//! Canonical literal index
//!
//! Every document target is normalized to a disjunction of conjunctive
//! clauses. Bools are interned in an arena so that structurally equal
//! predicates from different documents share one slot, and a negated
//! occurrence is the same slot with the opposite polarity. Clauses are keyed by
//! their sorted `(slot, negated)` pairs and map to the documents they make
//! eligible.
//!
//! Retrieval walks the clauses and evaluates a bool only when a clause still
//! needs it, memoizing every result for the rest of the request.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

use super::boolean::Bool;
use super::clause::DisjunctiveFormula;
use super::normalize::normalize;
use super::{DocumentIndex, Retrieval};
use crate::ast::Document;
use crate::context::EvaluationContext;

/// Arena slot of an interned bool
pub type BoolId = usize;

/// Sorted, deduplicated `(bool, negated)` pairs of one clause
type ClauseKey = Arc<[(BoolId, bool)]>;

#[derive(Debug, Clone)]
struct BoolSlot {
    bool: Arc<Bool>,

    /// Number of clause occurrences across all documents
    references: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    document: Arc<Document>,
    clauses: Vec<ClauseKey>,
}

/// Index over shared literals
///
/// Cloning copies the tables; the retrieval point mutates a private clone and
/// publishes it as the next snapshot.
#[derive(Debug, Clone)]
pub struct CanonicalIndex {
    max_clauses: usize,
    bools: Vec<Option<BoolSlot>>,
    free: Vec<BoolId>,
    bool_ids: HashMap<Arc<Bool>, BoolId>,
    clauses: BTreeMap<ClauseKey, BTreeSet<String>>,
    documents: BTreeMap<String, Entry>,
}

impl CanonicalIndex {
    /// Create an empty index; targets whose normal form exceeds `max_clauses`
    /// are indexed as a single literal
    pub fn new(max_clauses: usize) -> Self {
        Self {
            max_clauses: max_clauses.max(1),
            bools: Vec::new(),
            free: Vec::new(),
            bool_ids: HashMap::new(),
            clauses: BTreeMap::new(),
            documents: BTreeMap::new(),
        }
    }

    /// Number of live bools in the arena
    pub fn bool_count(&self) -> usize {
        self.bool_ids.len()
    }

    pub fn clause_count(&self) -> usize {
        self.clauses.len()
    }

    /// Arena slot holding `bool`, if any document uses it
    pub fn bool_id(&self, bool: &Bool) -> Option<BoolId> {
        self.bool_ids.get(bool).copied()
    }

    fn formula_of(&self, document: &Document) -> DisjunctiveFormula {
        match document.target() {
            Some(target) => normalize(target, &document.imports, self.max_clauses),
            None => DisjunctiveFormula::constant(true),
        }
    }

    fn intern(&mut self, bool: &Arc<Bool>) -> BoolId {
        if let Some(&id) = self.bool_ids.get(bool) {
            if let Some(slot) = self.bools[id].as_mut() {
                slot.references += 1;
            }
            return id;
        }

        let slot = BoolSlot {
            bool: bool.clone(),
            references: 1,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.bools[id] = Some(slot);
                id
            }
            None => {
                self.bools.push(Some(slot));
                self.bools.len() - 1
            }
        };
        self.bool_ids.insert(bool.clone(), id);
        trace!(bool = id, "Interned bool");
        id
    }

    fn release(&mut self, id: BoolId) {
        let Some(slot) = self.bools.get_mut(id).and_then(Option::as_mut) else {
            return;
        };
        slot.references -= 1;
        if slot.references == 0 {
            if let Some(slot) = self.bools[id].take() {
                self.bool_ids.remove(&slot.bool);
            }
            self.free.push(id);
            trace!(bool = id, "Collected bool");
        }
    }

    fn slot(&self, id: BoolId) -> Option<&Arc<Bool>> {
        self.bools.get(id).and_then(Option::as_ref).map(|slot| &slot.bool)
    }
}

impl Default for CanonicalIndex {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_CLAUSES)
    }
}

#[async_trait]
impl DocumentIndex for CanonicalIndex {
    fn insert(&mut self, document: Arc<Document>) {
        let name = document.name().to_string();
        self.remove(&name);

        let formula = self.formula_of(&document);
        let mut keys = Vec::with_capacity(formula.len());
        for clause in formula.clauses() {
            let mut key: Vec<(BoolId, bool)> = clause
                .literals()
                .iter()
                .map(|literal| (self.intern(literal.bool()), literal.is_negated()))
                .collect();
            key.sort_unstable();
            let key: ClauseKey = key.into();
            self.clauses.entry(key.clone()).or_default().insert(name.clone());
            keys.push(key);
        }

        debug!(document = %name, clauses = keys.len(), "Indexed document");
        self.documents.insert(
            name,
            Entry {
                document,
                clauses: keys,
            },
        );
    }

    fn remove(&mut self, name: &str) -> Option<Arc<Document>> {
        let entry = self.documents.remove(name)?;
        for key in &entry.clauses {
            if let Some(documents) = self.clauses.get_mut(key) {
                documents.remove(name);
                if documents.is_empty() {
                    self.clauses.remove(key);
                }
            }
            for &(id, _) in key.iter() {
                self.release(id);
            }
        }
        debug!(document = %name, "Removed document from index");
        Some(entry.document)
    }

    fn get(&self, name: &str) -> Option<Arc<Document>> {
        self.documents.get(name).map(|entry| entry.document.clone())
    }

    fn documents(&self) -> Vec<Arc<Document>> {
        self.documents.values().map(|e| e.document.clone()).collect()
    }

    fn len(&self) -> usize {
        self.documents.len()
    }

    async fn retrieve(&self, ctx: &EvaluationContext) -> Retrieval {
        // bool -> Some(truth) or None on error, local to this request
        let mut memo: HashMap<BoolId, Option<bool>> = HashMap::new();
        let mut matched: BTreeSet<&str> = BTreeSet::new();
        let mut retrieval = Retrieval::default();

        for (key, documents) in &self.clauses {
            if documents.iter().all(|d| matched.contains(d.as_str())) {
                continue;
            }
            let refuted = key
                .iter()
                .any(|(id, negated)| memo.get(id) == Some(&Some(*negated)));
            if refuted {
                continue;
            }

            let mut holds = true;
            for &(id, negated) in key.iter() {
                let truth = match memo.get(&id) {
                    Some(truth) => *truth,
                    None => {
                        let Some(bool) = self.slot(id) else {
                            holds = false;
                            break;
                        };
                        let value = bool.evaluate(ctx).await;
                        retrieval.literal_evaluations += 1;
                        let truth = value.as_bool();
                        if truth.is_none() {
                            retrieval.literal_errors += 1;
                            debug!(bool = %bool, error = %value, "Literal evaluation failed");
                        }
                        memo.insert(id, truth);
                        truth
                    }
                };
                match truth {
                    Some(value) if value != negated => {}
                    Some(_) => {
                        holds = false;
                        break;
                    }
                    None => {
                        retrieval.result.is_valid = false;
                        holds = false;
                        break;
                    }
                }
            }

            if holds {
                matched.extend(documents.iter().map(String::as_str));
            }
        }

        retrieval.result.matches = matched
            .into_iter()
            .filter_map(|name| self.documents.get(name))
            .map(|entry| entry.document.clone())
            .collect();
        retrieval
    }

    fn boxed_clone(&self) -> Box<dyn DocumentIndex> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{Expression, Policy};
    use crate::attributes::AttributeRegistry;
    use crate::decision::AuthorizationSubscription;
    use crate::functions::FunctionRegistry;
    use serde_json::json;

    fn role(name: &str) -> Arc<Expression> {
        eq(key(var("subject"), "role"), val(json!(name)))
    }

    fn document(name: &str, target: Arc<Expression>) -> Arc<Document> {
        Arc::new(Document::policy(Policy::permit(name).with_target(target)))
    }

    fn ctx(role: &str) -> EvaluationContext {
        EvaluationContext::new(
            Arc::new(FunctionRegistry::new()),
            Arc::new(AttributeRegistry::new()),
        )
        .with_subscription(&AuthorizationSubscription::new(
            json!({"role": role}),
            json!("read"),
            json!("file"),
        ))
    }

    fn names(retrieval: &Retrieval) -> Vec<String> {
        retrieval
            .result
            .matches
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    #[test]
    fn test_shared_and_negated_literals_use_one_slot() {
        let mut index = CanonicalIndex::new(16);
        index.insert(document("a", role("admin")));
        index.insert(document("b", role("admin")));
        index.insert(document("c", not(role("admin"))));

        assert_eq!(index.bool_count(), 1);
        assert_eq!(index.clause_count(), 2);
    }

    #[test]
    fn test_remove_collects_unused_slots() {
        let mut index = CanonicalIndex::new(16);
        index.insert(document("a", and(role("admin"), role("root"))));
        index.insert(document("b", role("admin")));
        assert_eq!(index.bool_count(), 2);

        assert!(index.remove("a").is_some());
        assert_eq!(index.bool_count(), 1);
        assert_eq!(index.clause_count(), 1);

        assert!(index.remove("b").is_some());
        assert_eq!(index.bool_count(), 0);
        assert_eq!(index.clause_count(), 0);
        assert!(index.remove("b").is_none());

        // freed slots are reused
        index.insert(document("c", role("guest")));
        assert_eq!(index.bool_id(&Bool::expression(role("guest"), Arc::default())), Some(0));
    }

    #[tokio::test]
    async fn test_retrieve_matches() {
        let mut index = CanonicalIndex::new(16);
        index.insert(document("admins", role("admin")));
        index.insert(document("others", not(role("admin"))));
        index.insert(Arc::new(Document::policy(Policy::permit("everyone"))));
        index.insert(document("nobody", val(json!(false))));

        let retrieval = index.retrieve(&ctx("admin")).await;
        assert!(retrieval.result.is_valid);
        assert_eq!(names(&retrieval), vec!["admins", "everyone"]);
        assert_eq!(retrieval.literal_evaluations, 1);

        let retrieval = index.retrieve(&ctx("guest")).await;
        assert_eq!(names(&retrieval), vec!["everyone", "others"]);
    }

    #[tokio::test]
    async fn test_error_invalidates_result() {
        let mut index = CanonicalIndex::new(16);
        index.insert(document("broken", gt(key(var("subject"), "role"), val(json!(1)))));
        index.insert(document("admins", role("admin")));

        let retrieval = index.retrieve(&ctx("admin")).await;
        assert!(!retrieval.result.is_valid);
        assert_eq!(retrieval.literal_errors, 1);
        assert_eq!(names(&retrieval), vec!["admins"]);
    }

    #[tokio::test]
    async fn test_refuted_literal_is_not_reevaluated() {
        let mut index = CanonicalIndex::new(16);
        index.insert(document("a", and(role("admin"), eq(var("action"), val(json!("read"))))));
        index.insert(document("b", and(role("admin"), eq(var("action"), val(json!("write"))))));

        let retrieval = index.retrieve(&ctx("guest")).await;
        assert!(retrieval.result.matches.is_empty());
        assert_eq!(retrieval.literal_evaluations, 1);
    }
}

//! Reference index that evaluates every target on every request

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::{DocumentIndex, Retrieval};
use crate::ast::Document;
use crate::context::EvaluationContext;
use crate::policy::matches;

#[derive(Debug, Clone, Default)]
pub struct NaiveIndex {
    documents: BTreeMap<String, Arc<Document>>,
}

impl NaiveIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentIndex for NaiveIndex {
    fn insert(&mut self, document: Arc<Document>) {
        self.documents.insert(document.name().to_string(), document);
    }

    fn remove(&mut self, name: &str) -> Option<Arc<Document>> {
        self.documents.remove(name)
    }

    fn get(&self, name: &str) -> Option<Arc<Document>> {
        self.documents.get(name).cloned()
    }

    fn documents(&self) -> Vec<Arc<Document>> {
        self.documents.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.documents.len()
    }

    async fn retrieve(&self, ctx: &EvaluationContext) -> Retrieval {
        let mut retrieval = Retrieval::default();
        for (name, document) in &self.documents {
            let matched = matches(document, ctx).await;
            retrieval.literal_evaluations += 1;
            match matched.as_bool() {
                Some(true) => retrieval.result.matches.push(document.clone()),
                Some(false) => {}
                None => {
                    debug!(document = %name, error = %matched, "Target evaluation failed");
                    retrieval.literal_errors += 1;
                    retrieval.result.is_valid = false;
                }
            }
        }
        retrieval
    }

    fn boxed_clone(&self) -> Box<dyn DocumentIndex> {
        Box::new(self.clone())
    }
}

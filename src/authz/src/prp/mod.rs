//! Policy retrieval point
//!
//! Holds the published documents behind an index and answers, per request,
//! which of them apply.
//!
//! # Architecture
//!
//! ```text
//! DocumentSource ─▶ PrpUpdateEvent ─▶ [writer lock] ─▶ clone snapshot ─▶ apply ─▶ swap
//!                                                                               │
//! retrieve_policies ◀───────────── load snapshot ◀──────────────────────────────┘
//! ```
//!
//! Writers are serialized by a mutex and build the next snapshot privately;
//! readers load whichever snapshot is current and never see a partially
//! applied update.

mod source;

pub use source::{update_channel, DocumentSource, StaticDocumentSource, UpdateSender};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ast::{Document, ParsedDocument};
use crate::attributes::{AttributeContext, AttributeRegistry};
use crate::config::PrpConfig;
use crate::context::{EvaluationContext, Variables};
use crate::decision::AuthorizationSubscription;
use crate::error::Result;
use crate::functions::FunctionContext;
use crate::index::{new_index, DocumentIndex, PolicyRetrievalResult, Retrieval};
use crate::metrics::MetricsCollector;
use crate::policy::validate_document;

/// Consistency state of a retrieval point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrpState {
    /// Nothing published
    Empty,

    /// Every published document is valid
    Consistent,

    /// A published document is invalid, or inconsistency was signalled
    Inconsistent,
}

impl fmt::Display for PrpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Consistent => write!(f, "consistent"),
            Self::Inconsistent => write!(f, "inconsistent"),
        }
    }
}

/// A single change to the published documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Publish (or republish) a document; invalid documents make the
    /// retrieval point inconsistent
    Publish(ParsedDocument),

    /// Remove a document by name; unknown names are ignored
    Unpublish(String),

    /// The source lost track of its documents; cleared only by a reset
    MarkInconsistent,
}

/// Ordered batch of updates, applied atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrpUpdateEvent {
    pub updates: Vec<Update>,
}

impl PrpUpdateEvent {
    pub fn new(updates: Vec<Update>) -> Self {
        Self { updates }
    }

    pub fn publish(document: impl Into<ParsedDocument>) -> Self {
        Self::new(vec![Update::Publish(document.into())])
    }

    pub fn unpublish(name: impl Into<String>) -> Self {
        Self::new(vec![Update::Unpublish(name.into())])
    }

    pub fn inconsistent() -> Self {
        Self::new(vec![Update::MarkInconsistent])
    }

    pub fn with(mut self, update: Update) -> Self {
        self.updates.push(update);
        self
    }
}

/// Retrieval point contract
#[async_trait]
pub trait PolicyRetrievalPoint: Send + Sync {
    /// Apply a batch of updates; returns the resulting state
    async fn apply(&self, event: PrpUpdateEvent) -> PrpState;

    /// Documents whose target matches the subscription
    ///
    /// `variables` are bound first; the subscription variables always win.
    async fn retrieve_policies(
        &self,
        subscription: &AuthorizationSubscription,
        functions: Arc<dyn FunctionContext>,
        variables: &Variables,
    ) -> PolicyRetrievalResult;

    /// Valid published documents in name order
    fn all_documents(&self) -> Vec<Arc<Document>>;

    fn state(&self) -> PrpState;

    fn is_consistent(&self) -> bool {
        self.state() != PrpState::Inconsistent
    }

    /// Drop every document and clear all inconsistency markers
    async fn reset(&self);

    async fn publish(&self, document: ParsedDocument) -> PrpState {
        self.apply(PrpUpdateEvent::publish(document)).await
    }

    async fn unpublish(&self, name: &str) -> PrpState {
        self.apply(PrpUpdateEvent::unpublish(name)).await
    }

    async fn mark_inconsistent(&self) -> PrpState {
        self.apply(PrpUpdateEvent::inconsistent()).await
    }
}

/// Immutable view readers work against
struct Snapshot {
    index: Box<dyn DocumentIndex>,

    /// Invalid documents by name, with the reason
    invalid: BTreeMap<String, String>,

    marked_inconsistent: bool,
}

impl Snapshot {
    fn empty(config: &PrpConfig) -> Self {
        Self {
            index: new_index(config.index, config.max_clauses_per_target),
            invalid: BTreeMap::new(),
            marked_inconsistent: false,
        }
    }

    fn state(&self) -> PrpState {
        if self.marked_inconsistent || !self.invalid.is_empty() {
            PrpState::Inconsistent
        } else if self.index.is_empty() {
            PrpState::Empty
        } else {
            PrpState::Consistent
        }
    }

    fn apply(&mut self, update: Update) {
        match update {
            Update::Publish(ParsedDocument::Valid(document)) => match validate_document(&document) {
                Ok(()) => {
                    let name = document.name().to_string();
                    self.invalid.remove(&name);
                    self.index.insert(document);
                    debug!(document = %name, "Published document");
                }
                Err(e) => self.reject(document.name(), e.to_string()),
            },
            Update::Publish(ParsedDocument::Invalid(invalid)) => {
                self.reject(&invalid.name, invalid.error)
            }
            Update::Unpublish(name) => {
                let removed = self.index.remove(&name).is_some();
                let was_invalid = self.invalid.remove(&name).is_some();
                debug!(document = %name, known = removed || was_invalid, "Unpublished document");
            }
            Update::MarkInconsistent => {
                warn!("Document source signalled inconsistency");
                self.marked_inconsistent = true;
            }
        }
    }

    /// The invalid version replaces any valid document of the same name
    fn reject(&mut self, name: &str, reason: String) {
        warn!(document = %name, reason = %reason, "Rejected invalid document");
        self.index.remove(name);
        self.invalid.insert(name.to_string(), reason);
    }
}

impl Clone for Snapshot {
    fn clone(&self) -> Self {
        Self {
            index: self.index.boxed_clone(),
            invalid: self.invalid.clone(),
            marked_inconsistent: self.marked_inconsistent,
        }
    }
}

/// In-memory retrieval point backed by a canonical or naive index
///
/// # Example
///
/// ```ignore
/// let prp = RetrievalPoint::new(PrpConfig::default());
/// prp.publish(Document::policy(Policy::permit("all")).into()).await;
///
/// let result = prp.retrieve_policies(&subscription, functions, &Variables::new()).await;
/// assert!(result.is_valid);
/// ```
pub struct RetrievalPoint {
    /// Current snapshot, swapped atomically by writers
    snapshot: ArcSwap<Snapshot>,

    /// Serializes writers
    writer: Mutex<()>,

    /// Targets cannot reach attribute finders; this context only reports that
    attributes: Arc<dyn AttributeContext>,

    /// Metrics collector (Prometheus)
    metrics: Option<Arc<MetricsCollector>>,

    config: PrpConfig,
}

impl RetrievalPoint {
    pub fn new(config: PrpConfig) -> Self {
        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        info!(
            index = ?config.index,
            max_clauses = config.max_clauses_per_target,
            metrics = config.enable_metrics,
            "Policy retrieval point initialized"
        );

        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty(&config)),
            writer: Mutex::new(()),
            attributes: Arc::new(AttributeRegistry::new()),
            metrics,
            config,
        }
    }

    /// Validate the configuration first
    pub fn with_config(config: PrpConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &PrpConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics.as_ref()
    }

    /// Names and reasons of the invalid documents currently published
    pub fn invalid_documents(&self) -> BTreeMap<String, String> {
        self.snapshot.load().invalid.clone()
    }

    /// Match documents against an already prepared context
    pub async fn retrieve(&self, ctx: &EvaluationContext) -> PolicyRetrievalResult {
        let start = Instant::now();
        let snapshot = self.snapshot.load_full();

        let retrieval = if snapshot.state() == PrpState::Inconsistent {
            debug!("Retrieval point is inconsistent, returning invalid result");
            Retrieval::invalid()
        } else {
            snapshot.index.retrieve(ctx).await
        };

        debug!(
            matches = retrieval.result.matches.len(),
            valid = retrieval.result.is_valid,
            evaluations = retrieval.literal_evaluations,
            "Retrieved policies"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_retrieval(&retrieval, start.elapsed()).await;
        }
        retrieval.result
    }

    /// Apply a live update stream on a background task, in order
    pub fn spawn_updates<S>(self: Arc<Self>, updates: S) -> JoinHandle<()>
    where
        S: Stream<Item = PrpUpdateEvent> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut updates = Box::pin(updates);
            while let Some(event) = updates.next().await {
                self.apply(event).await;
            }
            info!("Document update stream ended");
        })
    }

    /// Follow a document source
    pub fn follow(self: Arc<Self>, source: &dyn DocumentSource) -> JoinHandle<()> {
        self.spawn_updates(source.updates())
    }
}

#[async_trait]
impl PolicyRetrievalPoint for RetrievalPoint {
    async fn apply(&self, event: PrpUpdateEvent) -> PrpState {
        let _writer = self.writer.lock().await;

        let current = self.snapshot.load_full();
        let before = current.state();
        let mut next = current.as_ref().clone();

        let mut publishes = 0;
        let mut unpublishes = 0;
        for update in event.updates {
            match &update {
                Update::Publish(_) => publishes += 1,
                Update::Unpublish(_) => unpublishes += 1,
                Update::MarkInconsistent => {}
            }
            next.apply(update);
        }

        let after = next.state();
        self.snapshot.store(Arc::new(next));

        if before != after {
            info!(from = %before, to = %after, "Retrieval point state changed");
        }
        if let Some(metrics) = &self.metrics {
            for _ in 0..publishes {
                metrics.record_publish().await;
            }
            for _ in 0..unpublishes {
                metrics.record_unpublish().await;
            }
        }
        after
    }

    async fn retrieve_policies(
        &self,
        subscription: &AuthorizationSubscription,
        functions: Arc<dyn FunctionContext>,
        variables: &Variables,
    ) -> PolicyRetrievalResult {
        let ctx = EvaluationContext::new(functions, self.attributes.clone())
            .with_variables(variables)
            .with_subscription(subscription);
        self.retrieve(&ctx).await
    }

    fn all_documents(&self) -> Vec<Arc<Document>> {
        self.snapshot.load().index.documents()
    }

    fn state(&self) -> PrpState {
        self.snapshot.load().state()
    }

    async fn reset(&self) {
        let _writer = self.writer.lock().await;
        self.snapshot.store(Arc::new(Snapshot::empty(&self.config)));
        info!("Retrieval point reset");
    }
}

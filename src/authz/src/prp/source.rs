//! Document sources feeding a retrieval point

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{PrpUpdateEvent, Update};
use crate::ast::ParsedDocument;
use crate::error::{AuthzError, Result};

/// Producer of ordered document updates
pub trait DocumentSource: Send + Sync {
    /// Updates in the order they must be applied
    fn updates(&self) -> BoxStream<'static, PrpUpdateEvent>;
}

/// Fixed set of documents, published as one batch
#[derive(Debug, Clone, Default)]
pub struct StaticDocumentSource {
    documents: Vec<ParsedDocument>,
}

impl StaticDocumentSource {
    pub fn new(documents: Vec<ParsedDocument>) -> Self {
        Self { documents }
    }
}

impl DocumentSource for StaticDocumentSource {
    fn updates(&self) -> BoxStream<'static, PrpUpdateEvent> {
        let event = PrpUpdateEvent::new(
            self.documents.iter().cloned().map(Update::Publish).collect(),
        );
        stream::iter(std::iter::once(event)).boxed()
    }
}

/// Sending half of a live update feed
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<PrpUpdateEvent>,
}

impl UpdateSender {
    pub async fn send(&self, event: PrpUpdateEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| AuthzError::UpdateChannelClosed)
    }

    pub async fn publish(&self, document: impl Into<ParsedDocument>) -> Result<()> {
        self.send(PrpUpdateEvent::publish(document)).await
    }

    pub async fn unpublish(&self, name: impl Into<String>) -> Result<()> {
        self.send(PrpUpdateEvent::unpublish(name)).await
    }

    pub async fn mark_inconsistent(&self) -> Result<()> {
        self.send(PrpUpdateEvent::inconsistent()).await
    }
}

/// Bounded live feed; the stream ends once every sender is dropped
pub fn update_channel(capacity: usize) -> (UpdateSender, BoxStream<'static, PrpUpdateEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UpdateSender { tx }, ReceiverStream::new(rx).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Document, Policy};

    #[tokio::test]
    async fn test_static_source_publishes_one_batch() {
        let source = StaticDocumentSource::new(vec![
            Document::policy(Policy::permit("a")).into(),
            ParsedDocument::invalid("b", "broken"),
        ]);
        let events: Vec<PrpUpdateEvent> = source.updates().collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].updates.len(), 2);
    }

    #[tokio::test]
    async fn test_channel_closes_with_senders() {
        let (sender, mut updates) = update_channel(4);
        sender.unpublish("a").await.unwrap();
        drop(sender);

        assert_eq!(updates.next().await, Some(PrpUpdateEvent::unpublish("a")));
        assert_eq!(updates.next().await, None);
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (sender, updates) = update_channel(1);
        drop(updates);
        assert_eq!(
            sender.mark_inconsistent().await,
            Err(AuthzError::UpdateChannelClosed)
        );
    }
}

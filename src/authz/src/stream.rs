//! Latest-value stream combinators
//!
//! Expression evaluation composes child streams with three operators:
//!
//! - [`combine_latest`]: re-emits the vector of latest values whenever any
//!   input emits, once every input has emitted at least once.
//! - [`LatestStreamExt::switch_map`]: maps each outer value to an inner stream,
//!   dropping (and so cancelling) the previous inner stream.
//! - [`LatestStreamExt::distinct_until_changed`]: suppresses consecutive
//!   duplicates.
//!
//! All streams are boxed and `Unpin`, so none of the combinators needs pin
//! projection. Dropping a combinator drops every stream it owns, which is how
//! cancellation reaches attribute sources.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::value::Val;

/// Stream of evaluation results
pub type ValStream = BoxStream<'static, Val>;

/// Stream emitting a single value
pub fn just(value: Val) -> ValStream {
    stream::iter(std::iter::once(value)).boxed()
}

/// Combine streams into a stream of their latest values
///
/// An empty input emits one empty vector. The combined stream ends when every
/// input has ended, or as soon as an input ends without ever emitting.
pub fn combine_latest<T>(streams: Vec<BoxStream<'static, T>>) -> CombineLatest<T>
where
    T: Clone + Send + 'static,
{
    let latest = vec![None; streams.len()];
    CombineLatest {
        streams: streams.into_iter().map(Some).collect(),
        latest,
        terminated: false,
    }
}

pub struct CombineLatest<T> {
    streams: Vec<Option<BoxStream<'static, T>>>,
    latest: Vec<Option<T>>,
    terminated: bool,
}

impl<T> Unpin for CombineLatest<T> {}

impl<T: Clone + Send + 'static> Stream for CombineLatest<T> {
    type Item = Vec<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        if this.streams.is_empty() {
            this.terminated = true;
            return Poll::Ready(Some(Vec::new()));
        }

        let mut changed = false;
        let mut starved = false;
        for (slot, latest) in this.streams.iter_mut().zip(this.latest.iter_mut()) {
            let Some(stream) = slot.as_mut() else { continue };
            match stream.poll_next_unpin(cx) {
                Poll::Ready(Some(value)) => {
                    *latest = Some(value);
                    changed = true;
                }
                Poll::Ready(None) => {
                    *slot = None;
                    if latest.is_none() {
                        starved = true;
                        break;
                    }
                }
                Poll::Pending => {}
            }
        }

        if starved {
            this.terminated = true;
            this.streams.clear();
            return Poll::Ready(None);
        }

        if changed {
            if this.latest.iter().all(Option::is_some) {
                return Poll::Ready(Some(this.latest.iter().flatten().cloned().collect()));
            }
            // inputs that produced were not re-registered with the waker
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        if this.streams.iter().all(Option::is_none) {
            this.terminated = true;
            return Poll::Ready(None);
        }
        Poll::Pending
    }
}

pub struct SwitchMap<T, U, F> {
    outer: Option<BoxStream<'static, T>>,
    inner: Option<BoxStream<'static, U>>,
    project: F,
}

// `project` is never pinned
impl<T, U, F> Unpin for SwitchMap<T, U, F> {}

impl<T, U, F> Stream for SwitchMap<T, U, F>
where
    F: FnMut(T) -> BoxStream<'static, U>,
{
    type Item = U;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<U>> {
        let this = self.get_mut();
        loop {
            let mut switched = false;
            if let Some(outer) = this.outer.as_mut() {
                match outer.poll_next_unpin(cx) {
                    Poll::Ready(Some(item)) => {
                        this.inner = Some((this.project)(item));
                        switched = true;
                    }
                    Poll::Ready(None) => this.outer = None,
                    Poll::Pending => {}
                }
            }

            if let Some(inner) = this.inner.as_mut() {
                match inner.poll_next_unpin(cx) {
                    Poll::Ready(Some(value)) => return Poll::Ready(Some(value)),
                    Poll::Ready(None) => this.inner = None,
                    Poll::Pending => {}
                }
            }

            if this.outer.is_none() && this.inner.is_none() {
                return Poll::Ready(None);
            }
            if !switched {
                return Poll::Pending;
            }
        }
    }
}

pub struct DistinctUntilChanged<T> {
    inner: BoxStream<'static, T>,
    last: Option<T>,
}

impl<T> Unpin for DistinctUntilChanged<T> {}

impl<T: PartialEq + Clone> Stream for DistinctUntilChanged<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        loop {
            match this.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(value)) => {
                    if this.last.as_ref() == Some(&value) {
                        continue;
                    }
                    this.last = Some(value.clone());
                    return Poll::Ready(Some(value));
                }
                other => return other,
            }
        }
    }
}

/// Latest-value operators on any sendable stream
pub trait LatestStreamExt: Stream + Sized + Send + 'static {
    /// Map every item to a stream, following only the most recent one
    fn switch_map<U, F>(self, project: F) -> SwitchMap<Self::Item, U, F>
    where
        F: FnMut(Self::Item) -> BoxStream<'static, U> + Send + 'static,
    {
        SwitchMap {
            outer: Some(self.boxed()),
            inner: None,
            project,
        }
    }

    fn distinct_until_changed(self) -> DistinctUntilChanged<Self::Item>
    where
        Self::Item: PartialEq + Clone,
    {
        DistinctUntilChanged {
            inner: self.boxed(),
            last: None,
        }
    }
}

impl<S: Stream + Sized + Send + 'static> LatestStreamExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_combine_latest_of_ready_streams() {
        let combined: Vec<Vec<i32>> = combine_latest(vec![
            stream::iter(vec![1]).boxed(),
            stream::iter(vec![2]).boxed(),
        ])
        .collect()
        .await;

        assert_eq!(combined, vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_combine_latest_empty() {
        let combined: Vec<Vec<i32>> = combine_latest(Vec::new()).collect().await;
        assert_eq!(combined, vec![Vec::<i32>::new()]);
    }

    #[tokio::test]
    async fn test_combine_latest_ends_when_input_never_emits() {
        let combined: Vec<Vec<i32>> = combine_latest(vec![
            stream::iter(vec![1, 2]).boxed(),
            stream::empty().boxed(),
        ])
        .collect()
        .await;

        assert!(combined.is_empty());
    }

    #[tokio::test]
    async fn test_combine_latest_re_emits_on_update() {
        let (tx, rx) = mpsc::unbounded();
        let mut combined = combine_latest(vec![stream::iter(vec![10]).boxed(), rx.boxed()]);

        tx.unbounded_send(1).unwrap();
        assert_eq!(combined.next().await, Some(vec![10, 1]));
        tx.unbounded_send(2).unwrap();
        assert_eq!(combined.next().await, Some(vec![10, 2]));
        drop(tx);
        assert_eq!(combined.next().await, None);
    }

    #[tokio::test]
    async fn test_switch_map_drops_previous_inner() {
        let (outer_tx, outer_rx) = mpsc::unbounded::<i32>();
        let (inner_tx, inner_rx) = mpsc::unbounded::<i32>();
        let mut inner_rx = Some(inner_rx);

        let mut switched = outer_rx.switch_map(move |n| match inner_rx.take() {
            Some(rx) => rx.map(move |v| v * n).boxed(),
            None => stream::iter(vec![n]).boxed(),
        });

        outer_tx.unbounded_send(10).unwrap();
        inner_tx.unbounded_send(1).unwrap();
        assert_eq!(switched.next().await, Some(10));

        outer_tx.unbounded_send(7).unwrap();
        assert_eq!(switched.next().await, Some(7));
        // the first inner stream was dropped with the switch
        assert!(inner_tx.unbounded_send(2).is_err());

        drop(outer_tx);
        assert_eq!(switched.next().await, None);
    }

    #[tokio::test]
    async fn test_switch_map_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let switched = stream::iter(vec![1, 2, 3]).switch_map(move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            stream::iter(vec![n]).boxed()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let values: Vec<i32> = switched.collect().await;
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_distinct_until_changed() {
        let values: Vec<i32> = stream::iter(vec![1, 1, 2, 2, 1, 3, 3])
            .distinct_until_changed()
            .collect()
            .await;

        assert_eq!(values, vec![1, 2, 1, 3]);
    }
}

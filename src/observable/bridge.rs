//! Interoperability between [`Observable`] and `futures::Stream`.
//!
//! Drivers that do their work on a tokio runtime produce `Stream`s; the
//! feedback loop consumes [`Observable`]s. [`Observable::from_stream`] pushes
//! a stream's items into an observable from a spawned task, and
//! [`Observable::into_stream`] exposes an observable to async code.
//!
//! # Examples
//!
//! ```rust,ignore
//! use cyclens::observable::Observable;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut stream = Observable::from_iter(vec![1, 2, 3]).into_stream();
//!     while let Some(item) = stream.next().await {
//!         println!("{item:?}");
//!     }
//! }
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::{Event, Observable, Observer, StreamValue, Subscription};
use crate::error::StreamError;

// =============================================================================
// Observable -> Stream
// =============================================================================

/// A `futures::Stream` view of an [`Observable`].
///
/// Yields `Ok(value)` for every value, one `Err` if the observable fails, and
/// ends on completion. Dropping the stream cancels the subscription.
pub struct ObservableStream<T> {
    receiver: mpsc::UnboundedReceiver<Event<T>>,
    subscription: Subscription,
    finished: bool,
}

impl<T> Stream for ObservableStream<T> {
    type Item = Result<T, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(context) {
            Poll::Ready(Some(Event::Next(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Event::Error(error))) => {
                self.finished = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(Event::Completed) | None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for ObservableStream<T> {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}

impl<T> fmt::Debug for ObservableStream<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ObservableStream")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<T: StreamValue> Observable<T> {
    /// Subscribes and exposes the events as a `futures::Stream`.
    ///
    /// Values are buffered without bound until polled.
    pub fn into_stream(self) -> ObservableStream<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = self.subscribe_with(Observer::new(move |event| {
            // The receiver is gone only after the stream was dropped, which
            // also cancels this subscription.
            let _ = sender.send(event);
        }));
        ObservableStream {
            receiver,
            subscription,
            finished: false,
        }
    }
}

// =============================================================================
// Stream -> Observable
// =============================================================================

impl<T: StreamValue> Observable<T> {
    /// Pushes the items of streams made by `make_stream` into an observable.
    ///
    /// Every subscription spawns a task on `handle` that drives a fresh
    /// stream and completes the observer when the stream ends. Cancelling the
    /// subscription aborts the task.
    pub fn from_stream_fn<S, F>(handle: Handle, make_stream: F) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::create(move |observer| {
            let stream = make_stream();
            let task_observer = observer.clone();
            let task = handle.spawn(async move {
                let mut stream = Box::pin(stream);
                while let Some(item) = stream.next().await {
                    if task_observer.is_stopped() {
                        return;
                    }
                    task_observer.on_next(item);
                }
                task_observer.on_completed();
            });
            Subscription::new(move || task.abort())
        })
    }

    /// Pushes the items of a single stream into an observable.
    ///
    /// The stream can be driven once; a second subscriber receives an error.
    pub fn from_stream<S>(handle: Handle, stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(stream)));
        let consumed = Self::error(StreamError::failed(
            "from_stream",
            "stream already consumed",
        ));
        let driven = Self::from_stream_fn(handle, {
            let slot = slot.clone();
            move || {
                let stream = slot.lock().take();
                futures::stream::iter(stream).flatten()
            }
        });
        Self::create(move |observer| {
            if slot.lock().is_none() {
                return consumed.subscribe_with(observer);
            }
            driven.subscribe_with(observer)
        })
    }
}
